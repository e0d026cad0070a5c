/// Compaction: size-tiered merges and leveled cascades.
///
/// Both strategies run as a single background task at a time and go through
/// [`merge_tables`], which resolves duplicates by timestamp and decides the
/// fate of every tombstone. Each job is one compaction round.
use std::collections::HashSet;
use std::sync::Arc;

use memtable::Record;
use sstable::{merge_tables, GcContext, MergeOutcome, SSTable, TableOptions, TombstoneAction};
use tracing::{debug, info};

use crate::tables::{min_generation, TableStore};
use crate::{Engine, EngineState, EventKind, Stage};

/// Relative size difference under which two tables count as similar.
const SIZE_TOLERANCE: f64 = 0.1;

/// Records an L1 file set may hold; each deeper level holds ten times more.
const L1_CAPACITY: usize = 10;

impl Engine {
    /// Spawns a compaction if the active strategy's trigger holds and none is
    /// running.
    pub(crate) fn maybe_compact(&self, st: &mut EngineState) {
        if st.compacting {
            return;
        }
        let engine = self.clone();
        let epoch = st.epoch;
        match &st.tables {
            TableStore::SizeTiered(tables) => {
                let Some(group) = similar_size_group(tables, st.config.size_tiered_threshold)
                else {
                    return;
                };
                let avg = group.iter().map(|t| t.len()).sum::<usize>() / group.len();
                let ids: HashSet<u64> = group.iter().map(|t| t.id()).collect();
                st.compacting = true;
                st.events.push(
                    EventKind::Compaction,
                    format!(
                        "Starting size-tiered compaction of {} SSTables of size ~{}",
                        ids.len(),
                        avg
                    ),
                );
                self.spawn_background(async move { engine.run_size_tiered(epoch, ids).await });
            }
            TableStore::Leveled(levels) => {
                let l0 = levels.first().map_or(0, Vec::len);
                if l0 < st.config.l0_compaction_threshold {
                    return;
                }
                st.compacting = true;
                st.events.push(
                    EventKind::Compaction,
                    format!("Starting leveled compaction ({} files in L0)", l0),
                );
                self.spawn_background(async move { engine.run_leveled(epoch).await });
            }
        }
    }

    async fn run_size_tiered(&self, epoch: u64, ids: HashSet<u64>) {
        self.pause(Stage::CompactionStart).await;

        let mut st = self.inner.state.lock();
        if st.epoch != epoch {
            return;
        }
        st.compaction_round += 1;
        let round = st.compaction_round;
        let opts = st.table_options();
        let new_id = st.next_table_id();

        let TableStore::SizeTiered(tables) = &mut st.tables else {
            st.compacting = false;
            return;
        };
        // Every table ahead of the newest input is left out of the merge.
        let slot = tables
            .iter()
            .position(|t| ids.contains(&t.id()))
            .unwrap_or(0);
        let (inputs, rest): (Vec<_>, Vec<_>) =
            tables.drain(..).partition(|t| ids.contains(&t.id()));
        let others: Vec<&[Record]> = rest.iter().map(|t| t.records()).collect();
        let ctx = GcContext {
            round,
            min_generation_elsewhere: min_generation(&rest),
            elsewhere: &others,
        };
        let slices: Vec<&[Record]> = inputs.iter().map(|t| t.records()).collect();
        let outcome = merge_tables(&slices, ctx);

        *tables = rest;
        let output = outcome.records.len();
        if output > 0 {
            let table = SSTable::new(new_id, outcome.generation, outcome.records.clone(), opts);
            tables.insert(slot, Arc::new(table));
        }

        let input: usize = inputs.iter().map(|t| t.len()).sum();
        record_outcome(&mut st, &outcome, input, round);
        st.events.push(
            EventKind::Compaction,
            format!(
                "Compaction complete: {} SSTables merged into {} entries (generation {})",
                inputs.len(),
                output,
                outcome.generation
            ),
        );
        info!(round, tables = inputs.len(), input, output, "size-tiered compaction finished");
        st.compacting = false;
        self.schedule_maintenance(&mut st);
    }

    async fn run_leveled(&self, epoch: u64) {
        self.pause(Stage::CompactionStart).await;

        let mut st = self.inner.state.lock();
        if st.epoch != epoch {
            return;
        }
        st.compaction_round += 1;
        let round = st.compaction_round;
        let opts = st.table_options();
        let mut next_id = st.next_table_id;

        let TableStore::Leveled(levels) = &mut st.tables else {
            st.compacting = false;
            return;
        };
        let num_levels = levels.len();
        let mut notes = Vec::new();
        let mut outcomes = Vec::new();

        // (1) L0 files overlap arbitrarily: merge them into one run.
        let l0 = std::mem::take(&mut levels[0]);
        let mut input: usize = l0.iter().map(|t| t.len()).sum();
        let mut output = 0usize;
        let deeper: Vec<&[Record]> = levels[1..].iter().flatten().map(|t| t.records()).collect();
        let ctx = GcContext {
            round,
            min_generation_elsewhere: min_generation(levels[1..].iter().flatten()),
            elsewhere: &deeper,
        };
        let slices: Vec<&[Record]> = l0.iter().map(|t| t.records()).collect();
        let merged = merge_tables(&slices, ctx);
        notes.push(format!("Merged {} files from L0", l0.len()));
        let mut carry = merged.records.clone();
        outcomes.push(merged);

        // (2..) Merge the run into each level in turn, every L1 file counting
        // as overlapping. Whatever exceeds a level's capacity cascades down.
        for level in 1..num_levels {
            if carry.is_empty() {
                break;
            }
            let existing = std::mem::take(&mut levels[level]);
            input += existing.iter().map(|t| t.len()).sum::<usize>();
            let deeper: Vec<&[Record]> = levels[level + 1..]
                .iter()
                .flatten()
                .map(|t| t.records())
                .collect();
            let ctx = GcContext {
                round,
                min_generation_elsewhere: min_generation(levels[level + 1..].iter().flatten()),
                elsewhere: &deeper,
            };
            let mut slices: Vec<&[Record]> = vec![carry.as_slice()];
            slices.extend(existing.iter().map(|t| t.records()));
            let outcome = merge_tables(&slices, ctx);

            let total = outcome.records.len();
            let capacity = if level + 1 == num_levels {
                usize::MAX
            } else {
                level_capacity(level)
            };
            let mut kept = outcome.records.clone();
            let overflow = if kept.len() > capacity {
                kept.split_off(capacity)
            } else {
                Vec::new()
            };

            output += kept.len();
            let files = partition_level(level, total, kept, outcome.generation, opts, &mut next_id);
            notes.push(format!("Created {} files in L{}", files.len(), level));
            levels[level] = files;
            carry = overflow;
            outcomes.push(outcome);
        }

        st.next_table_id = next_id;
        for note in notes {
            st.events.push(EventKind::Compaction, note);
        }
        for outcome in &outcomes {
            record_tombstones(&mut st, outcome, round);
        }
        st.stats.compactions += 1;
        st.stats.records_compacted_in += input as u64;
        st.stats.records_compacted_out += output as u64;
        st.events.push(EventKind::Compaction, "Leveled compaction complete");
        info!(round, input, output, "leveled compaction finished");
        st.compacting = false;
        self.schedule_maintenance(&mut st);
    }
}

/// First group of at least `threshold` similar-sized tables.
///
/// Tables are sorted by length and chained single-link: a table joins the
/// current group when it is within [`SIZE_TOLERANCE`] of the previous one.
pub(crate) fn similar_size_group(
    tables: &[Arc<SSTable>],
    threshold: usize,
) -> Option<Vec<Arc<SSTable>>> {
    let mut by_len: Vec<&Arc<SSTable>> = tables.iter().collect();
    by_len.sort_by_key(|t| t.len());

    let mut groups: Vec<Vec<Arc<SSTable>>> = Vec::new();
    for table in by_len {
        match groups.last_mut() {
            Some(group) if group.last().map_or(false, |prev| similar(prev.len(), table.len())) => {
                group.push(Arc::clone(table));
            }
            _ => groups.push(vec![Arc::clone(table)]),
        }
    }
    groups.into_iter().find(|g| g.len() >= threshold)
}

fn similar(smaller: usize, larger: usize) -> bool {
    if smaller == 0 {
        return larger == 0;
    }
    (larger - smaller) as f64 / smaller as f64 <= SIZE_TOLERANCE
}

/// Record capacity of level `level` (>= 1).
pub(crate) fn level_capacity(level: usize) -> usize {
    L1_CAPACITY.saturating_mul(10usize.saturating_pow(level.saturating_sub(1) as u32))
}

/// Splits the sorted `records` into contiguous, non-overlapping files.
///
/// Level `i` uses at most `i + 1` files and about one file per `5 * i`
/// records of the merge that produced them.
fn partition_level(
    level: usize,
    merged_total: usize,
    records: Vec<Record>,
    generation: u64,
    opts: TableOptions,
    next_id: &mut u64,
) -> Vec<Arc<SSTable>> {
    if records.is_empty() {
        return Vec::new();
    }
    let per_file = 5 * level;
    let count = (level + 1).min(merged_total.div_ceil(per_file)).max(1);
    let size = records.len().div_ceil(count).max(1);
    records
        .chunks(size)
        .map(|chunk| {
            *next_id += 1;
            Arc::new(SSTable::new(*next_id, generation, chunk.to_vec(), opts))
        })
        .collect()
}

fn record_outcome(st: &mut EngineState, outcome: &MergeOutcome, input: usize, round: u64) {
    st.stats.compactions += 1;
    st.stats.records_compacted_in += input as u64;
    st.stats.records_compacted_out += outcome.records.len() as u64;
    record_tombstones(st, outcome, round);
}

fn record_tombstones(st: &mut EngineState, outcome: &MergeOutcome, round: u64) {
    st.stats.tombstones_dropped += outcome.dropped() as u64;
    for decision in &outcome.decisions {
        let key = &decision.key;
        let details = match decision.action {
            TombstoneAction::Dropped => {
                format!("Removing tombstone for key {} (grace period over, fully propagated)", key)
            }
            TombstoneAction::KeptGracePeriod => {
                format!("Keeping tombstone for key {} (within grace period)", key)
            }
            TombstoneAction::KeptUnpropagated => {
                format!("Keeping tombstone for key {} (needs to reach older SSTables)", key)
            }
        };
        debug!(round, key = %key, action = ?decision.action, "tombstone decision");
        st.events.push(EventKind::Compaction, details);
    }
}
