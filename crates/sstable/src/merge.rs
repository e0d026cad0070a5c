//! K-way merge over sorted record sources, and compaction on top of it.
//!
//! [`MergeIterator`] yields one record per distinct key in ascending key
//! order. Sources are ranked by position: index 0 is the most recent (the
//! memtable for reads, the newest table for compaction). When several
//! sources hold the same key the record with the highest timestamp wins, and
//! on equal timestamps the more recent source wins. Every losing duplicate is
//! consumed without being emitted.
//!
//! [`merge_tables`] is the compaction primitive: merge the inputs, then decide
//! for every surviving tombstone whether it may be garbage-collected.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::vec;

use memtable::{Key, Record};

/// Compaction rounds a tombstone must survive before it may be dropped.
pub const TOMBSTONE_GRACE_PERIOD: u64 = 2;

/// Head of one source, ordered for a min-heap on `(key, source)`.
struct HeapEntry {
    record: Record,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.record.key == other.record.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse both so the smallest key, then the
        // most recent source, surfaces first.
        other
            .record
            .key
            .cmp(&self.record.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Lazy merge of N key-sorted sources into one deduplicated stream.
///
/// Each item is the winning record and the tag of the source it came from.
/// The iterator is single-pass; build a new one per query.
pub struct MergeIterator<T> {
    tags: Vec<T>,
    iters: Vec<vec::IntoIter<Record>>,
    heap: BinaryHeap<HeapEntry>,
    include_tombstones: bool,
}

impl<T: Clone> MergeIterator<T> {
    /// Merge that suppresses keys whose winning record is a tombstone.
    pub fn new(sources: Vec<(T, Vec<Record>)>) -> Self {
        Self::build(sources, false)
    }

    /// Merge that yields winning tombstones too (used by compaction).
    pub fn with_tombstones(sources: Vec<(T, Vec<Record>)>) -> Self {
        Self::build(sources, true)
    }

    fn build(sources: Vec<(T, Vec<Record>)>, include_tombstones: bool) -> Self {
        let mut tags = Vec::with_capacity(sources.len());
        let mut iters = Vec::with_capacity(sources.len());
        let mut heap = BinaryHeap::new();

        for (source, (tag, records)) in sources.into_iter().enumerate() {
            let mut iter = records.into_iter();
            if let Some(record) = iter.next() {
                heap.push(HeapEntry { record, source });
            }
            tags.push(tag);
            iters.push(iter);
        }

        Self {
            tags,
            iters,
            heap,
            include_tombstones,
        }
    }

    fn advance(&mut self, source: usize) {
        if let Some(record) = self.iters[source].next() {
            self.heap.push(HeapEntry { record, source });
        }
    }
}

impl<T: Clone> Iterator for MergeIterator<T> {
    type Item = (Record, T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.heap.pop()?;
            self.advance(top.source);

            let mut best = top;
            while self
                .heap
                .peek()
                .map_or(false, |p| p.record.key == best.record.key)
            {
                let Some(dup) = self.heap.pop() else { break };
                self.advance(dup.source);
                if dup.record.timestamp > best.record.timestamp {
                    best = dup;
                }
            }

            if best.record.is_tombstone() && !self.include_tombstones {
                continue;
            }
            let tag = self.tags[best.source].clone();
            return Some((best.record, tag));
        }
    }
}

/// Store-wide facts a merge needs to garbage-collect tombstones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcContext<'a> {
    /// The compaction round this merge belongs to.
    pub round: u64,
    /// Smallest generation held by any table outside the merge, `None` when
    /// the merge covers every table.
    pub min_generation_elsewhere: Option<u64>,
    /// Key-sorted contents of the tables outside the merge.
    pub elsewhere: &'a [&'a [Record]],
}

impl GcContext<'_> {
    /// Whether a table outside the merge still holds a version of
    /// `tombstone`'s key older than the tombstone itself.
    fn shadows_older_data(&self, tombstone: &Record) -> bool {
        self.elsewhere.iter().any(|run| {
            run.binary_search_by(|r| r.key.cmp(&tombstone.key))
                .map(|i| run[i].timestamp < tombstone.timestamp)
                .unwrap_or(false)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TombstoneAction {
    /// Grace period elapsed and no older data remains: key removed.
    Dropped,
    /// Too young to drop.
    KeptGracePeriod,
    /// Old enough, but older data outside the merge may still hold the key.
    KeptUnpropagated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TombstoneDecision {
    pub key: Key,
    pub action: TombstoneAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Surviving records, key-sorted, stamped with `generation`.
    pub records: Vec<Record>,
    /// Highest generation among the inputs.
    pub generation: u64,
    pub decisions: Vec<TombstoneDecision>,
}

impl MergeOutcome {
    pub fn dropped(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| d.action == TombstoneAction::Dropped)
            .count()
    }
}

/// Merges `inputs` (newest first) into one sorted run.
///
/// Per key the record with the greatest timestamp wins. A winning tombstone
/// is dropped once it has been through [`TOMBSTONE_GRACE_PERIOD`] rounds and
/// nothing outside the merge can still hold an older version of its key:
/// the oldest input generation must be no newer than any table elsewhere,
/// and no table elsewhere may actually contain the key with an older
/// timestamp. A tombstone that was never compacted before is stamped with the
/// current round, so its first merge counts as age 0.
pub fn merge_tables(inputs: &[&[Record]], ctx: GcContext<'_>) -> MergeOutcome {
    let generations = inputs.iter().flat_map(|s| s.iter().map(|r| r.generation));
    let (min_gen, max_gen) = generations.fold((None, 0), |(lo, hi): (Option<u64>, u64), g| {
        (Some(lo.map_or(g, |l| l.min(g))), hi.max(g))
    });
    let propagated = match (min_gen, ctx.min_generation_elsewhere) {
        (Some(ours), Some(elsewhere)) => ours <= elsewhere,
        _ => true,
    };

    let sources = inputs
        .iter()
        .enumerate()
        .map(|(i, s)| (i, s.to_vec()))
        .collect();

    let mut outcome = MergeOutcome {
        generation: max_gen,
        ..MergeOutcome::default()
    };

    for (mut record, _) in MergeIterator::with_tombstones(sources) {
        if record.is_tombstone() {
            let created = *record.compaction_created.get_or_insert(ctx.round);
            let age = ctx.round.saturating_sub(created);
            let action = if age < TOMBSTONE_GRACE_PERIOD {
                TombstoneAction::KeptGracePeriod
            } else if !propagated || ctx.shadows_older_data(&record) {
                TombstoneAction::KeptUnpropagated
            } else {
                TombstoneAction::Dropped
            };
            outcome.decisions.push(TombstoneDecision {
                key: record.key.clone(),
                action,
            });
            if action == TombstoneAction::Dropped {
                continue;
            }
        }
        record.generation = max_gen;
        outcome.records.push(record);
    }

    outcome
}
