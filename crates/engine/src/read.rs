/// Read path: `get()` and `range_get()`.
///
/// Both read whatever state exists when each of their steps runs; there is
/// no point-in-time isolation across the pauses.
use std::sync::Arc;

use bloom::BloomProbe;
use memtable::{Key, Record};
use sstable::{MergeIterator, SSTable};
use tracing::debug;

use crate::snapshot::{SOURCE_IMMUTABLE, SOURCE_MEMTABLE, SOURCE_NONE};
use crate::tables::{TableRef, Tier};
use crate::{Engine, EngineState, EventKind, LookupResult, Operation, RangeEntry, Result, Stage};

impl Engine {
    /// Looks up `key`: memtable, immutable memtable, then tables in recency
    /// order. In memory the first record found decides; among tables the one
    /// with the greatest timestamp does. A tombstone means "not found".
    pub async fn get(&self, key: Key) -> Result<LookupResult> {
        let epoch = {
            let mut st = self.inner.state.lock();
            Self::check_key(&st, &key)?;
            st.operation = Some(Operation::Get);
            st.events.push(EventKind::Get, format!("Looking up key {}", key));
            st.epoch
        };

        self.pause(Stage::MemoryLookup).await;
        let (plan, use_bloom, use_fence) = {
            let mut st = self.inner.state.lock();
            let in_memory = st
                .mem
                .get(&key)
                .map(|r| (r.clone(), SOURCE_MEMTABLE))
                .or_else(|| {
                    st.imm
                        .as_ref()
                        .and_then(|m| m.get(&key))
                        .map(|r| (r.clone(), SOURCE_IMMUTABLE))
                });
            if let Some((record, source)) = in_memory {
                return Ok(Self::finish_get(&mut st, epoch, key, Some(&record), source));
            }
            (
                st.tables.lookup_order(),
                st.config.bloom_filter_enabled,
                st.config.fence_pointers_enabled,
            )
        };

        // Merged tables may sit ahead of newer ones; the newest timestamp decides.
        let mut best: Option<(Record, String)> = None;
        for probe in plan {
            if let Some((found, _)) = &best {
                if probe.table.max_timestamp() <= found.timestamp {
                    debug!(table = %probe.label, key = %key, "table cannot hold a newer record");
                    continue;
                }
            }
            self.pause(Stage::TableProbe).await;
            let mut st = self.inner.state.lock();
            if let Some(record) = probe_table(&mut st, &probe, &key, use_bloom, use_fence) {
                if best.as_ref().map_or(true, |(b, _)| record.timestamp > b.timestamp) {
                    best = Some((record, probe.label));
                }
            }
        }

        let mut st = self.inner.state.lock();
        Ok(match best {
            Some((record, source)) => Self::finish_get(&mut st, epoch, key, Some(&record), &source),
            None => Self::finish_get(&mut st, epoch, key, None, SOURCE_NONE),
        })
    }

    fn finish_get(
        st: &mut EngineState,
        epoch: u64,
        key: Key,
        record: Option<&Record>,
        source: &str,
    ) -> LookupResult {
        let result = match record {
            Some(r) if !r.is_tombstone() => LookupResult {
                found: true,
                key,
                value: r.value.clone(),
                source: source.to_string(),
            },
            _ => LookupResult {
                found: false,
                key,
                value: None,
                source: source.to_string(),
            },
        };
        if st.epoch == epoch {
            let details = match (&result.value, record) {
                (Some(v), _) => format!("Found {}={} in {}", result.key, v, source),
                (None, Some(_)) => format!("Key {} is deleted (tombstone in {})", result.key, source),
                (None, None) => format!("Key {} not found", result.key),
            };
            st.events.push(EventKind::GetResult, details);
            st.last_lookup = Some(result.clone());
            st.operation = None;
        }
        result
    }

    /// Returns every live key in `[start, end]` with its newest value, in
    /// ascending key order.
    ///
    /// Results are published to the engine state one pair at a time, so a
    /// concurrent snapshot sees the result grow. An inverted range is empty.
    pub async fn range_get(&self, start: Key, end: Key) -> Result<Vec<RangeEntry>> {
        let (sources, epoch) = {
            let mut st = self.inner.state.lock();
            Self::check_key(&st, &start)?;
            Self::check_key(&st, &end)?;
            st.operation = Some(Operation::Range);
            st.range_results.clear();
            st.events
                .push(EventKind::Range, format!("Range query [{}, {}]", start, end));
            let sources = if start <= end {
                range_sources(&mut st, &start, &end)
            } else {
                Vec::new()
            };
            (sources, st.epoch)
        };

        self.pause(Stage::RangeStart).await;

        let mut results = Vec::new();
        for (record, source) in MergeIterator::new(sources) {
            let entry = RangeEntry {
                key: record.key,
                value: record.value.unwrap_or_default(),
                source,
            };
            {
                let mut st = self.inner.state.lock();
                if st.epoch == epoch {
                    st.range_results.push(entry.clone());
                }
            }
            results.push(entry);
            self.pause(Stage::RangePair).await;
        }

        let mut st = self.inner.state.lock();
        if st.epoch == epoch {
            st.events.push(
                EventKind::RangeResult,
                format!("Range query returned {} entries", results.len()),
            );
            st.operation = None;
        }
        Ok(results)
    }
}

/// Probes one table for `key`, applying the optimizations its tier allows.
fn probe_table(
    st: &mut EngineState,
    probe: &TableRef,
    key: &Key,
    use_bloom: bool,
    use_fence: bool,
) -> Option<Record> {
    let table: &Arc<SSTable> = &probe.table;

    if let Tier::Deep(_) = probe.tier {
        if !table.key_in_range(key) {
            st.counters.files_skipped_by_range += 1;
            st.events.push(
                EventKind::Optimization,
                format!("Skipping {}: key {} outside its key range", probe.label, key),
            );
            return None;
        }
    } else if use_bloom {
        let answer = table.bloom_probe(key, &mut st.rng);
        if !answer.should_search() {
            st.counters.bloom_skips += 1;
            st.events.push(
                EventKind::Optimization,
                format!("Bloom filter: key {} not in {}, skipping", key, probe.label),
            );
            return None;
        }
        if answer == BloomProbe::FalsePositive {
            st.counters.bloom_false_positives += 1;
            st.events.push(
                EventKind::Optimization,
                format!("Bloom filter false positive for key {} in {}", key, probe.label),
            );
        }
    }

    let lookup = table.lookup(key, use_fence);
    if lookup.blocks_skipped > 0 {
        st.counters.blocks_skipped += lookup.blocks_skipped as u64;
        st.events.push(
            EventKind::Optimization,
            format!(
                "Fence pointers skipped {} blocks in {}",
                lookup.blocks_skipped, probe.label
            ),
        );
    }
    debug!(table = %probe.label, key = %key, hit = lookup.record.is_some(), "table probed");
    lookup.record.cloned()
}

/// One sorted source per memtable and table, most recent first, each
/// restricted to `[start, end]`.
fn range_sources(st: &mut EngineState, start: &Key, end: &Key) -> Vec<(String, Vec<Record>)> {
    let use_fence = st.config.fence_pointers_enabled;
    let bounds = start.clone()..=end.clone();

    let mut sources = vec![(
        SOURCE_MEMTABLE.to_string(),
        st.mem.range(bounds.clone()).cloned().collect(),
    )];
    if let Some(imm) = &st.imm {
        sources.push((
            SOURCE_IMMUTABLE.to_string(),
            imm.range(bounds).cloned().collect(),
        ));
    }

    for probe in st.tables.lookup_order() {
        if let Tier::Deep(_) = probe.tier {
            if !probe.table.overlaps(start, end) {
                st.counters.files_skipped_by_range += 1;
                continue;
            }
        }
        let scan = probe.table.scan_range(start, end, use_fence);
        if scan.blocks_skipped > 0 {
            st.counters.blocks_skipped += scan.blocks_skipped as u64;
            st.events.push(
                EventKind::Optimization,
                format!(
                    "Fence pointers skipped {} blocks in {}",
                    scan.blocks_skipped, probe.label
                ),
            );
        }
        sources.push((probe.label, scan.records));
    }
    sources
}
