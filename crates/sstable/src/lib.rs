//! # SSTable - Sorted String Table
//!
//! Immutable, sorted record batches for the StrataKV engine.
//!
//! When the memtable reaches capacity the engine freezes it and flushes the
//! frozen copy as an SSTable. SSTables are *write-once, read-many*: once
//! created they are never modified, only replaced during compaction. The
//! store is entirely in memory, so a table is a sorted `Vec<Record>` plus the
//! two read accelerators a disk-backed table would carry:
//!
//! - a [`SimulatedBloomFilter`] consulted before scanning the table, and
//! - a [`FenceIndex`] of per-block `[min, max]` keys that narrows a scan to
//!   the blocks that can match.
//!
//! Every record in a table carries the table's `generation`.
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ records (ascending key, one per key)         │
//! │   block 0 │ block 1 │ ... │ block n          │
//! ├─────────────────────────────────────────────┤
//! │ fence index: [min, max] per block            │
//! ├─────────────────────────────────────────────┤
//! │ bloom filter: false-positive rate            │
//! └─────────────────────────────────────────────┘
//! ```

mod fence;
mod merge;

use std::ops::Range;

use bloom::{BloomProbe, SimulatedBloomFilter, DEFAULT_FALSE_POSITIVE_RATE};
use memtable::{Key, Record};
use rand::Rng;

pub use fence::{FenceBlock, FenceIndex, DEFAULT_FENCE_BLOCK_SIZE};
pub use merge::{
    merge_tables, GcContext, MergeIterator, MergeOutcome, TombstoneAction, TombstoneDecision,
    TOMBSTONE_GRACE_PERIOD,
};

/// Build-time parameters shared by every table the engine creates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableOptions {
    pub fence_block_size: usize,
    pub bloom_false_positive_rate: f64,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            fence_block_size: DEFAULT_FENCE_BLOCK_SIZE,
            bloom_false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE,
        }
    }
}

/// Result of a point lookup inside one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup<'a> {
    pub record: Option<&'a Record>,
    /// Blocks eliminated by fence pointers (0 when they are off).
    pub blocks_skipped: usize,
}

/// Result of a range scan inside one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeScan {
    pub records: Vec<Record>,
    pub blocks_skipped: usize,
}

#[derive(Debug, Clone)]
pub struct SSTable {
    id: u64,
    generation: u64,
    records: Vec<Record>,
    max_timestamp: u64,
    fence: FenceIndex,
    bloom: SimulatedBloomFilter,
}

impl SSTable {
    /// Creates a table from `records`, sorting them by key and stamping each
    /// with `generation`.
    ///
    /// # Panics
    ///
    /// Panics if `opts.fence_block_size` is 0 or the false-positive rate is
    /// outside `[0, 1]`.
    pub fn new(id: u64, generation: u64, mut records: Vec<Record>, opts: TableOptions) -> Self {
        records.sort_by(|a, b| a.key.cmp(&b.key));
        for r in &mut records {
            r.generation = generation;
        }
        let max_timestamp = records.iter().map(|r| r.timestamp).max().unwrap_or(0);
        let fence = FenceIndex::build(&records, opts.fence_block_size);
        Self {
            id,
            generation,
            records,
            max_timestamp,
            fence,
            bloom: SimulatedBloomFilter::new(opts.bloom_false_positive_rate),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Timestamp of the newest record, 0 for an empty table.
    #[must_use]
    pub fn max_timestamp(&self) -> u64 {
        self.max_timestamp
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn fence(&self) -> &FenceIndex {
        &self.fence
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_key(&self) -> Option<&Key> {
        self.records.first().map(|r| &r.key)
    }

    pub fn last_key(&self) -> Option<&Key> {
        self.records.last().map(|r| &r.key)
    }

    /// Whether `key` lies within `[first_key, last_key]`.
    #[must_use]
    pub fn key_in_range(&self, key: &Key) -> bool {
        match (self.first_key(), self.last_key()) {
            (Some(lo), Some(hi)) => lo <= key && key <= hi,
            _ => false,
        }
    }

    /// Whether this table's key range intersects `[start, end]`.
    #[must_use]
    pub fn overlaps(&self, start: &Key, end: &Key) -> bool {
        match (self.first_key(), self.last_key()) {
            (Some(lo), Some(hi)) => lo <= end && start <= hi,
            _ => false,
        }
    }

    /// Exact membership, tombstones included.
    #[must_use]
    pub fn contains_key(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    /// Direct lookup without accelerators.
    pub fn get(&self, key: &Key) -> Option<&Record> {
        find_in(&self.records, key)
    }

    /// Consults the table's bloom filter for `key`.
    pub fn bloom_probe<R: Rng + ?Sized>(&self, key: &Key, rng: &mut R) -> BloomProbe {
        self.bloom.probe(self.contains_key(key), rng)
    }

    /// Point lookup, optionally restricted by fence pointers.
    pub fn lookup(&self, key: &Key, use_fence: bool) -> Lookup<'_> {
        if !use_fence {
            return Lookup {
                record: self.get(key),
                blocks_skipped: 0,
            };
        }
        let (spans, blocks_skipped) = self.fence.candidates_for_key(key);
        let record = spans
            .into_iter()
            .find_map(|span| find_in(&self.records[span], key));
        Lookup {
            record,
            blocks_skipped,
        }
    }

    /// All records (tombstones included) with keys in `[start, end]`.
    pub fn scan_range(&self, start: &Key, end: &Key, use_fence: bool) -> RangeScan {
        let (spans, blocks_skipped) = if use_fence {
            self.fence.candidates_for_range(start, end)
        } else {
            (vec![0..self.records.len()], 0)
        };
        let records = spans
            .into_iter()
            .flat_map(|span: Range<usize>| self.records[span].iter())
            .filter(|r| start <= &r.key && &r.key <= end)
            .cloned()
            .collect();
        RangeScan {
            records,
            blocks_skipped,
        }
    }
}

fn find_in<'a>(records: &'a [Record], key: &Key) -> Option<&'a Record> {
    records
        .binary_search_by(|r| r.key.cmp(key))
        .ok()
        .map(|i| &records[i])
}

#[cfg(test)]
mod tests;
