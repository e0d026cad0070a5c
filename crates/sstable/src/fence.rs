//! Fence pointers: a per-block `[min, max]` key index over a sorted table.
//!
//! The table's records are cut into fixed-size blocks. A point lookup only
//! scans the block whose range can hold the key, and a range scan only the
//! blocks intersecting the query range. Every other block counts as an I/O
//! saved.

use std::ops::Range;

use memtable::{Key, Record};

/// Records per block when no size is configured.
pub const DEFAULT_FENCE_BLOCK_SIZE: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceBlock {
    /// Index range into the table's record slice.
    pub span: Range<usize>,
    pub min: Key,
    pub max: Key,
}

impl FenceBlock {
    fn may_contain(&self, key: &Key) -> bool {
        &self.min <= key && key <= &self.max
    }

    fn intersects(&self, start: &Key, end: &Key) -> bool {
        &self.min <= end && start <= &self.max
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FenceIndex {
    blocks: Vec<FenceBlock>,
}

impl FenceIndex {
    /// Builds the index over `records`, which must already be sorted by key.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is 0.
    pub fn build(records: &[Record], block_size: usize) -> Self {
        assert!(block_size > 0, "block_size must be > 0");
        let blocks = records
            .chunks(block_size)
            .enumerate()
            .filter_map(|(i, chunk)| {
                let first = chunk.first()?;
                let last = chunk.last()?;
                let start = i * block_size;
                Some(FenceBlock {
                    span: start..start + chunk.len(),
                    min: first.key.clone(),
                    max: last.key.clone(),
                })
            })
            .collect();
        Self { blocks }
    }

    pub fn blocks(&self) -> &[FenceBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Spans of the blocks that may hold `key`, plus the number skipped.
    pub fn candidates_for_key(&self, key: &Key) -> (Vec<Range<usize>>, usize) {
        self.select(|b| b.may_contain(key))
    }

    /// Spans of the blocks intersecting `[start, end]`, plus the number skipped.
    pub fn candidates_for_range(&self, start: &Key, end: &Key) -> (Vec<Range<usize>>, usize) {
        self.select(|b| b.intersects(start, end))
    }

    fn select(&self, keep: impl Fn(&FenceBlock) -> bool) -> (Vec<Range<usize>>, usize) {
        let spans: Vec<_> = self
            .blocks
            .iter()
            .filter(|b| keep(b))
            .map(|b| b.span.clone())
            .collect();
        let skipped = self.blocks.len() - spans.len();
        (spans, skipped)
    }
}
