//! # Memtable
//!
//! The in-memory write buffer of the store and its frozen counterpart.
//!
//! A [`Memtable`] holds at most one [`Record`] per key in key order. It is
//! bounded by a record-count capacity owned by the engine; once full it is
//! frozen into an [`ImmutableMemtable`] and handed to the flush pipeline while
//! a fresh, empty memtable keeps accepting writes.

mod key;
mod record;

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

pub use key::{Key, KeyError, KeyKind};
pub use record::{Record, TOMBSTONE_DISPLAY};

#[derive(Debug, Default)]
pub struct Memtable {
    map: BTreeMap<Key, Record>,
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// Upserts a record (value or tombstone). Returns `false` and leaves the
    /// table untouched if the resident record for the key is at least as new.
    pub fn upsert(&mut self, record: Record) -> bool {
        match self.map.get(&record.key) {
            Some(old) if old.timestamp >= record.timestamp => false,
            _ => {
                self.map.insert(record.key.clone(), record);
                true
            }
        }
    }

    /// The resident record for `key`, tombstones included.
    pub fn get(&self, key: &Key) -> Option<&Record> {
        self.map.get(key)
    }

    /// Ordered iterator over all records.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.map.values()
    }

    /// Ordered iterator over records whose key lies in `range`.
    pub fn range(&self, range: RangeInclusive<Key>) -> impl Iterator<Item = &Record> {
        self.map.range(range).map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Moves every record into a new [`ImmutableMemtable`], leaving this
    /// memtable empty and ready for writes.
    pub fn freeze(&mut self) -> ImmutableMemtable {
        let map = std::mem::take(&mut self.map);
        ImmutableMemtable {
            records: map.into_values().collect(),
        }
    }
}

/// A frozen, key-sorted copy of a full memtable awaiting flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImmutableMemtable {
    records: Vec<Record>,
}

impl ImmutableMemtable {
    pub fn get(&self, key: &Key) -> Option<&Record> {
        self.records
            .binary_search_by(|r| r.key.cmp(key))
            .ok()
            .map(|i| &self.records[i])
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn range(&self, range: RangeInclusive<Key>) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(move |r| range.contains(&r.key))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
