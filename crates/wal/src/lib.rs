//! # WAL (Write-Ahead Log)
//!
//! Mirrors every client mutation on its way from request to memtable.
//!
//! Every `PUT` or `DELETE` is appended here **before** the corresponding
//! memtable upsert. The log is append-only; the only removal is
//! [`Wal::truncate_flushed`], called once a flush has turned an immutable
//! memtable into a table. Entries for writes that landed after the freeze
//! are not backed by that flush and stay in the log.
//!
//! ## Example
//!
//! ```rust
//! use memtable::{Key, Memtable, Record};
//! use wal::Wal;
//!
//! let mut wal = Wal::new();
//! let mut mem = Memtable::new();
//!
//! let rec = Record::put(Key::Int(1), "one", 1);
//! wal.append(rec.clone());
//! mem.upsert(rec);
//!
//! let frozen = mem.freeze();
//! assert_eq!(wal.truncate_flushed(&frozen), 1);
//! assert!(wal.is_empty());
//! ```

use memtable::{ImmutableMemtable, Record};

/// Append-only, in-memory write-ahead log.
#[derive(Debug, Default, Clone)]
pub struct Wal {
    entries: Vec<Record>,
}

impl Wal {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends `record` at the tail of the log.
    pub fn append(&mut self, record: Record) {
        self.entries.push(record);
    }

    /// Drops every entry made durable by flushing `flushed`.
    ///
    /// An entry is backed by the flush when the flushed batch holds its key
    /// with a timestamp at least as new as the entry's (the entry was applied,
    /// possibly superseded, before the freeze). Returns the number of entries
    /// removed.
    pub fn truncate_flushed(&mut self, flushed: &ImmutableMemtable) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            !flushed
                .get(&entry.key)
                .map(|r| r.timestamp >= entry.timestamp)
                .unwrap_or(false)
        });
        before - self.entries.len()
    }

    /// Chronological iterator over the log.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[Record] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
