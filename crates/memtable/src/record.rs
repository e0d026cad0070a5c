use std::fmt;

use crate::Key;

/// How a tombstone is rendered to humans.
pub const TOMBSTONE_DISPLAY: &str = "DELETED";

/// The atomic unit stored in the WAL, memtables and tables.
///
/// `value == None` signifies a tombstone (delete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Key,
    pub value: Option<String>,
    /// Engine-wide monotonic sequence; a larger timestamp is a newer write.
    pub timestamp: u64,
    /// Flush/compaction epoch of the table holding this record. For a fresh
    /// tombstone this is the highest generation in use when it was written.
    pub generation: u64,
    /// Compaction round in which a tombstone was first carried through a
    /// merge. `None` until its first compaction.
    pub compaction_created: Option<u64>,
}

impl Record {
    /// A live value that has not been flushed yet.
    pub fn put(key: Key, value: impl Into<String>, timestamp: u64) -> Self {
        Self {
            key,
            value: Some(value.into()),
            timestamp,
            generation: 0,
            compaction_created: None,
        }
    }

    /// A tombstone whose propagation target is `generation`.
    pub fn tombstone(key: Key, timestamp: u64, generation: u64) -> Self {
        Self {
            key,
            value: None,
            timestamp,
            generation,
            compaction_created: None,
        }
    }

    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// The value as shown to users: the payload, or `DELETED`.
    #[must_use]
    pub fn display_value(&self) -> &str {
        self.value.as_deref().unwrap_or(TOMBSTONE_DISPLAY)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={} (ts={}, gen={})",
            self.key,
            self.display_value(),
            self.timestamp,
            self.generation
        )
    }
}
