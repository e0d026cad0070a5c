//! Read-only views handed to the presentation layer.

use std::fmt;

use config::EngineConfig;
use memtable::{Key, Record};

use crate::events::Event;
use crate::stats::{EngineStats, OptimizationCounters};
use crate::tables::TableStore;

/// Source label for a miss.
pub const SOURCE_NONE: &str = "none";
pub const SOURCE_MEMTABLE: &str = "memtable";
pub const SOURCE_IMMUTABLE: &str = "immutable memtable";

/// The client operation currently being stepped through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Put,
    Delete,
    Get,
    Range,
}

/// Outcome of the most recent point lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub found: bool,
    pub key: Key,
    pub value: Option<String>,
    /// Where the answer came from. For a deleted key this is the holder of
    /// the tombstone.
    pub source: String,
}

impl fmt::Display for LookupResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.value, self.found) {
            (Some(v), true) => write!(f, "{} [{}]", v, self.source),
            _ if self.source == SOURCE_NONE => f.write_str("(nil)"),
            _ => write!(f, "(nil) [deleted in {}]", self.source),
        }
    }
}

/// One row of a range result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeEntry {
    pub key: Key,
    pub value: String,
    pub source: String,
}

impl fmt::Display for RangeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} [{}]", self.key, self.value, self.source)
    }
}

/// Everything the engine holds, captured in one critical section.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub config: EngineConfig,
    pub memtable: Vec<Record>,
    pub immutable_memtable: Option<Vec<Record>>,
    pub wal: Vec<Record>,
    pub tables: TableStore,
    pub last_lookup: Option<LookupResult>,
    pub last_range: Vec<RangeEntry>,
    pub events: Vec<Event>,
    pub counters: OptimizationCounters,
    pub stats: EngineStats,
    pub generation: u64,
    pub compaction_round: u64,
    pub flushing: bool,
    pub compacting: bool,
    pub operation: Option<Operation>,
}
