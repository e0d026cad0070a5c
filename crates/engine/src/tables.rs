//! On-"disk" table layout for both compaction strategies.

use std::sync::Arc;

use config::CompactionStrategy;
use sstable::SSTable;

/// Where a table sits, which decides the read-path optimizations that apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Size-tiered table list.
    Flat,
    /// Leveled L0: overlapping files straight from flushes.
    L0,
    /// Leveled L1 and deeper: non-overlapping files.
    Deep(usize),
}

/// A table paired with its position label, in lookup order.
#[derive(Debug, Clone)]
pub struct TableRef {
    pub label: String,
    pub tier: Tier,
    pub table: Arc<SSTable>,
}

/// Tables are shared immutably: snapshots and in-flight reads hold `Arc`s
/// while compaction swaps the lists.
#[derive(Debug, Clone)]
pub enum TableStore {
    /// Newest first.
    SizeTiered(Vec<Arc<SSTable>>),
    /// `levels[0]` is L0, newest first. Deeper levels are key-ordered.
    Leveled(Vec<Vec<Arc<SSTable>>>),
}

impl TableStore {
    pub fn new(strategy: CompactionStrategy, num_levels: usize) -> Self {
        match strategy {
            CompactionStrategy::SizeTiered => TableStore::SizeTiered(Vec::new()),
            CompactionStrategy::Leveled => TableStore::Leveled(vec![Vec::new(); num_levels]),
        }
    }

    pub fn strategy(&self) -> CompactionStrategy {
        match self {
            TableStore::SizeTiered(_) => CompactionStrategy::SizeTiered,
            TableStore::Leveled(_) => CompactionStrategy::Leveled,
        }
    }

    /// Every table, in lookup order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Arc<SSTable>> + '_> {
        match self {
            TableStore::SizeTiered(tables) => Box::new(tables.iter()),
            TableStore::Leveled(levels) => Box::new(levels.iter().flatten()),
        }
    }

    pub fn table_count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn record_count(&self) -> usize {
        self.iter().map(|t| t.len()).sum()
    }

    /// Highest generation held by any table, 0 for an empty store.
    pub fn max_generation(&self) -> u64 {
        self.iter().map(|t| t.generation()).max().unwrap_or(0)
    }

    /// Size-tiered table list, `None` under leveled compaction.
    pub fn tables(&self) -> Option<&[Arc<SSTable>]> {
        match self {
            TableStore::SizeTiered(tables) => Some(tables),
            TableStore::Leveled(_) => None,
        }
    }

    /// Levels, `None` under size-tiered compaction.
    pub fn levels(&self) -> Option<&[Vec<Arc<SSTable>>]> {
        match self {
            TableStore::SizeTiered(_) => None,
            TableStore::Leveled(levels) => Some(levels),
        }
    }

    /// Installs a freshly flushed table as the newest one.
    pub(crate) fn push_flushed(&mut self, table: Arc<SSTable>) {
        match self {
            TableStore::SizeTiered(tables) => tables.insert(0, table),
            TableStore::Leveled(levels) => {
                if levels.is_empty() {
                    levels.push(Vec::new());
                }
                levels[0].insert(0, table);
            }
        }
    }

    /// Every table with its label, newest data first.
    pub fn lookup_order(&self) -> Vec<TableRef> {
        match self {
            TableStore::SizeTiered(tables) => tables
                .iter()
                .enumerate()
                .map(|(i, t)| TableRef {
                    label: format!("sstable-{}", i),
                    tier: Tier::Flat,
                    table: Arc::clone(t),
                })
                .collect(),
            TableStore::Leveled(levels) => levels
                .iter()
                .enumerate()
                .flat_map(|(level, files)| {
                    files.iter().enumerate().map(move |(i, t)| TableRef {
                        label: format!("L{}-{}", level, i),
                        tier: if level == 0 { Tier::L0 } else { Tier::Deep(level) },
                        table: Arc::clone(t),
                    })
                })
                .collect(),
        }
    }
}

/// Smallest generation among `tables`, `None` if there are none.
pub(crate) fn min_generation<'a>(tables: impl IntoIterator<Item = &'a Arc<SSTable>>) -> Option<u64> {
    tables.into_iter().map(|t| t.generation()).min()
}
