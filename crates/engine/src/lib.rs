//! # Engine - StrataKV Storage Engine
//!
//! The central orchestrator that ties together the [`memtable`], [`wal`], and
//! [`sstable`] crates into a simulated LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────────────┐
//! │                       ENGINE                         │
//! │                                                      │
//! │ write.rs → WAL append → (delay) → Memtable upsert    │
//! │              |                                       │
//! │              |  (memtable full, no flush in flight?) │
//! │              v                                       │
//! │ flush.rs → freeze → (delay) → generation bump        │
//! │              → (delay) → new SSTable / L0 file       │
//! │              |                                       │
//! │              |  (threshold crossed?)                 │
//! │              v                                       │
//! │ compaction.rs → size-tiered merge | leveled cascade  │
//! │                                                      │
//! │ read.rs → Memtable → Immutable → tables/levels       │
//! │            (first match wins, tombstones hide)       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module           | Purpose                                              |
//! |-----------------|------------------------------------------------------|
//! | [`lib.rs`]      | `Engine` handle, shared state, reset, snapshots      |
//! | [`write`]       | `put()`, `put_random()`, `delete()`                  |
//! | [`flush`]       | freeze + background flush task                       |
//! | [`compaction`]  | size-tiered and leveled background compaction        |
//! | [`read`]        | `get()`, `range_get()`                               |
//! | [`command`]     | `Command` surface and configuration setters          |
//! | [`scheduler`]   | injectable step pacing                               |
//!
//! ## Concurrency
//!
//! [`Engine`] is a cheap clonable handle. All state sits behind one mutex and
//! every logical step runs inside a single critical section; the lock is
//! never held across a pause. Flush and compaction run as spawned Tokio
//! tasks, at most one of each at a time. [`Engine::reset`] bumps an epoch so
//! that tasks started before it discard their results.

mod command;
mod compaction;
mod error;
mod events;
mod flush;
mod read;
mod scheduler;
mod snapshot;
mod stats;
mod tables;
mod write;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use config::EngineConfig;
use memtable::{ImmutableMemtable, Key, Memtable};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sstable::TableOptions;
use tokio::task::JoinHandle;
use tracing::{error, info};
use wal::Wal;

pub use command::{Command, CommandOutcome, Setting};
pub use config::{CompactionStrategy, ConfigError};
pub use error::{EngineError, Result};
pub use events::{Event, EventKind};
pub use memtable::{KeyKind, Record};
pub use scheduler::{Scheduler, Stage, TokioScheduler};
pub use snapshot::{
    EngineSnapshot, LookupResult, Operation, RangeEntry, SOURCE_IMMUTABLE, SOURCE_MEMTABLE,
    SOURCE_NONE,
};
pub use stats::{EngineStats, OptimizationCounters};
pub use tables::{TableRef, TableStore, Tier};

use events::EventLog;

/// Everything the engine mutates. Only ever touched under [`Inner::state`].
pub(crate) struct EngineState {
    pub(crate) config: EngineConfig,
    pub(crate) mem: Memtable,
    /// At most one frozen memtable; `Some` exactly while a flush is in flight.
    pub(crate) imm: Option<ImmutableMemtable>,
    pub(crate) wal: Wal,
    pub(crate) tables: TableStore,

    /// Last write timestamp handed out.
    pub(crate) seq: u64,
    /// Last flush generation handed out.
    pub(crate) generation: u64,
    pub(crate) compaction_round: u64,
    pub(crate) next_table_id: u64,

    pub(crate) flushing: bool,
    pub(crate) compacting: bool,
    /// Bumped by every reset.
    pub(crate) epoch: u64,
    pub(crate) operation: Option<Operation>,

    pub(crate) last_lookup: Option<LookupResult>,
    pub(crate) range_results: Vec<RangeEntry>,
    pub(crate) events: EventLog,
    pub(crate) counters: OptimizationCounters,
    pub(crate) stats: EngineStats,
    pub(crate) rng: StdRng,
}

impl EngineState {
    fn new(config: EngineConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            mem: Memtable::new(),
            imm: None,
            wal: Wal::new(),
            tables: TableStore::new(config.compaction_strategy, config.num_levels),
            seq: 0,
            generation: 0,
            compaction_round: 0,
            next_table_id: 0,
            flushing: false,
            compacting: false,
            epoch: 0,
            operation: None,
            last_lookup: None,
            range_results: Vec::new(),
            events: EventLog::new(config.event_log_capacity),
            counters: OptimizationCounters::default(),
            stats: EngineStats::default(),
            rng,
            config,
        }
    }

    pub(crate) fn table_options(&self) -> TableOptions {
        TableOptions {
            fence_block_size: self.config.fence_block_size,
            bloom_false_positive_rate: self.config.bloom_false_positive_rate,
        }
    }

    pub(crate) fn next_table_id(&mut self) -> u64 {
        self.next_table_id += 1;
        self.next_table_id
    }

    /// Whether any data, in memory or in tables, exists.
    pub(crate) fn holds_data(&self) -> bool {
        !self.mem.is_empty() || self.imm.is_some() || !self.wal.is_empty() || !self.tables.is_empty()
    }
}

pub(crate) struct Inner {
    pub(crate) state: Mutex<EngineState>,
    scheduler: Arc<dyn Scheduler>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// The simulated LSM storage engine.
///
/// # Write Path
///
/// 1. Stamp the record with the next sequence number.
/// 2. Append it to the WAL.
/// 3. After the propagation delay, upsert it into the memtable.
/// 4. If the memtable is full and no flush is in flight, freeze it and
///    spawn the flush.
///
/// # Read Path
///
/// 1. Memtable, then the immutable memtable.
/// 2. Tables newest to oldest (size-tiered) or L0 then L1.. (leveled).
/// 3. First match wins; a tombstone answers "not found".
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<Inner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("Engine")
            .field("strategy", &st.config.compaction_strategy)
            .field("memtable_entries", &st.mem.len())
            .field("immutable", &st.imm.as_ref().map(|m| m.len()))
            .field("wal_entries", &st.wal.len())
            .field("table_count", &st.tables.table_count())
            .field("generation", &st.generation)
            .field("compaction_round", &st.compaction_round)
            .field("flushing", &st.flushing)
            .field("compacting", &st.compacting)
            .finish()
    }
}

impl Engine {
    /// Creates an engine paced by the Tokio timer.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_scheduler(config, Arc::new(TokioScheduler))
    }

    /// Creates an engine paced by `scheduler`.
    pub fn with_scheduler(config: EngineConfig, scheduler: Arc<dyn Scheduler>) -> Result<Self> {
        config.validate()?;
        info!(
            strategy = %config.compaction_strategy,
            memtable_capacity = config.memtable_capacity,
            key_kind = %config.key_kind,
            "engine created"
        );
        let mut state = EngineState::new(config);
        state.events.push(EventKind::System, "Engine initialized");
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                scheduler,
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Current configuration.
    pub fn config(&self) -> EngineConfig {
        self.inner.state.lock().config.clone()
    }

    /// Captures the whole engine state at one instant.
    pub fn snapshot(&self) -> EngineSnapshot {
        let st = self.inner.state.lock();
        EngineSnapshot {
            config: st.config.clone(),
            memtable: st.mem.iter().cloned().collect(),
            immutable_memtable: st.imm.as_ref().map(|m| m.records().to_vec()),
            wal: st.wal.entries().to_vec(),
            tables: st.tables.clone(),
            last_lookup: st.last_lookup.clone(),
            last_range: st.range_results.clone(),
            events: st.events.snapshot(),
            counters: st.counters,
            stats: st.stats,
            generation: st.generation,
            compaction_round: st.compaction_round,
            flushing: st.flushing,
            compacting: st.compacting,
            operation: st.operation,
        }
    }

    /// Waits until no flush or compaction is running, including work that
    /// background tasks spawn while being awaited.
    pub async fn wait_idle(&self) {
        loop {
            let pending = std::mem::take(&mut *self.inner.tasks.lock());
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    error!(error = %e, "background task failed");
                }
            }
        }
    }

    /// Discards all data, counters and the log; keeps the configuration.
    ///
    /// Background work started before the reset finishes its pauses but
    /// applies nothing.
    pub fn reset(&self) {
        let mut st = self.inner.state.lock();
        let epoch = st.epoch + 1;
        let config = st.config.clone();
        let rng = st.rng.clone();
        let seq = st.seq;
        *st = EngineState::new(config);
        st.epoch = epoch;
        st.rng = rng;
        st.seq = seq;
        st.events.push(EventKind::System, "LSM tree reset");
    }

    // ---- Internal helpers ----

    /// Sleeps through `stage` at the currently configured step delay.
    pub(crate) async fn pause(&self, stage: Stage) {
        let step = self.inner.state.lock().config.step_delay;
        self.inner.scheduler.pause(stage, stage.delay_for(step)).await;
    }

    pub(crate) fn check_key(st: &EngineState, key: &Key) -> Result<()> {
        let expected = st.config.key_kind;
        let found = key.kind();
        if found != expected {
            return Err(EngineError::KeyTypeMismatch {
                key: key.to_string(),
                expected,
                found,
            });
        }
        Ok(())
    }

    pub(crate) fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.inner.tasks.lock().push(handle);
    }

    /// Post-mutation invariant check: flush first, then compaction.
    pub(crate) fn schedule_maintenance(&self, st: &mut EngineState) {
        self.maybe_flush(st);
        self.maybe_compact(st);
    }
}

#[cfg(test)]
mod tests;
