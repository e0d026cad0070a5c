//! Injectable pacing for the simulated I/O steps.
//!
//! Every multi-step operation calls [`Scheduler::pause`] between its steps.
//! The default [`TokioScheduler`] sleeps for the modeled latency; tests plug
//! in schedulers that record the stage sequence or hold a stage until
//! released.

use std::time::Duration;

use async_trait::async_trait;

/// A point between two logical steps of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// WAL append done, memtable upsert pending.
    WritePropagation,
    /// Memtable frozen, generation bump pending.
    FlushGenerationBump,
    /// Generation bumped, table emission pending.
    FlushEmit,
    /// Compaction triggered, merge pending.
    CompactionStart,
    /// Point lookup about to check the memtables.
    MemoryLookup,
    /// Point lookup about to probe the next table.
    TableProbe,
    /// Range query sources built, merge pending.
    RangeStart,
    /// One range result emitted, next pending.
    RangePair,
}

impl Stage {
    /// Latency of this stage in units of the configured step delay.
    pub fn delay_for(self, step: Duration) -> Duration {
        match self {
            Stage::FlushGenerationBump | Stage::CompactionStart => step * 2,
            Stage::TableProbe | Stage::RangePair => step / 2,
            Stage::WritePropagation
            | Stage::FlushEmit
            | Stage::MemoryLookup
            | Stage::RangeStart => step,
        }
    }
}

#[async_trait]
pub trait Scheduler: Send + Sync + 'static {
    /// Suspends the caller for `delay` before it runs the step after `stage`.
    async fn pause(&self, stage: Stage, delay: Duration);
}

/// Real-time pacing on the Tokio timer. A zero delay still yields so that
/// background tasks interleave with the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn pause(&self, _stage: Stage, delay: Duration) {
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}
