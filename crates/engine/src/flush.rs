/// Flush pipeline: freeze, generation bump, table emission.
///
/// ```text
/// FILLING ──(len >= capacity, no flush in flight)──> FROZEN   (sync, in maybe_flush)
/// FROZEN  ──(2 x step)──> generation += 1
///         ──(1 x step)──> SSTable / L0 file emitted, WAL truncated
/// ```
///
/// Freezing swaps in an empty memtable, so writes never wait on a flush.
use std::sync::Arc;

use sstable::SSTable;
use tracing::debug;

use crate::{Engine, EngineState, EventKind, Stage};

impl Engine {
    /// Freezes the memtable and spawns the flush if it is full and no flush
    /// is in flight.
    pub(crate) fn maybe_flush(&self, st: &mut EngineState) {
        if st.flushing || st.mem.len() < st.config.memtable_capacity {
            return;
        }
        let frozen = st.mem.freeze();
        st.events.push(
            EventKind::Flush,
            format!(
                "Memtable full ({} entries); frozen into immutable memtable",
                frozen.len()
            ),
        );
        st.imm = Some(frozen);
        st.flushing = true;

        let engine = self.clone();
        let epoch = st.epoch;
        self.spawn_background(async move { engine.run_flush(epoch).await });
    }

    async fn run_flush(&self, epoch: u64) {
        self.pause(Stage::FlushGenerationBump).await;
        let generation = {
            let mut st = self.inner.state.lock();
            if st.epoch != epoch {
                return;
            }
            st.generation += 1;
            let generation = st.generation;
            st.events.push(
                EventKind::Flush,
                format!("Generation advanced to {}", generation),
            );
            generation
        };

        self.pause(Stage::FlushEmit).await;
        let mut st = self.inner.state.lock();
        if st.epoch != epoch {
            return;
        }
        let Some(frozen) = st.imm.take() else {
            st.flushing = false;
            return;
        };

        let id = st.next_table_id();
        let table = SSTable::new(id, generation, frozen.records().to_vec(), st.table_options());
        let records = table.len();
        let truncated = st.wal.truncate_flushed(&frozen);
        st.tables.push_flushed(Arc::new(table));

        st.stats.flushes += 1;
        st.stats.records_flushed += records as u64;
        st.flushing = false;
        debug!(id, generation, records, truncated, "flush complete");

        let target = match st.config.compaction_strategy {
            config::CompactionStrategy::SizeTiered => "new SSTable",
            config::CompactionStrategy::Leveled => "new L0 file",
        };
        st.events.push(
            EventKind::Flush,
            format!(
                "Flushed {} entries to {} (generation {}); WAL cleared of {} entries",
                records, target, generation, truncated
            ),
        );

        self.schedule_maintenance(&mut st);
    }
}
