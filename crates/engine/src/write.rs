/// Write path: `put()`, `put_random()`, `delete()`.
///
/// A write is two steps separated by the propagation delay: the WAL append
/// happens immediately, the memtable upsert after the pause. The post-write
/// flush/compaction check runs in the second step.
use memtable::{Key, KeyKind, Record};
use rand::Rng;
use tracing::debug;

use crate::{Engine, EngineState, EventKind, Operation, Result, Stage};

/// Random keys are drawn from `0..RANDOM_KEY_SPACE`.
const RANDOM_KEY_SPACE: i64 = 100;
/// Random values are drawn from `0..RANDOM_VALUE_SPACE`.
const RANDOM_VALUE_SPACE: u32 = 1000;

impl Engine {
    /// Inserts or overwrites `key`.
    ///
    /// Returns the record as it was logged.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::KeyTypeMismatch`] if `key` is not of the store's
    /// key kind. Nothing is written in that case.
    pub async fn put(&self, key: Key, value: impl Into<String>) -> Result<Record> {
        let value = value.into();
        let (record, epoch) = {
            let mut st = self.inner.state.lock();
            Self::check_key(&st, &key)?;
            st.seq += 1;
            let record = Record::put(key, value, st.seq);
            Self::log_write(&mut st, &record, Operation::Put);
            (record, st.epoch)
        };
        self.apply_write(record, epoch).await
    }

    /// Puts a random key and value, or a random value for `key` when given.
    pub async fn put_random(&self, key: Option<Key>) -> Result<Record> {
        let (key, value) = {
            let mut st = self.inner.state.lock();
            let key = match key {
                Some(k) => k,
                None => random_key(&mut st),
            };
            let value = st.rng.gen_range(0..RANDOM_VALUE_SPACE).to_string();
            (key, value)
        };
        self.put(key, value).await
    }

    /// Writes a tombstone for `key`.
    ///
    /// The tombstone's generation is the highest generation held by any table
    /// at delete time: the data it must outlive.
    pub async fn delete(&self, key: Key) -> Result<Record> {
        let (record, epoch) = {
            let mut st = self.inner.state.lock();
            Self::check_key(&st, &key)?;
            st.seq += 1;
            let target = st.tables.max_generation();
            let record = Record::tombstone(key, st.seq, target);
            Self::log_write(&mut st, &record, Operation::Delete);
            (record, st.epoch)
        };
        self.apply_write(record, epoch).await
    }

    fn log_write(st: &mut EngineState, record: &Record, op: Operation) {
        st.operation = Some(op);
        st.stats.user_writes += 1;
        st.wal.append(record.clone());
        let details = match op {
            Operation::Delete => format!(
                "Appended DELETE {} to WAL (tombstone, target generation {})",
                record.key, record.generation
            ),
            _ => format!(
                "Appended PUT {}={} to WAL",
                record.key,
                record.display_value()
            ),
        };
        st.events.push(EventKind::Wal, details);
    }

    async fn apply_write(&self, record: Record, epoch: u64) -> Result<Record> {
        self.pause(Stage::WritePropagation).await;

        let mut st = self.inner.state.lock();
        if st.epoch != epoch {
            debug!(key = %record.key, "write dropped by reset");
            return Ok(record);
        }
        let (kind, verb) = if record.is_tombstone() {
            (EventKind::Delete, "Inserted tombstone for")
        } else {
            (EventKind::Put, "Inserted")
        };
        if st.mem.upsert(record.clone()) {
            let entries = st.mem.len();
            st.events.push(
                kind,
                format!("{} {} into memtable ({} entries)", verb, record, entries),
            );
        }
        st.operation = None;
        self.schedule_maintenance(&mut st);
        Ok(record)
    }
}

pub(crate) fn random_key(st: &mut EngineState) -> Key {
    let n = st.rng.gen_range(0..RANDOM_KEY_SPACE);
    match st.config.key_kind {
        KeyKind::Integer => Key::Int(n),
        KeyKind::String => Key::Str(format!("k{:02}", n)),
    }
}
