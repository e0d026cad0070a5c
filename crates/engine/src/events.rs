//! The user-visible operation log.
//!
//! A bounded ring of the most recent events, oldest first. Every event is
//! also emitted through `tracing`.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Wal,
    Put,
    Delete,
    Get,
    GetResult,
    Range,
    RangeResult,
    Flush,
    Compaction,
    Optimization,
    System,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Wal => "WAL",
            EventKind::Put => "PUT",
            EventKind::Delete => "DELETE",
            EventKind::Get => "GET",
            EventKind::GetResult => "GET_RESULT",
            EventKind::Range => "RANGE",
            EventKind::RangeResult => "RANGE_RESULT",
            EventKind::Flush => "FLUSH",
            EventKind::Compaction => "COMPACTION",
            EventKind::Optimization => "OPTIMIZATION",
            EventKind::System => "SYSTEM",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Monotonic per engine, survives log eviction.
    pub id: u64,
    /// Milliseconds since the engine was created.
    pub at_ms: u64,
    pub kind: EventKind,
    pub details: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>6}ms] {:<12} {}", self.at_ms, self.kind, self.details)
    }
}

#[derive(Debug)]
pub(crate) struct EventLog {
    entries: VecDeque<Event>,
    capacity: usize,
    next_id: u64,
    started: Instant,
}

impl EventLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 0,
            started: Instant::now(),
        }
    }

    pub(crate) fn push(&mut self, kind: EventKind, details: impl Into<String>) {
        let details = details.into();
        info!(kind = %kind, "{}", details);

        self.next_id += 1;
        let event = Event {
            id: self.next_id,
            at_ms: self.started.elapsed().as_millis() as u64,
            kind,
            details,
        };
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    pub(crate) fn snapshot(&self) -> Vec<Event> {
        self.entries.iter().cloned().collect()
    }
}
