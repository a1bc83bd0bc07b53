// src/stats.rs
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared across the producer/consumer boundary. The producer only
/// increments; the consumer reads them for its periodic summary (one-writer
/// rule: the producer never prints).
#[derive(Default)]
pub struct PipelineStats {
    pub events_pushed: AtomicU64,
    pub events_dropped: AtomicU64,
    pub parse_errors: AtomicU64,
}

impl PipelineStats {
    #[inline]
    pub fn inc_pushed(&self) {
        self.events_pushed.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_pushed: self.events_pushed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub events_pushed: u64,
    pub events_dropped: u64,
    pub parse_errors: u64,
}
