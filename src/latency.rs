// src/latency.rs
//
// Per-stage latency accounting over the four monotonic stamps each event
// carries. Owned by the consumer thread; the consumer is the only printer.
use crate::event::BookEvent;

#[derive(Debug, Clone, Copy, Default)]
pub struct StageStats {
    pub sum_ns: u64,
    pub count: u64,
}

impl StageStats {
    #[inline]
    fn record(&mut self, ns: u64) {
        self.sum_ns += ns;
        self.count += 1;
    }

    pub fn avg_ns(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.sum_ns / self.count
        }
    }
}

/// Stage deltas for one event. Monotonicity violations (e.g. `t_exch` from a
/// different host epoch) clamp to zero rather than poisoning the aggregates.
#[derive(Debug, Clone, Copy)]
pub struct StageDeltas {
    pub exch_to_rx: u64,
    pub rx_to_enq: u64,
    pub enq_to_deq: u64,
    pub total: u64,
}

impl StageDeltas {
    pub fn of(ev: &BookEvent) -> Self {
        let exch_to_rx = if ev.t_exch > 0 {
            ev.t_rx.saturating_sub(ev.t_exch)
        } else {
            0
        };
        let rx_to_enq = ev.t_enq.saturating_sub(ev.t_rx);
        let enq_to_deq = ev.t_deq.saturating_sub(ev.t_enq);
        Self {
            exch_to_rx,
            rx_to_enq,
            enq_to_deq,
            total: exch_to_rx + rx_to_enq + enq_to_deq,
        }
    }
}

/// Running sums/counts per stage plus the end-to-end total.
#[derive(Debug, Default)]
pub struct LatencyRecorder {
    pub exch_to_rx: StageStats,
    pub rx_to_enq: StageStats,
    pub enq_to_deq: StageStats,
    pub total: StageStats,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, ev: &BookEvent) -> StageDeltas {
        let d = StageDeltas::of(ev);
        self.exch_to_rx.record(d.exch_to_rx);
        self.rx_to_enq.record(d.rx_to_enq);
        self.enq_to_deq.record(d.enq_to_deq);
        self.total.record(d.total);
        crate::metrics::observe_stage_ns(d);
        d
    }

    pub fn events(&self) -> u64 {
        self.total.count
    }

    /// One-line aggregate for the consumer's periodic summary.
    pub fn summary_line(&self) -> String {
        format!(
            "avg_exch_to_rx_ns={} avg_rx_to_enq_ns={} avg_enq_to_deq_ns={} avg_total_ns={}",
            self.exch_to_rx.avg_ns(),
            self.rx_to_enq.avg_ns(),
            self.enq_to_deq.avg_ns(),
            self.total.avg_ns(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::BookEvent;

    fn stamped(t_exch: u64, t_rx: u64, t_enq: u64, t_deq: u64) -> BookEvent {
        BookEvent {
            t_exch,
            t_rx,
            t_enq,
            t_deq,
            ..BookEvent::default()
        }
    }

    #[test]
    fn deltas_are_per_stage() {
        let d = StageDeltas::of(&stamped(100, 150, 170, 200));
        assert_eq!(d.exch_to_rx, 50);
        assert_eq!(d.rx_to_enq, 20);
        assert_eq!(d.enq_to_deq, 30);
        assert_eq!(d.total, 100);
    }

    #[test]
    fn violated_monotonicity_clamps_to_zero() {
        // Exchange stamp from a different epoch, far ahead of local clocks.
        let d = StageDeltas::of(&stamped(1_000_000, 150, 140, 200));
        assert_eq!(d.exch_to_rx, 0);
        assert_eq!(d.rx_to_enq, 0);
        assert_eq!(d.enq_to_deq, 60);
        assert_eq!(d.total, 60);
    }

    #[test]
    fn missing_exchange_stamp_contributes_zero() {
        let d = StageDeltas::of(&stamped(0, 150, 160, 170));
        assert_eq!(d.exch_to_rx, 0);
        assert_eq!(d.total, 20);
    }

    #[test]
    fn recorder_accumulates_averages() {
        let mut rec = LatencyRecorder::new();
        rec.record(&stamped(0, 100, 110, 120));
        rec.record(&stamped(0, 200, 230, 260));
        assert_eq!(rec.events(), 2);
        assert_eq!(rec.rx_to_enq.avg_ns(), 20);
        assert_eq!(rec.enq_to_deq.avg_ns(), 20);
        assert_eq!(rec.total.avg_ns(), 40);
        let line = rec.summary_line();
        assert!(line.contains("avg_total_ns=40"));
    }
}
