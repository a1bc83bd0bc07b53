// src/util.rs
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative shutdown flag shared by the producer and consumer loops.
pub struct ShutdownFlag(AtomicBool);

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self(AtomicBool::new(false))
    }
}

impl ShutdownFlag {
    #[inline]
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Monotonic nanoseconds on a single process-wide epoch. Every stage stamp
/// (`t_rx`, `t_enq`, `t_deq`) must come from here so stage deltas are
/// meaningful.
#[inline]
pub fn now_nanos() -> u64 {
    #[cfg(target_os = "linux")]
    {
        use nix::time::{clock_gettime, ClockId};
        if let Ok(ts) = clock_gettime(ClockId::CLOCK_MONOTONIC_RAW) {
            return (ts.tv_sec() as u64) * 1_000_000_000 + (ts.tv_nsec() as u64);
        }
    }
    // Fallback portable monotonic
    use std::time::Instant;
    static START: once_cell::sync::Lazy<Instant> = once_cell::sync::Lazy::new(Instant::now);
    START.elapsed().as_nanos() as u64
}

#[inline]
pub fn pin_to_core_if_set(core_index: Option<usize>) {
    if let Some(idx) = core_index {
        if let Some(cores) = core_affinity::get_core_ids() {
            if let Some(core_id) = cores.into_iter().find(|c| c.id == idx) {
                let _ = core_affinity::set_for_current(core_id);
            }
        }
    }
}
