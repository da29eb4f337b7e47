//! Accounting-only phase timing.
//!
//! A [`ProfileGuard`] opens a `tracing` span for its phase and adds the
//! elapsed time to the owning [`Profiler`] when dropped. Guards never
//! synchronize anything.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Accumulated timing for one named phase.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseStats {
    pub count: u64,
    pub total: Duration,
}

/// Per-phase duration accumulator.
#[derive(Debug, Default)]
pub struct Profiler {
    phases: Mutex<BTreeMap<&'static str, PhaseStats>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing `phase`. Time is recorded when the guard drops.
    pub fn profile(&self, phase: &'static str) -> ProfileGuard<'_> {
        let span = tracing::debug_span!("phase", name = phase).entered();
        ProfileGuard {
            profiler: self,
            phase,
            start: Instant::now(),
            _span: span,
        }
    }

    fn record(&self, phase: &'static str, elapsed: Duration) {
        let mut phases = self.phases.lock().unwrap_or_else(|e| e.into_inner());
        let stats = phases.entry(phase).or_default();
        stats.count += 1;
        stats.total += elapsed;
    }

    /// Snapshot of all phases recorded so far.
    pub fn stats(&self) -> BTreeMap<&'static str, PhaseStats> {
        self.phases.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn log_summary(&self) {
        for (phase, stats) in self.stats() {
            tracing::debug!(
                phase,
                calls = stats.count,
                total_ms = stats.total.as_secs_f64() * 1e3,
                "profile"
            );
        }
    }
}

/// Guard returned by [`Profiler::profile`].
pub struct ProfileGuard<'a> {
    profiler: &'a Profiler,
    phase: &'static str,
    start: Instant,
    _span: tracing::span::EnteredSpan,
}

impl Drop for ProfileGuard<'_> {
    fn drop(&mut self) {
        self.profiler.record(self.phase, self.start.elapsed());
    }
}
