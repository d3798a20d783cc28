//! Global atomic counters for phase coordination.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a pipeline run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters: no allocations, no locking.
pub struct Metrics {
    phases_executed: AtomicU64,
    agent_failures: AtomicU64,
    gate_evaluations: AtomicU64,
    gate_retries: AtomicU64,
    security_scans: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            phases_executed: AtomicU64::new(0),
            agent_failures: AtomicU64::new(0),
            gate_evaluations: AtomicU64::new(0),
            gate_retries: AtomicU64::new(0),
            security_scans: AtomicU64::new(0),
        }
    }

    pub fn inc_phases(&self) {
        self.phases_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "phases_executed", "counter incremented");
    }

    pub fn add_agent_failures(&self, n: u64) {
        if n > 0 {
            self.agent_failures.fetch_add(n, Ordering::Relaxed);
            tracing::trace!(metric = "agent_failures", n, "counter incremented");
        }
    }

    pub fn inc_gate_evaluations(&self) {
        self.gate_evaluations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "gate_evaluations", "counter incremented");
    }

    pub fn inc_gate_retries(&self) {
        self.gate_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "gate_retries", "counter incremented");
    }

    pub fn inc_security_scans(&self) {
        self.security_scans.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "security_scans", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            phases_executed = self.phases_executed(),
            agent_failures = self.agent_failures(),
            gate_evaluations = self.gate_evaluations(),
            gate_retries = self.gate_retries(),
            security_scans = self.security_scans(),
        );
    }

    pub fn phases_executed(&self) -> u64 {
        self.phases_executed.load(Ordering::Relaxed)
    }

    pub fn agent_failures(&self) -> u64 {
        self.agent_failures.load(Ordering::Relaxed)
    }

    pub fn gate_evaluations(&self) -> u64 {
        self.gate_evaluations.load(Ordering::Relaxed)
    }

    pub fn gate_retries(&self) -> u64 {
        self.gate_retries.load(Ordering::Relaxed)
    }

    pub fn security_scans(&self) -> u64 {
        self.security_scans.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.phases_executed.store(0, Ordering::Relaxed);
        self.agent_failures.store(0, Ordering::Relaxed);
        self.gate_evaluations.store(0, Ordering::Relaxed);
        self.gate_retries.store(0, Ordering::Relaxed);
        self.security_scans.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_phases();
        m.inc_phases();
        assert_eq!(m.phases_executed(), 2);

        m.add_agent_failures(3);
        m.add_agent_failures(0);
        assert_eq!(m.agent_failures(), 3);

        m.inc_gate_evaluations();
        m.inc_gate_retries();
        m.inc_security_scans();
        assert_eq!(m.gate_evaluations(), 1);
        assert_eq!(m.gate_retries(), 1);
        assert_eq!(m.security_scans(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_phases();
        m.add_agent_failures(2);
        m.inc_gate_retries();
        m.reset();
        assert_eq!(m.phases_executed(), 0);
        assert_eq!(m.agent_failures(), 0);
        assert_eq!(m.gate_retries(), 0);
    }
}
