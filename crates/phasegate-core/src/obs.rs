//! Structured observability hooks for phase lifecycle events.
//!
//! This module provides:
//! - Phase-scoped tracing spans via [`phase_span`] and the [`PhaseSpan`] RAII guard
//! - A typed [`PhaseEvent`] stream delivered to an [`EventSink`]
//!
//! Coordinators emit events unconditionally; whether anything listens is up
//! to the sink. [`TracingEventSink`] is the default and logs each event at
//! `info!` (failures at `warn!`). For JSON output, initialise tracing with
//! `json = true` (see [`crate::telemetry::init_tracing`]).

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn, Span};

use crate::gate::Decision;

/// Span covering one phase run. Attach with `Instrument::instrument` in
/// async code.
pub fn phase_span(run_id: &str, phase: &str) -> Span {
    tracing::info_span!("phasegate.phase", run_id = %run_id, phase = %phase)
}

/// RAII guard that enters a phase span for synchronous code.
///
/// # Example
///
/// ```ignore
/// let _span = PhaseSpan::enter("run-12345", "beta");
/// // tracing calls are now tagged with run_id and phase
/// ```
pub struct PhaseSpan {
    _span: tracing::span::EnteredSpan,
}

impl PhaseSpan {
    pub fn enter(run_id: &str, phase: &str) -> Self {
        Self {
            _span: phase_span(run_id, phase).entered(),
        }
    }
}

/// Lifecycle events emitted by the coordinators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PhaseEvent {
    PhaseStarted {
        run_id: String,
        phase: String,
        attempt: u32,
        agents: usize,
    },
    AgentSettled {
        run_id: String,
        phase: String,
        agent: String,
        success: bool,
        artifacts: usize,
        error: Option<String>,
    },
    PhaseCompleted {
        run_id: String,
        phase: String,
        success: bool,
        succeeded: usize,
        failed: usize,
        composite_score: Option<u32>,
        duration_ms: u64,
    },
    GateEvaluated {
        run_id: String,
        phase: String,
        attempt: u32,
        decision: Decision,
        overall_score: u32,
        failed_metrics: usize,
    },
    RetryScheduled {
        run_id: String,
        phase: String,
        next_attempt: u32,
        max_attempts: u32,
        hints: usize,
    },
    ScannerSkipped {
        run_id: String,
        scanner: String,
        reason: String,
    },
    ScannerFailed {
        run_id: String,
        scanner: String,
        critical: bool,
        error: String,
    },
}

impl PhaseEvent {
    /// Dotted event name used in log output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PhaseStarted { .. } => "phase.started",
            Self::AgentSettled { .. } => "agent.settled",
            Self::PhaseCompleted { .. } => "phase.completed",
            Self::GateEvaluated { .. } => "gate.evaluated",
            Self::RetryScheduled { .. } => "gate.retry_scheduled",
            Self::ScannerSkipped { .. } => "security.scanner_skipped",
            Self::ScannerFailed { .. } => "security.scanner_failed",
        }
    }
}

/// Receives lifecycle events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PhaseEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &PhaseEvent) {
        let name = event.name();
        match event {
            PhaseEvent::PhaseStarted {
                run_id,
                phase,
                attempt,
                agents,
            } => info!(event = name, run_id = %run_id, phase = %phase, attempt = attempt, agents = agents),
            PhaseEvent::AgentSettled {
                run_id,
                phase,
                agent,
                success: true,
                artifacts,
                ..
            } => info!(event = name, run_id = %run_id, phase = %phase, agent = %agent, success = true, artifacts = artifacts),
            PhaseEvent::AgentSettled {
                run_id,
                phase,
                agent,
                error,
                ..
            } => warn!(
                event = name,
                run_id = %run_id,
                phase = %phase,
                agent = %agent,
                success = false,
                error = error.as_deref().unwrap_or("unknown"),
            ),
            PhaseEvent::PhaseCompleted {
                run_id,
                phase,
                success,
                succeeded,
                failed,
                composite_score,
                duration_ms,
            } => info!(
                event = name,
                run_id = %run_id,
                phase = %phase,
                success = success,
                succeeded = succeeded,
                failed = failed,
                composite_score = composite_score,
                duration_ms = duration_ms,
            ),
            PhaseEvent::GateEvaluated {
                run_id,
                phase,
                attempt,
                decision,
                overall_score,
                failed_metrics,
            } => info!(
                event = name,
                run_id = %run_id,
                phase = %phase,
                attempt = attempt,
                decision = %decision,
                overall_score = overall_score,
                failed_metrics = failed_metrics,
            ),
            PhaseEvent::RetryScheduled {
                run_id,
                phase,
                next_attempt,
                max_attempts,
                hints,
            } => warn!(
                event = name,
                run_id = %run_id,
                phase = %phase,
                next_attempt = next_attempt,
                max_attempts = max_attempts,
                hints = hints,
            ),
            PhaseEvent::ScannerSkipped {
                run_id,
                scanner,
                reason,
            } => info!(event = name, run_id = %run_id, scanner = %scanner, reason = %reason),
            PhaseEvent::ScannerFailed {
                run_id,
                scanner,
                critical,
                error,
            } => warn!(event = name, run_id = %run_id, scanner = %scanner, critical = critical, error = %error),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &PhaseEvent) {}
}

/// Keeps events in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<PhaseEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PhaseEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Names of the recorded events, e.g. `["phase.started", ...]`.
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(PhaseEvent::name).collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &PhaseEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
