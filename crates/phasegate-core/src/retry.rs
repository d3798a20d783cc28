//! Gate-driven retry loop.
//!
//! This module provides:
//! - [`GateInputBuilder`], the phase-specific projection of a result into gate metrics
//! - [`build_hints`], which turns failed metrics into instructions for agents
//! - [`EnhancedPhaseCoordinator`], a bounded run → gate → retry loop
//!
//! A failed gate re-runs the whole phase with the hints and the previous
//! decision attached to every agent's input. Attempts are capped at
//! `max_gate_retries + 1`. A phase that fails its minimum-successes policy
//! is returned as is and never retried here.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::coordinator::PhaseCoordinator;
use crate::domain::{
    AgentInput, ConfigError, MetricValue, PhaseFailure, PhaseInput, PhaseResult, Result,
    RetryContext,
};
use crate::gate::{Comparator, Gate, GateDecision, GateEvaluationInput, GateTable};
use crate::metrics::METRICS;
use crate::obs::{phase_span, PhaseEvent};

/// Projects a phase result into the metric map its gate expects.
pub trait GateInputBuilder: Send + Sync {
    /// Metrics the threshold table must contain a row for.
    fn required_metrics(&self) -> Vec<String>;

    /// Every metric `build` can emit. Table rows outside this set are
    /// rejected at construction.
    fn produced_metrics(&self) -> Vec<String>;

    fn build(&self, run_id: &str, result: &PhaseResult) -> GateEvaluationInput;
}

fn default_auto_retry() -> bool {
    true
}

fn default_max_gate_retries() -> u32 {
    2
}

/// Bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_auto_retry")]
    pub auto_retry_on_gate_fail: bool,
    #[serde(default = "default_max_gate_retries")]
    pub max_gate_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            auto_retry_on_gate_fail: default_auto_retry(),
            max_gate_retries: default_max_gate_retries(),
        }
    }
}

/// Upper bound on `max_gate_retries`.
pub const MAX_GATE_RETRIES: u32 = 10;

impl RetryPolicy {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.max_gate_retries > MAX_GATE_RETRIES {
            return Err(ConfigError::InvalidRetryPolicy {
                reason: format!(
                    "max_gate_retries is {}, at most {MAX_GATE_RETRIES} allowed",
                    self.max_gate_retries
                ),
            });
        }
        Ok(())
    }

    pub fn disabled() -> Self {
        Self {
            auto_retry_on_gate_fail: false,
            max_gate_retries: 0,
        }
    }

    /// Total attempts, first run included.
    pub fn max_attempts(&self) -> u32 {
        if self.auto_retry_on_gate_fail {
            self.max_gate_retries.saturating_add(1)
        } else {
            1
        }
    }
}

/// Final state of a gated phase run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatedOutcome {
    pub result: PhaseResult,
    /// Decision of the last attempt; `None` if the gate never ran.
    pub gate: Option<GateDecision>,
    pub attempts: u32,
    /// Every gate decision, oldest first.
    pub history: Vec<GateDecision>,
}

impl GatedOutcome {
    pub fn passed(&self) -> bool {
        self.result.success && self.gate.as_ref().is_some_and(GateDecision::passed)
    }
}

/// One instruction per failed metric.
pub fn build_hints(decision: &GateDecision) -> Vec<String> {
    decision
        .failed_metrics
        .iter()
        .map(|m| match (m.comparator, m.threshold) {
            (Comparator::Gte, t) => format!(
                "increase {}: currently {}, need >= {}",
                m.metric, m.actual, t
            ),
            (Comparator::Lte, t) => format!(
                "reduce {}: currently {}, need <= {}",
                m.metric, m.actual, t
            ),
            (Comparator::Eq, MetricValue::Flag(t)) => {
                format!("ensure {} is {} (currently {})", m.metric, t, m.actual)
            }
            (Comparator::Eq, t) => {
                format!("set {} to {} (currently {})", m.metric, t, m.actual)
            }
        })
        .collect()
}

/// A [`PhaseCoordinator`] wrapped in a gate with automatic retries.
pub struct EnhancedPhaseCoordinator {
    inner: PhaseCoordinator,
    gate: Gate,
    builder: Arc<dyn GateInputBuilder>,
    policy: RetryPolicy,
}

impl EnhancedPhaseCoordinator {
    /// Fails if the table lacks a row the builder requires, or names a
    /// metric the builder never produces.
    pub fn new(
        inner: PhaseCoordinator,
        table: GateTable,
        builder: Arc<dyn GateInputBuilder>,
        policy: RetryPolicy,
    ) -> std::result::Result<Self, ConfigError> {
        policy.validate()?;
        let phase = inner.phase_name();
        let required = builder.required_metrics();
        table.require_metrics(phase, required.iter().map(String::as_str))?;
        let produced = builder.produced_metrics();
        table.check_known(phase, produced.iter().map(String::as_str))?;

        Ok(Self {
            inner,
            gate: Gate::new(table),
            builder,
            policy,
        })
    }

    pub fn coordinator(&self) -> &PhaseCoordinator {
        &self.inner
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn execute(&self, input: &PhaseInput) -> Result<GatedOutcome> {
        let span = phase_span(&input.workflow_run_id, self.inner.phase_name());
        self.run_gated(input).instrument(span).await
    }

    async fn run_gated(&self, input: &PhaseInput) -> Result<GatedOutcome> {
        let run_id = input.workflow_run_id.as_str();
        let phase = self.inner.phase_name();
        let events = self.inner.events();
        let max_attempts = self.policy.max_attempts();

        let mut history: Vec<GateDecision> = Vec::new();
        let mut retry: Option<RetryContext> = None;
        let mut attempt = 1u32;

        loop {
            let mut agent_input = AgentInput::from_phase(input);
            if let Some(ctx) = &retry {
                agent_input = agent_input.with_retry(ctx);
            }

            let result = self.inner.run_attempt(agent_input, attempt).await?;
            if !result.success {
                return Ok(GatedOutcome {
                    result,
                    gate: None,
                    attempts: attempt,
                    history,
                });
            }

            let decision = self.gate.evaluate(&self.builder.build(run_id, &result));
            METRICS.inc_gate_evaluations();
            events.emit(&PhaseEvent::GateEvaluated {
                run_id: run_id.to_string(),
                phase: phase.to_string(),
                attempt,
                decision: decision.decision,
                overall_score: decision.overall_score,
                failed_metrics: decision.failed_metrics.len(),
            });
            history.push(decision.clone());

            if decision.passed() {
                return Ok(GatedOutcome {
                    result,
                    gate: Some(decision),
                    attempts: attempt,
                    history,
                });
            }

            if attempt >= max_attempts {
                let blocked = PhaseResult {
                    success: false,
                    failure: Some(PhaseFailure::GateBlocked {
                        attempts: attempt,
                        decision: decision.clone(),
                    }),
                    ..result
                };
                return Ok(GatedOutcome {
                    result: blocked,
                    gate: Some(decision),
                    attempts: attempt,
                    history,
                });
            }

            let hints = build_hints(&decision);
            METRICS.inc_gate_retries();
            events.emit(&PhaseEvent::RetryScheduled {
                run_id: run_id.to_string(),
                phase: phase.to_string(),
                next_attempt: attempt + 1,
                max_attempts,
                hints: hints.len(),
            });
            attempt += 1;
            retry = Some(RetryContext {
                attempt,
                max_attempts,
                hints,
                previous_gate_result: decision,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{Decision, FailedMetric};

    fn decision(failed: Vec<FailedMetric>) -> GateDecision {
        GateDecision {
            decision: Decision::Fail,
            overall_score: 55,
            failed_metrics: failed,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn hints_name_metric_actual_and_threshold() {
        let hints = build_hints(&decision(vec![
            FailedMetric {
                metric: "tester_count".to_string(),
                actual: MetricValue::Number(12.0),
                threshold: MetricValue::Number(50.0),
                comparator: Comparator::Gte,
            },
            FailedMetric {
                metric: "critical_violations".to_string(),
                actual: MetricValue::Number(2.0),
                threshold: MetricValue::Number(0.0),
                comparator: Comparator::Lte,
            },
            FailedMetric {
                metric: "crash_reporting".to_string(),
                actual: MetricValue::Flag(false),
                threshold: MetricValue::Flag(true),
                comparator: Comparator::Eq,
            },
        ]));
        assert_eq!(
            hints,
            vec![
                "increase tester_count: currently 12, need >= 50",
                "reduce critical_violations: currently 2, need <= 0",
                "ensure crash_reporting is true (currently false)",
            ]
        );
    }

    #[test]
    fn policy_counts_first_attempt() {
        assert_eq!(RetryPolicy::default().max_attempts(), 3);
        assert_eq!(RetryPolicy::disabled().max_attempts(), 1);
        let no_auto = RetryPolicy {
            auto_retry_on_gate_fail: false,
            max_gate_retries: 5,
        };
        assert_eq!(no_auto.max_attempts(), 1);
    }

    #[test]
    fn oversized_retry_budget_is_rejected() {
        let policy = RetryPolicy {
            auto_retry_on_gate_fail: true,
            max_gate_retries: MAX_GATE_RETRIES + 1,
        };
        assert!(matches!(
            policy.validate(),
            Err(ConfigError::InvalidRetryPolicy { .. })
        ));
    }

    #[test]
    fn policy_defaults_from_empty_toml() {
        let policy: RetryPolicy = toml::from_str("").unwrap();
        assert_eq!(policy, RetryPolicy::default());
    }
}
