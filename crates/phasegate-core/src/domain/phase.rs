//! Phase input, per-agent input and phase results.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::artifact::Artifact;
use crate::domain::error::{PhaseError, Result};
use crate::gate::{FailedMetric, GateDecision};
use crate::status::ReadinessStatus;

/// Input handed to a coordinator by the outer pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseInput {
    pub workflow_run_id: String,
    pub project_id: String,
    #[serde(default)]
    pub previous_artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idea_spec: Option<serde_json::Value>,
}

impl PhaseInput {
    pub fn new(workflow_run_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            workflow_run_id: workflow_run_id.into(),
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn with_previous_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.previous_artifacts = artifacts;
        self
    }

    pub fn with_idea_spec(mut self, spec: serde_json::Value) -> Self {
        self.idea_spec = Some(spec);
        self
    }
}

/// Feedback threaded into a retry attempt after a gate failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryContext {
    /// 1-based number of the attempt about to run.
    pub attempt: u32,
    pub max_attempts: u32,
    pub hints: Vec<String>,
    pub previous_gate_result: GateDecision,
}

/// What every agent in a phase receives.
///
/// `previous_artifacts` is shared read-only between all agents of one
/// attempt.
#[derive(Debug, Clone, Default)]
pub struct AgentInput {
    pub workflow_run_id: String,
    pub project_id: String,
    pub previous_artifacts: Arc<[Artifact]>,
    pub idea_spec: Option<serde_json::Value>,
    pub gate_hints: Vec<String>,
    pub retry_reason: Option<String>,
    pub previous_gate_result: Option<GateDecision>,
}

impl AgentInput {
    pub fn from_phase(input: &PhaseInput) -> Self {
        Self {
            workflow_run_id: input.workflow_run_id.clone(),
            project_id: input.project_id.clone(),
            previous_artifacts: Arc::from(input.previous_artifacts.clone()),
            idea_spec: input.idea_spec.clone(),
            ..Self::default()
        }
    }

    /// Attach retry feedback under the reserved hint fields.
    pub fn with_retry(mut self, retry: &RetryContext) -> Self {
        self.gate_hints = retry.hints.clone();
        self.retry_reason = Some(format!(
            "gate failed on attempt {} of {}: {} metric(s) below threshold",
            retry.attempt.saturating_sub(1),
            retry.max_attempts,
            retry.previous_gate_result.failed_metrics.len(),
        ));
        self.previous_gate_result = Some(retry.previous_gate_result.clone());
        self
    }

    pub fn is_retry(&self) -> bool {
        self.previous_gate_result.is_some()
    }
}

/// Summary attached to a successful phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: String,
    pub composite_score: u32,
    pub status: ReadinessStatus,
    pub dimensions: BTreeMap<String, u32>,
    pub agents_succeeded: usize,
    pub agents_failed: usize,
    /// Display strings of the agent failures tolerated by the phase.
    #[serde(default)]
    pub failures: Vec<String>,
}

/// Why a phase attempt did not produce an acceptable result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseFailure {
    /// Fewer agents succeeded than the phase minimum. Not retried here.
    InsufficientSuccesses {
        succeeded: usize,
        required: usize,
        failures: Vec<String>,
    },
    /// The gate kept failing until retries ran out.
    GateBlocked {
        attempts: u32,
        decision: GateDecision,
    },
}

/// Output of one phase attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: String,
    pub success: bool,
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<PhaseSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PhaseFailure>,
}

impl PhaseResult {
    pub fn succeeded(
        phase: impl Into<String>,
        artifacts: Vec<Artifact>,
        summary: PhaseSummary,
    ) -> Self {
        Self {
            phase: phase.into(),
            success: true,
            artifacts,
            summary: Some(summary),
            failure: None,
        }
    }

    pub fn failed(phase: impl Into<String>, failure: PhaseFailure) -> Self {
        Self {
            phase: phase.into(),
            success: false,
            artifacts: Vec::new(),
            summary: None,
            failure: Some(failure),
        }
    }

    /// Convert a failed result into the matching [`PhaseError`].
    pub fn into_outcome(self) -> Result<Self> {
        match &self.failure {
            None => Ok(self),
            Some(PhaseFailure::InsufficientSuccesses {
                succeeded,
                required,
                failures,
            }) => Err(PhaseError::InsufficientSuccesses {
                phase: self.phase.clone(),
                succeeded: *succeeded,
                required: *required,
                failures: failures.clone(),
            }),
            Some(PhaseFailure::GateBlocked { attempts, decision }) => {
                Err(PhaseError::GateBlocked {
                    phase: self.phase.clone(),
                    attempts: *attempts,
                    failed_metrics: decision.failed_metrics.clone(),
                })
            }
        }
    }

    /// Metrics that blocked the phase, if it was blocked by its gate.
    pub fn blocking_metrics(&self) -> &[FailedMetric] {
        match &self.failure {
            Some(PhaseFailure::GateBlocked { decision, .. }) => &decision.failed_metrics,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_input_shares_previous_artifacts() {
        let input = PhaseInput::new("run-1", "proj-1");
        let agent_input = AgentInput::from_phase(&input);
        let clone = agent_input.clone();
        assert!(Arc::ptr_eq(
            &agent_input.previous_artifacts,
            &clone.previous_artifacts
        ));
        assert!(!agent_input.is_retry());
    }

    #[test]
    fn retry_context_at_attempt_zero_does_not_underflow() {
        let retry = RetryContext {
            attempt: 0,
            max_attempts: 3,
            hints: vec!["increase tester_count".to_string()],
            previous_gate_result: GateDecision {
                decision: crate::gate::Decision::Fail,
                overall_score: 40,
                failed_metrics: Vec::new(),
                warnings: Vec::new(),
            },
        };
        let input = AgentInput::from_phase(&PhaseInput::new("run-1", "proj-1")).with_retry(&retry);
        assert!(input.is_retry());
        assert_eq!(
            input.retry_reason.as_deref(),
            Some("gate failed on attempt 0 of 3: 0 metric(s) below threshold")
        );
        assert_eq!(input.gate_hints, vec!["increase tester_count"]);
    }

    #[test]
    fn insufficient_successes_maps_to_phase_error() {
        let result = PhaseResult::failed(
            "beta",
            PhaseFailure::InsufficientSuccesses {
                succeeded: 1,
                required: 2,
                failures: vec!["agent x failed: boom".to_string()],
            },
        );
        assert!(!result.success);
        let err = result.into_outcome().unwrap_err();
        assert!(matches!(err, PhaseError::InsufficientSuccesses { .. }));
    }
}
