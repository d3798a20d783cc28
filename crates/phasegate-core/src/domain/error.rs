//! Error taxonomy for phase coordination and gating.

/// Failure of a single agent invocation.
///
/// Agent failures are captured by the dispatcher and never abort a batch.
/// They only escalate to a phase failure when they push the number of
/// successful agents below the phase minimum.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("agent {agent} failed: {reason}")]
    Failed { agent: String, reason: String },

    #[error("agent {agent} produced invalid output: {reason}")]
    InvalidOutput { agent: String, reason: String },

    #[error("task {index} aborted: {detail}")]
    Panicked { index: usize, detail: String },
}

impl AgentError {
    pub fn failed(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            agent: agent.into(),
            reason: reason.into(),
        }
    }
}

/// Construction-time configuration errors. Raised before any agent runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("weights for {phase} sum to {sum}, expected 1.0")]
    WeightSum { phase: String, sum: f64 },

    #[error("weight for dimension {dimension} must be finite and non-negative, got {weight}")]
    InvalidWeight { dimension: String, weight: f64 },

    #[error("no score weights configured for {phase}")]
    EmptyWeights { phase: String },

    #[error("metric {metric} is referenced by {phase} but missing from the threshold table")]
    MissingThreshold { phase: String, metric: String },

    #[error("threshold table for {phase} names metric {metric}, which the phase never produces")]
    UnknownMetric { phase: String, metric: String },

    #[error("metric {metric} has an invalid threshold: {reason}")]
    InvalidThreshold { metric: String, reason: String },

    #[error("metric {metric} appears more than once in the threshold table")]
    DuplicateThreshold { metric: String },

    #[error("metric {metric}: {comparator} cannot compare a {kind} threshold")]
    ComparatorMismatch {
        metric: String,
        comparator: String,
        kind: String,
    },

    #[error("phase {phase} requires {required} successful agents but only has {available}")]
    MinAgentsUnreachable {
        phase: String,
        required: usize,
        available: usize,
    },

    #[error("phase {phase}: {reason}")]
    InvalidPhase { phase: String, reason: String },

    #[error("invalid retry policy: {reason}")]
    InvalidRetryPolicy { reason: String },

    #[error("bucket table for {dimension} is invalid: {reason}")]
    InvalidBuckets { dimension: String, reason: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Run-time errors for a phase attempt.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error(
        "phase {phase} had {succeeded} successful agents, {required} required ({} failed)",
        .failures.len()
    )]
    InsufficientSuccesses {
        phase: String,
        succeeded: usize,
        required: usize,
        failures: Vec<String>,
    },

    #[error(
        "phase {phase} blocked after {attempts} attempt(s): {}",
        describe_failed(.failed_metrics)
    )]
    GateBlocked {
        phase: String,
        attempts: u32,
        failed_metrics: Vec<crate::gate::FailedMetric>,
    },

    #[error("aggregation failed for {phase}: {reason}")]
    Aggregation { phase: String, reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid report {field} {value:?}: must be a single path component")]
    InvalidReportKey { field: &'static str, value: String },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_failed(failed: &[crate::gate::FailedMetric]) -> String {
    failed
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for phase operations.
pub type Result<T> = std::result::Result<T, PhaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_display() {
        let err = AgentError::failed("telemetry-agent", "llm timeout");
        assert_eq!(err.to_string(), "agent telemetry-agent failed: llm timeout");
    }

    #[test]
    fn test_insufficient_successes_reports_counts() {
        let err = PhaseError::InsufficientSuccesses {
            phase: "beta".to_string(),
            succeeded: 1,
            required: 2,
            failures: vec![
                AgentError::failed("a", "x").to_string(),
                AgentError::failed("b", "y").to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("1 successful"));
        assert!(msg.contains("2 required"));
        assert!(msg.contains("2 failed"));
    }

    #[test]
    fn test_config_error_wraps_into_phase_error() {
        let err: PhaseError = ConfigError::WeightSum {
            phase: "qa".to_string(),
            sum: 0.9,
        }
        .into();
        assert!(err.to_string().contains("sum to 0.9"));
    }
}
