//! Domain models for phase coordination.
//!
//! - `Artifact`: typed, immutable agent output
//! - `MetricMap`: named gate metrics with zero-value defaults
//! - `PhaseInput` / `AgentInput` / `PhaseResult`: per-attempt data flow
//! - error taxonomy shared by every layer

pub mod artifact;
pub mod error;
pub mod metrics;
pub mod phase;

pub use artifact::{Artifact, ArtifactContent, ArtifactMetadata};
pub use error::{AgentError, ConfigError, PhaseError, Result};
pub use metrics::{MetricMap, MetricValue};
pub use phase::{AgentInput, PhaseFailure, PhaseInput, PhaseResult, PhaseSummary, RetryContext};
