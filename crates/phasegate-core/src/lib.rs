//! PhaseGate Core Library
//!
//! Phase coordination and quality gating for multi-agent pipelines: bounded
//! concurrent dispatch, minimum-success policies, bucket scoring, threshold
//! gates with hinted retries, and security scan roll-up.

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod domain;
pub mod gate;
pub mod metrics;
pub mod obs;
pub mod reporting;
pub mod retry;
pub mod scoring;
pub mod security;
pub mod status;
pub mod telemetry;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use agent::{Agent, AgentOutput, AgentResult, FnAgent};
pub use config::PhaseGateConfig;
pub use coordinator::{
    AgentFailure, AgentSuccess, Aggregation, AggregationContext, Aggregator, PhaseConfig,
    PhaseCoordinator,
};
pub use dispatcher::{run_all, Settled, Task, TaskAborted};
pub use domain::{
    AgentError, AgentInput, Artifact, ArtifactContent, ArtifactMetadata, ConfigError, MetricMap,
    MetricValue, PhaseError, PhaseFailure, PhaseInput, PhaseResult, PhaseSummary, Result,
    RetryContext,
};
pub use gate::{
    evaluate_gate, Comparator, Decision, FailedMetric, Gate, GateDecision, GateEvaluationInput,
    GateTable, MetricRule, RuleLevel,
};
pub use obs::{EventSink, MemoryEventSink, NoopEventSink, PhaseEvent, PhaseSpan, TracingEventSink};
pub use reporting::{
    read_gate_report, render_gate_report_md, write_gate_report, write_gate_report_md, GateReport,
};
pub use retry::{
    build_hints, EnhancedPhaseCoordinator, GateInputBuilder, GatedOutcome, RetryPolicy,
};
pub use scoring::phase::{Dimension, PhaseScores, ScoredPhase};
pub use scoring::{BucketTable, DimensionScorer, ScoreWeights};
pub use security::{
    CriticalScanners, ScanReport, ScanTarget, SecurityCoordinator, SecurityError,
    SecurityOutcome, SecurityReport, SecurityScanner, SecurityStatus, Severity, SeveritySummary,
};
pub use status::{ReadinessStatus, StatusPolicy};
