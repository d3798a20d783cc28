//! Table-driven phase aggregator.
//!
//! A [`ScoredPhase`] describes one phase entirely as data: which artifact
//! type feeds each dimension, how raw metrics are pulled out of it, the
//! bucket tables that score them, the composite weights and the status
//! policy. It implements both [`Aggregator`] (for the coordinator) and
//! [`GateInputBuilder`] (for the retry loop), so both views of a phase are
//! derived from the same tables.

use std::collections::{BTreeMap, HashSet};

use crate::coordinator::{Aggregation, AggregationContext, Aggregator};
use crate::domain::artifact::PhaseComplete;
use crate::domain::{
    Artifact, ArtifactContent, ConfigError, MetricMap, MetricValue, PhaseResult, PhaseSummary,
    Result,
};
use crate::gate::GateEvaluationInput;
use crate::retry::GateInputBuilder;
use crate::scoring::{DimensionScorer, ScoreWeights};
use crate::status::{ReadinessStatus, StatusPolicy};

/// Gate metric carrying the composite score.
pub const READINESS_SCORE: &str = "readiness_score";

/// Pulls raw metrics out of a payload, or `None` if the payload is of
/// another type.
pub type Extractor = fn(&ArtifactContent) -> Option<MetricMap>;

/// Computes a gate metric from the merged raw metrics.
pub type Derivation = fn(&MetricMap) -> MetricValue;

/// One scored dimension of a phase.
#[derive(Debug, Clone)]
pub struct Dimension {
    pub name: String,
    pub artifact_type: &'static str,
    pub extract: Extractor,
    /// Every raw metric name `extract` may emit.
    pub outputs: Vec<&'static str>,
    pub scorer: DimensionScorer,
}

impl Dimension {
    pub fn new(
        name: impl Into<String>,
        artifact_type: &'static str,
        extract: Extractor,
        outputs: &[&'static str],
        scorer: DimensionScorer,
    ) -> Self {
        Self {
            name: name.into(),
            artifact_type,
            extract,
            outputs: outputs.to_vec(),
            scorer,
        }
    }

    /// Gate metric name for this dimension's score.
    pub fn score_metric(&self) -> String {
        format!("{}_score", self.name)
    }
}

/// Scores computed from one set of artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseScores {
    pub raw: MetricMap,
    pub dimensions: BTreeMap<String, u32>,
    pub composite: u32,
    pub status: ReadinessStatus,
}

#[derive(Debug, Clone)]
struct DerivedMetric {
    name: &'static str,
    compute: Derivation,
}

/// A phase described by its scoring tables.
#[derive(Debug, Clone)]
pub struct ScoredPhase {
    phase: String,
    dimensions: Vec<Dimension>,
    weights: ScoreWeights,
    status: StatusPolicy,
    derived: Vec<DerivedMetric>,
    gated: Vec<String>,
}

impl ScoredPhase {
    /// Validate and build. Weights must name exactly the given dimensions
    /// and sum to 1.0.
    pub fn new(
        phase: impl Into<String>,
        dimensions: Vec<Dimension>,
        weights: &[(&str, f64)],
        status: StatusPolicy,
    ) -> std::result::Result<Self, ConfigError> {
        let phase = phase.into();
        let weights = ScoreWeights::new(phase.clone(), weights)?;

        let names: HashSet<&str> = dimensions.iter().map(|d| d.name.as_str()).collect();
        if names.len() != dimensions.len() {
            return Err(ConfigError::InvalidPhase {
                phase,
                reason: "dimension names must be unique".to_string(),
            });
        }
        if let Some(extra) = weights.dimensions().find(|d| !names.contains(d)) {
            return Err(ConfigError::InvalidPhase {
                reason: format!("weight given for unknown dimension {extra}"),
                phase,
            });
        }

        let mut outputs = HashSet::new();
        for dim in &dimensions {
            if weights.weight(&dim.name).is_none() {
                return Err(ConfigError::InvalidPhase {
                    reason: format!("dimension {} has no weight", dim.name),
                    phase,
                });
            }
            dim.scorer.validate()?;
            if let Some(slice) = dim
                .scorer
                .slices
                .iter()
                .find(|s| !dim.outputs.iter().any(|o| *o == s.metric))
            {
                return Err(ConfigError::InvalidBuckets {
                    dimension: dim.name.clone(),
                    reason: format!("slice reads {}, which the extractor never emits", slice.metric),
                });
            }
            outputs.extend(dim.outputs.iter().copied());
        }

        status.validate(&phase)?;
        if let Some(flag) = status
            .required_flags
            .iter()
            .find(|f| !outputs.contains(f.as_str()))
        {
            return Err(ConfigError::InvalidPhase {
                reason: format!("status flag {flag} is never extracted"),
                phase,
            });
        }

        Ok(Self {
            phase,
            dimensions,
            weights,
            status,
            derived: Vec::new(),
            gated: vec![READINESS_SCORE.to_string()],
        })
    }

    /// Add a gate metric computed from the raw metrics.
    pub fn with_derived(mut self, name: &'static str, compute: Derivation) -> Self {
        self.derived.push(DerivedMetric { name, compute });
        self
    }

    /// Metrics that any threshold table for this phase must gate on.
    /// `readiness_score` is always included.
    pub fn with_gated_metrics(mut self, metrics: &[&str]) -> Self {
        for m in metrics {
            if !self.gated.iter().any(|g| g == m) {
                self.gated.push(m.to_string());
            }
        }
        self
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn status_policy(&self) -> &StatusPolicy {
        &self.status
    }

    /// Score `artifacts`. For each dimension the first artifact its
    /// extractor accepts is used; a dimension with none scores 0.
    pub fn score(&self, artifacts: &[Artifact]) -> PhaseScores {
        let mut raw = MetricMap::new();
        let mut dimensions = BTreeMap::new();

        for dim in &self.dimensions {
            let extracted = artifacts
                .iter()
                .find_map(|a| (dim.extract)(&a.content))
                .unwrap_or_default();
            dimensions.insert(dim.name.clone(), dim.scorer.score(&extracted));
            for (name, value) in extracted.iter() {
                raw.insert(name, *value);
            }
        }

        let composite = self.weights.composite(&dimensions);
        let status = self.status.classify(composite, &dimensions, &raw);
        PhaseScores {
            raw,
            dimensions,
            composite,
            status,
        }
    }

    /// Gate metrics for already computed scores.
    pub fn gate_metrics(&self, scores: &PhaseScores) -> MetricMap {
        let mut metrics = scores.raw.clone();
        for derived in &self.derived {
            metrics.insert(derived.name, (derived.compute)(&scores.raw));
        }
        for dim in &self.dimensions {
            let score = scores.dimensions.get(&dim.name).copied().unwrap_or(0);
            metrics.insert(dim.score_metric(), score);
        }
        metrics.insert(READINESS_SCORE, scores.composite);
        metrics
    }
}

impl Aggregator for ScoredPhase {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.status.validate(&self.phase)?;
        self.dimensions
            .iter()
            .try_for_each(|d| d.scorer.validate())
    }

    fn aggregate(&self, ctx: &AggregationContext<'_>) -> Result<Aggregation> {
        let inputs = ctx.collected_artifacts();
        let scores = self.score(&inputs);

        let complete = PhaseComplete {
            phase: self.phase.clone(),
            composite_score: scores.composite,
            status: scores.status.to_string(),
            dimensions: scores.dimensions.clone(),
            agents_succeeded: ctx.successes.len(),
            agents_failed: ctx.failures.len(),
            input_digests: inputs.iter().map(Artifact::digest).collect(),
        };

        tracing::debug!(
            phase = %self.phase,
            composite = scores.composite,
            status = %scores.status,
            "phase aggregated"
        );

        Ok(Aggregation {
            artifacts: vec![Artifact::from_agent(
                format!("{}-aggregator", self.phase),
                ArtifactContent::PhaseComplete(complete),
            )],
            summary: PhaseSummary {
                phase: self.phase.clone(),
                composite_score: scores.composite,
                status: scores.status,
                dimensions: scores.dimensions,
                agents_succeeded: ctx.successes.len(),
                agents_failed: ctx.failures.len(),
                failures: ctx.failures.iter().map(|f| f.error.to_string()).collect(),
            },
        })
    }
}

impl GateInputBuilder for ScoredPhase {
    fn required_metrics(&self) -> Vec<String> {
        self.gated.clone()
    }

    fn produced_metrics(&self) -> Vec<String> {
        let mut produced: Vec<String> = self
            .dimensions
            .iter()
            .flat_map(|d| d.outputs.iter().map(|o| o.to_string()))
            .collect();
        produced.extend(self.derived.iter().map(|d| d.name.to_string()));
        produced.extend(self.dimensions.iter().map(Dimension::score_metric));
        produced.push(READINESS_SCORE.to_string());
        produced
    }

    fn build(&self, run_id: &str, result: &PhaseResult) -> GateEvaluationInput {
        let scores = self.score(&result.artifacts);
        let overall_score = result
            .summary
            .as_ref()
            .map(|s| s.composite_score)
            .unwrap_or(scores.composite);
        GateEvaluationInput {
            run_id: run_id.to_string(),
            phase: self.phase.clone(),
            artifacts: result.artifacts.clone(),
            metrics: self.gate_metrics(&scores),
            overall_score,
        }
    }
}
