//! Threshold gate engine.
//!
//! Evaluates a [`GateEvaluationInput`] against a [`GateTable`] to produce a
//! [`GateDecision`]: `pass`, `warn` or `fail`, plus every metric that missed
//! its threshold with actual vs. required values.
//!
//! - Required rules decide `fail`. Boundaries are inclusive: an actual value
//!   equal to a `gte`/`lte` threshold passes.
//! - Advisory rules can only downgrade `pass` to `warn`. A table with no
//!   advisory rules never warns.
//! - Metrics absent from the input are evaluated as their zero value
//!   (`0` or `false`).
//! - `overall_score` is reported for observability; the discrete rules are
//!   authoritative.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{Artifact, ConfigError, MetricMap, MetricValue};

// ---------------------------------------------------------------------------
// Threshold table
// ---------------------------------------------------------------------------

/// How an actual value is compared with its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gte,
    Lte,
    Eq,
}

impl Comparator {
    fn symbol(self) -> &'static str {
        match self {
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Eq => "==",
        }
    }

    fn holds(self, actual: &MetricValue, threshold: &MetricValue) -> bool {
        match (self, threshold) {
            (Self::Eq, MetricValue::Flag(expected)) => actual.as_flag() == *expected,
            (Self::Eq, MetricValue::Number(t)) => (actual.as_number() - t).abs() < 1e-9,
            (Self::Gte, t) => actual.as_number() >= t.as_number(),
            (Self::Lte, t) => actual.as_number() <= t.as_number(),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Eq => "eq",
        };
        write!(f, "{s}")
    }
}

/// Whether a missed threshold blocks (`required`) or only warns (`advisory`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleLevel {
    #[default]
    Required,
    Advisory,
}

/// One row of a threshold table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRule {
    pub metric: String,
    pub comparator: Comparator,
    pub threshold: MetricValue,
    #[serde(default)]
    pub level: RuleLevel,
}

impl MetricRule {
    pub fn required(
        metric: impl Into<String>,
        comparator: Comparator,
        threshold: impl Into<MetricValue>,
    ) -> Self {
        Self {
            metric: metric.into(),
            comparator,
            threshold: threshold.into(),
            level: RuleLevel::Required,
        }
    }

    pub fn advisory(
        metric: impl Into<String>,
        comparator: Comparator,
        threshold: impl Into<MetricValue>,
    ) -> Self {
        Self {
            level: RuleLevel::Advisory,
            ..Self::required(metric, comparator, threshold)
        }
    }
}

/// Ordered, validated threshold table. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGateTable", into = "RawGateTable")]
pub struct GateTable {
    rules: Vec<MetricRule>,
}

#[derive(Serialize, Deserialize)]
struct RawGateTable {
    #[serde(default)]
    metrics: Vec<MetricRule>,
}

impl TryFrom<RawGateTable> for GateTable {
    type Error = ConfigError;

    fn try_from(raw: RawGateTable) -> Result<Self, Self::Error> {
        GateTable::new(raw.metrics)
    }
}

impl From<GateTable> for RawGateTable {
    fn from(table: GateTable) -> Self {
        Self {
            metrics: table.rules,
        }
    }
}

impl GateTable {
    pub fn new(rules: Vec<MetricRule>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.metric.as_str()) {
                return Err(ConfigError::DuplicateThreshold {
                    metric: rule.metric.clone(),
                });
            }
            match (&rule.threshold, rule.comparator) {
                (MetricValue::Flag(_), Comparator::Gte | Comparator::Lte) => {
                    return Err(ConfigError::ComparatorMismatch {
                        metric: rule.metric.clone(),
                        comparator: rule.comparator.to_string(),
                        kind: rule.threshold.kind().to_string(),
                    });
                }
                (MetricValue::Number(n), _) if !n.is_finite() => {
                    return Err(ConfigError::InvalidThreshold {
                        metric: rule.metric.clone(),
                        reason: format!("{n} is not finite"),
                    });
                }
                _ => {}
            }
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[MetricRule] {
        &self.rules
    }

    pub fn rule(&self, metric: &str) -> Option<&MetricRule> {
        self.rules.iter().find(|r| r.metric == metric)
    }

    pub fn has_advisory_rules(&self) -> bool {
        self.rules.iter().any(|r| r.level == RuleLevel::Advisory)
    }

    /// Fail unless every name in `metrics` has a row in this table.
    pub fn require_metrics<'a>(
        &self,
        phase: &str,
        metrics: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError> {
        for metric in metrics {
            if self.rule(metric).is_none() {
                return Err(ConfigError::MissingThreshold {
                    phase: phase.to_string(),
                    metric: metric.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Fail if a row names a metric outside `produced`; such a row would
    /// always see the zero value.
    pub fn check_known<'a>(
        &self,
        phase: &str,
        produced: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError> {
        let produced: HashSet<&str> = produced.into_iter().collect();
        match self.rules.iter().find(|r| !produced.contains(r.metric.as_str())) {
            Some(rule) => Err(ConfigError::UnknownMetric {
                phase: phase.to_string(),
                metric: rule.metric.clone(),
            }),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Input and decision
// ---------------------------------------------------------------------------

/// Everything the gate sees for one phase attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEvaluationInput {
    pub run_id: String,
    pub phase: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    pub metrics: MetricMap,
    /// Composite readiness score for the same attempt.
    #[serde(default)]
    pub overall_score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "pass",
            Self::Warn => "warn",
            Self::Fail => "fail",
        };
        write!(f, "{s}")
    }
}

/// A metric that missed its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedMetric {
    pub metric: String,
    pub actual: MetricValue,
    pub threshold: MetricValue,
    pub comparator: Comparator,
}

impl fmt::Display for FailedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is {}, required {} {}",
            self.metric,
            self.actual,
            self.comparator.symbol(),
            self.threshold
        )
    }
}

/// Outcome of one gate evaluation.
///
/// `failed_metrics` is non-empty exactly when `decision` is `fail`;
/// `warnings` lists advisory misses and is only non-empty on `warn` or `fail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub decision: Decision,
    pub overall_score: u32,
    pub failed_metrics: Vec<FailedMetric>,
    #[serde(default)]
    pub warnings: Vec<FailedMetric>,
}

impl GateDecision {
    pub fn passed(&self) -> bool {
        self.decision != Decision::Fail
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A phase gate bound to one threshold table.
#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    table: GateTable,
}

impl Gate {
    pub fn new(table: GateTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &GateTable {
        &self.table
    }

    pub fn evaluate(&self, input: &GateEvaluationInput) -> GateDecision {
        evaluate_gate(&self.table, input)
    }
}

/// Evaluate `input` against every rule in `table`.
pub fn evaluate_gate(table: &GateTable, input: &GateEvaluationInput) -> GateDecision {
    let mut failed_metrics = Vec::new();
    let mut warnings = Vec::new();

    for rule in table.rules() {
        if let Some(miss) = check_rule(rule, &input.metrics) {
            match rule.level {
                RuleLevel::Required => failed_metrics.push(miss),
                RuleLevel::Advisory => warnings.push(miss),
            }
        }
    }

    let decision = if !failed_metrics.is_empty() {
        Decision::Fail
    } else if !warnings.is_empty() {
        Decision::Warn
    } else {
        Decision::Pass
    };

    GateDecision {
        decision,
        overall_score: input.overall_score,
        failed_metrics,
        warnings,
    }
}

fn check_rule(rule: &MetricRule, metrics: &MetricMap) -> Option<FailedMetric> {
    let actual = metrics.resolve(&rule.metric, &rule.threshold);
    if rule.comparator.holds(&actual, &rule.threshold) {
        None
    } else {
        Some(FailedMetric {
            metric: rule.metric.clone(),
            actual,
            threshold: rule.threshold,
            comparator: rule.comparator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(metrics: MetricMap) -> GateEvaluationInput {
        GateEvaluationInput {
            run_id: "run-1".to_string(),
            phase: "beta".to_string(),
            artifacts: Vec::new(),
            metrics,
            overall_score: 72,
        }
    }

    fn table() -> GateTable {
        GateTable::new(vec![
            MetricRule::required("score", Comparator::Gte, 70.0),
            MetricRule::required("ready", Comparator::Eq, true),
            MetricRule::required("open_bugs", Comparator::Lte, 3.0),
            MetricRule::advisory("docs", Comparator::Gte, 0.5),
        ])
        .unwrap()
    }

    #[test]
    fn all_rules_met_passes() {
        let metrics = MetricMap::new()
            .with("score", 80.0)
            .with("ready", true)
            .with("open_bugs", 1.0)
            .with("docs", 0.9);
        let decision = evaluate_gate(&table(), &input(metrics));
        assert_eq!(decision.decision, Decision::Pass);
        assert!(decision.failed_metrics.is_empty());
        assert_eq!(decision.overall_score, 72);
    }

    #[test]
    fn advisory_miss_warns() {
        let metrics = MetricMap::new()
            .with("score", 80.0)
            .with("ready", true)
            .with("docs", 0.1);
        let decision = evaluate_gate(&table(), &input(metrics));
        assert_eq!(decision.decision, Decision::Warn);
        assert!(decision.failed_metrics.is_empty());
        assert_eq!(decision.warnings.len(), 1);
        assert!(decision.passed());
    }

    #[test]
    fn failed_metric_reports_actual_and_threshold() {
        let metrics = MetricMap::new()
            .with("score", 64.0)
            .with("ready", true)
            .with("docs", 0.9);
        let decision = evaluate_gate(&table(), &input(metrics));
        assert_eq!(decision.decision, Decision::Fail);
        let miss = &decision.failed_metrics[0];
        assert_eq!(miss.metric, "score");
        assert_eq!(miss.actual, MetricValue::Number(64.0));
        assert_eq!(miss.threshold, MetricValue::Number(70.0));
        assert_eq!(miss.to_string(), "score is 64, required >= 70");
    }

    #[test]
    fn boolean_threshold_rejects_ordering_comparator() {
        let err = GateTable::new(vec![MetricRule::required("ready", Comparator::Gte, true)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::ComparatorMismatch { .. }));
    }

    #[test]
    fn non_finite_threshold_is_rejected() {
        for bad in [f64::NAN, f64::INFINITY] {
            let err = GateTable::new(vec![MetricRule::required("score", Comparator::Gte, bad)])
                .unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidThreshold { ref metric, .. } if metric == "score"
            ));
        }
    }

    #[test]
    fn duplicate_rows_are_rejected() {
        let err = GateTable::new(vec![
            MetricRule::required("score", Comparator::Gte, 70.0),
            MetricRule::required("score", Comparator::Gte, 60.0),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateThreshold { .. }));
    }

    #[test]
    fn table_deserializes_from_toml_rows() {
        let table: GateTable = toml::from_str(
            r#"
            [[metrics]]
            metric = "score"
            comparator = "gte"
            threshold = 70

            [[metrics]]
            metric = "ready"
            comparator = "eq"
            threshold = true
            level = "advisory"
            "#,
        )
        .unwrap();
        assert_eq!(table.rules().len(), 2);
        assert_eq!(table.rules()[0].threshold, MetricValue::Number(70.0));
        assert_eq!(table.rules()[1].level, RuleLevel::Advisory);
    }

    #[test]
    fn table_checks_referenced_and_known_metrics() {
        let t = table();
        assert!(t.require_metrics("beta", ["score", "ready"]).is_ok());
        assert!(matches!(
            t.require_metrics("beta", ["score", "coverage"]),
            Err(ConfigError::MissingThreshold { .. })
        ));
        assert!(matches!(
            t.check_known("beta", ["score", "ready", "open_bugs"]),
            Err(ConfigError::UnknownMetric { .. })
        ));
    }
}
