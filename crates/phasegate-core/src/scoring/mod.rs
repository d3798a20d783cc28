//! Dimension scoring and composite weighting.
//!
//! A dimension score is built from independent slices. Each slice reads one
//! raw metric and walks an ordered bucket table top-down, summing the points
//! of every bucket whose threshold the metric meets, capped at the slice
//! ceiling. Slices add up and the dimension is capped at 100.
//!
//! Scoring is piecewise-constant on purpose: identical raw metrics always
//! land in the same bucket, so scores are reproducible across runs. Do not
//! replace the tables with interpolation.
//!
//! Composite scores are `round(Σ score_i × weight_i)` with weights that are
//! validated to sum to 1.0 when a [`ScoreWeights`] is built.

pub mod beta;
pub mod phase;
pub mod qa;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ConfigError, MetricMap};

/// Upper bound for every dimension and composite score.
pub const MAX_SCORE: u32 = 100;

/// Tolerance for the weight-sum check.
pub const WEIGHT_EPSILON: f64 = 1e-9;

/// Awards `points` when the raw metric is `>= threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub threshold: f64,
    pub points: u32,
}

/// Ordered bucket list for one raw metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketTable {
    pub buckets: Vec<Bucket>,
    pub ceiling: u32,
}

impl BucketTable {
    /// Build a table from `(threshold, points)` pairs.
    pub fn new(pairs: &[(f64, u32)], ceiling: u32) -> Self {
        Self {
            buckets: pairs
                .iter()
                .map(|&(threshold, points)| Bucket { threshold, points })
                .collect(),
            ceiling,
        }
    }

    /// Single bucket that pays out when a boolean metric is true.
    pub fn flag(points: u32) -> Self {
        Self::new(&[(1.0, points)], points)
    }

    pub fn validate(&self, dimension: &str) -> Result<(), ConfigError> {
        if self.buckets.is_empty() {
            return Err(ConfigError::InvalidBuckets {
                dimension: dimension.to_string(),
                reason: "no buckets".to_string(),
            });
        }
        if let Some(b) = self.buckets.iter().find(|b| !b.threshold.is_finite()) {
            return Err(ConfigError::InvalidBuckets {
                dimension: dimension.to_string(),
                reason: format!("non-finite threshold {}", b.threshold),
            });
        }
        if self.ceiling > MAX_SCORE {
            return Err(ConfigError::InvalidBuckets {
                dimension: dimension.to_string(),
                reason: format!("ceiling {} exceeds {MAX_SCORE}", self.ceiling),
            });
        }
        Ok(())
    }

    /// Points for `raw`. NaN meets no threshold and scores 0.
    pub fn score(&self, raw: f64) -> u32 {
        let earned: u32 = self
            .buckets
            .iter()
            .filter(|b| raw >= b.threshold)
            .map(|b| b.points)
            .sum();
        earned.min(self.ceiling)
    }
}

/// One additive slice of a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSlice {
    pub metric: String,
    pub table: BucketTable,
}

/// Scores one dimension from a map of raw metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScorer {
    pub dimension: String,
    pub slices: Vec<ScoreSlice>,
}

impl DimensionScorer {
    pub fn new(dimension: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            slices: Vec::new(),
        }
    }

    pub fn slice(mut self, metric: impl Into<String>, table: BucketTable) -> Self {
        self.slices.push(ScoreSlice {
            metric: metric.into(),
            table,
        });
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slices.is_empty() {
            return Err(ConfigError::InvalidBuckets {
                dimension: self.dimension.clone(),
                reason: "no score slices".to_string(),
            });
        }
        for slice in &self.slices {
            slice.table.validate(&self.dimension)?;
        }
        Ok(())
    }

    /// Total over all slices, capped at 100. Absent metrics score 0.
    pub fn score(&self, raw: &MetricMap) -> u32 {
        let total: u32 = self
            .slices
            .iter()
            .map(|s| s.table.score(raw.number(&s.metric)))
            .sum();
        total.min(MAX_SCORE)
    }

    /// Highest score this scorer can produce.
    pub fn max_score(&self) -> u32 {
        self.slices
            .iter()
            .map(|s| s.table.ceiling)
            .sum::<u32>()
            .min(MAX_SCORE)
    }
}

/// Fixed composite weights for one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    phase: String,
    weights: Vec<(String, f64)>,
}

impl ScoreWeights {
    /// Validate and build. Fails unless every weight is finite and
    /// non-negative and the weights sum to 1.0 within [`WEIGHT_EPSILON`].
    pub fn new(phase: impl Into<String>, weights: &[(&str, f64)]) -> Result<Self, ConfigError> {
        let phase = phase.into();
        if weights.is_empty() {
            return Err(ConfigError::EmptyWeights { phase });
        }
        for &(dimension, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    dimension: dimension.to_string(),
                    weight,
                });
            }
        }
        let sum: f64 = weights.iter().map(|(_, w)| w).sum();
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(ConfigError::WeightSum { phase, sum });
        }
        Ok(Self {
            phase,
            weights: weights
                .iter()
                .map(|&(d, w)| (d.to_string(), w))
                .collect(),
        })
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.weights.iter().map(|(d, _)| d.as_str())
    }

    pub fn weight(&self, dimension: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|(d, _)| d == dimension)
            .map(|(_, w)| *w)
    }

    /// `round(Σ score × weight)`; dimensions absent from `scores` count as 0.
    pub fn composite(&self, scores: &BTreeMap<String, u32>) -> u32 {
        let weighted: f64 = self
            .weights
            .iter()
            .map(|(d, w)| f64::from(scores.get(d).copied().unwrap_or(0).min(MAX_SCORE)) * w)
            .sum();
        (weighted.round() as u32).min(MAX_SCORE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_sum_top_down_and_cap_at_ceiling() {
        let table = BucketTable::new(&[(10.0, 10), (50.0, 10), (100.0, 15)], 30);
        assert_eq!(table.score(0.0), 0);
        assert_eq!(table.score(9.0), 0);
        assert_eq!(table.score(10.0), 10);
        assert_eq!(table.score(50.0), 20);
        assert_eq!(table.score(500.0), 30);
        assert_eq!(table.score(f64::NAN), 0);
    }

    #[test]
    fn flag_table_pays_only_when_true() {
        let table = BucketTable::flag(20);
        assert_eq!(table.score(0.0), 0);
        assert_eq!(table.score(1.0), 20);
    }

    #[test]
    fn dimension_caps_at_hundred() {
        let scorer = DimensionScorer::new("greedy")
            .slice("a", BucketTable::new(&[(1.0, 80)], 80))
            .slice("b", BucketTable::new(&[(1.0, 80)], 80));
        let raw = MetricMap::new().with("a", 1.0).with("b", 1.0);
        assert_eq!(scorer.score(&raw), 100);
        assert_eq!(scorer.score(&MetricMap::new()), 0);
        assert_eq!(scorer.max_score(), 100);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let err = ScoreWeights::new("beta", &[("a", 0.3), ("b", 0.3), ("c", 0.3)]).unwrap_err();
        assert!(matches!(err, ConfigError::WeightSum { .. }));

        let err = ScoreWeights::new("beta", &[("a", 1.2), ("b", -0.2)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWeight { .. }));

        let err = ScoreWeights::new("beta", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyWeights { .. }));

        assert!(ScoreWeights::new("beta", &[("a", 0.35), ("b", 0.35), ("c", 0.30)]).is_ok());
    }

    #[test]
    fn composite_rounds_weighted_sum() {
        let weights = ScoreWeights::new("qa", &[("a", 0.3), ("b", 0.4), ("c", 0.3)]).unwrap();
        let scores: BTreeMap<String, u32> = [("a", 55), ("b", 71), ("c", 0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        // 16.5 + 28.4 = 44.9
        assert_eq!(weights.composite(&scores), 45);

        let full: BTreeMap<String, u32> = [("a", 100), ("b", 100), ("c", 100)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(weights.composite(&full), 100);
    }

    #[test]
    fn invalid_bucket_tables_are_rejected() {
        let empty = BucketTable::new(&[], 10);
        assert!(empty.validate("x").is_err());
        let huge = BucketTable::new(&[(1.0, 10)], 150);
        assert!(huge.validate("x").is_err());
        let nan = BucketTable::new(&[(f64::NAN, 10)], 10);
        assert!(nan.validate("x").is_err());
    }
}
