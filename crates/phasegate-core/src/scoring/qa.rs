//! QA phase: test plan, coverage and accessibility.
//!
//! Weights are 0.30 / 0.40 / 0.30. Coverage percentages are scored as
//! percentages but gated as 0–1 fractions (`line_coverage`,
//! `branch_coverage`).

use crate::domain::artifact::{WcagLevel, ACCESSIBILITY_REPORT, COVERAGE_REPORT, TEST_PLAN};
use crate::domain::{ArtifactContent, ConfigError, MetricMap, MetricValue};
use crate::gate::{Comparator, GateTable, MetricRule};
use crate::scoring::phase::{Dimension, ScoredPhase, READINESS_SCORE};
use crate::scoring::{BucketTable, DimensionScorer};
use crate::status::StatusPolicy;

pub const PHASE: &str = "qa";

pub const TEST_PLAN_DIMENSION: &str = "test_plan";
pub const COVERAGE: &str = "coverage";
pub const ACCESSIBILITY: &str = "accessibility";

pub const WEIGHTS: [(&str, f64); 3] = [
    (TEST_PLAN_DIMENSION, 0.30),
    (COVERAGE, 0.40),
    (ACCESSIBILITY, 0.30),
];

/// Violations at or below this count earn the low-violation slice.
pub const LOW_VIOLATION_LIMIT: u32 = 5;

fn wcag_rank(level: WcagLevel) -> u32 {
    match level {
        WcagLevel::None => 0,
        WcagLevel::A => 1,
        WcagLevel::AA => 2,
        WcagLevel::AAA => 3,
    }
}

pub fn test_plan_metrics(content: &ArtifactContent) -> Option<MetricMap> {
    let ArtifactContent::TestPlan(p) = content else {
        return None;
    };
    Some(
        MetricMap::new()
            .with("test_cases", p.test_cases)
            .with("e2e_scenarios", p.e2e_scenarios)
            .with("regression_suite", p.regression_suite),
    )
}

pub fn coverage_metrics(content: &ArtifactContent) -> Option<MetricMap> {
    let ArtifactContent::CoverageReport(c) = content else {
        return None;
    };
    Some(
        MetricMap::new()
            .with("line_coverage_pct", c.line_coverage_pct)
            .with("branch_coverage_pct", c.branch_coverage_pct)
            .with("critical_paths_covered", c.critical_paths_covered),
    )
}

/// Violation counts are turned into flags so that more violations can
/// never raise the score.
pub fn accessibility_metrics(content: &ArtifactContent) -> Option<MetricMap> {
    let ArtifactContent::AccessibilityReport(a) = content else {
        return None;
    };
    Some(
        MetricMap::new()
            .with("wcag_level", wcag_rank(a.wcag_level))
            .with("violations", a.violations)
            .with("critical_violations", a.critical_violations)
            .with("no_critical_violations", a.critical_violations == 0)
            .with("low_violation_count", a.violations <= LOW_VIOLATION_LIMIT)
            .with("screen_reader_tested", a.screen_reader_tested),
    )
}

fn line_coverage(raw: &MetricMap) -> MetricValue {
    MetricValue::Number(raw.number("line_coverage_pct") / 100.0)
}

fn branch_coverage(raw: &MetricMap) -> MetricValue {
    MetricValue::Number(raw.number("branch_coverage_pct") / 100.0)
}

pub fn test_plan_scorer() -> DimensionScorer {
    DimensionScorer::new(TEST_PLAN_DIMENSION)
        .slice(
            "test_cases",
            BucketTable::new(&[(10.0, 20), (50.0, 20), (100.0, 10)], 50),
        )
        .slice(
            "e2e_scenarios",
            BucketTable::new(&[(1.0, 10), (5.0, 10), (10.0, 10)], 30),
        )
        .slice("regression_suite", BucketTable::flag(20))
}

pub fn coverage_scorer() -> DimensionScorer {
    DimensionScorer::new(COVERAGE)
        .slice(
            "line_coverage_pct",
            BucketTable::new(&[(50.0, 15), (70.0, 15), (80.0, 10), (90.0, 10)], 50),
        )
        .slice(
            "branch_coverage_pct",
            BucketTable::new(&[(50.0, 10), (70.0, 10), (80.0, 10)], 30),
        )
        .slice("critical_paths_covered", BucketTable::flag(20))
}

pub fn accessibility_scorer() -> DimensionScorer {
    DimensionScorer::new(ACCESSIBILITY)
        .slice(
            "wcag_level",
            BucketTable::new(&[(1.0, 15), (2.0, 20), (3.0, 5)], 40),
        )
        .slice("no_critical_violations", BucketTable::flag(25))
        .slice("low_violation_count", BucketTable::flag(15))
        .slice("screen_reader_tested", BucketTable::flag(20))
}

pub fn status_policy() -> StatusPolicy {
    StatusPolicy {
        block_floor: 30,
        required_flags: vec!["critical_paths_covered".to_string()],
        needs_work_composite: 65,
        needs_work_floor: 50,
        excellent_composite: 85,
        excellent_floor: 70,
    }
}

pub fn scored_phase() -> Result<ScoredPhase, ConfigError> {
    let dimensions = vec![
        Dimension::new(
            TEST_PLAN_DIMENSION,
            TEST_PLAN,
            test_plan_metrics,
            &["test_cases", "e2e_scenarios", "regression_suite"],
            test_plan_scorer(),
        ),
        Dimension::new(
            COVERAGE,
            COVERAGE_REPORT,
            coverage_metrics,
            &[
                "line_coverage_pct",
                "branch_coverage_pct",
                "critical_paths_covered",
            ],
            coverage_scorer(),
        ),
        Dimension::new(
            ACCESSIBILITY,
            ACCESSIBILITY_REPORT,
            accessibility_metrics,
            &[
                "wcag_level",
                "violations",
                "critical_violations",
                "no_critical_violations",
                "low_violation_count",
                "screen_reader_tested",
            ],
            accessibility_scorer(),
        ),
    ];
    Ok(ScoredPhase::new(PHASE, dimensions, &WEIGHTS, status_policy())?
        .with_derived("line_coverage", line_coverage)
        .with_derived("branch_coverage", branch_coverage)
        .with_gated_metrics(&["line_coverage", "critical_paths_covered", "critical_violations"]))
}

/// Default QA gate. WCAG level and branch coverage only warn.
pub fn default_gate_table() -> Result<GateTable, ConfigError> {
    GateTable::new(vec![
        MetricRule::required(READINESS_SCORE, Comparator::Gte, 65.0),
        MetricRule::required("line_coverage", Comparator::Gte, 0.8),
        MetricRule::required("critical_paths_covered", Comparator::Eq, true),
        MetricRule::required("critical_violations", Comparator::Lte, 0.0),
        MetricRule::advisory("wcag_level", Comparator::Gte, 2.0),
        MetricRule::advisory("branch_coverage", Comparator::Gte, 0.7),
    ])
}
