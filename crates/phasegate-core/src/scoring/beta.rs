//! Beta rollout phase: distribution, telemetry and analytics readiness.
//!
//! | dimension    | artifact          | weight |
//! |--------------|-------------------|--------|
//! | distribution | `beta-distribution` | 0.35 |
//! | telemetry    | `telemetry-plan`    | 0.35 |
//! | analytics    | `analytics-plan`    | 0.30 |
//!
//! Status: blocked below 40 in any dimension or when distribution is not
//! ready; needs work below composite 70 or any dimension below 60; excellent
//! at composite 85 with every dimension at 75 or above.

use crate::domain::artifact::{
    AutomationLevel, ANALYTICS_PLAN, BETA_DISTRIBUTION, TELEMETRY_PLAN,
};
use crate::domain::{ArtifactContent, ConfigError, MetricMap};
use crate::gate::{Comparator, GateTable, MetricRule};
use crate::scoring::phase::{Dimension, ScoredPhase, READINESS_SCORE};
use crate::scoring::{BucketTable, DimensionScorer};
use crate::status::StatusPolicy;

pub const PHASE: &str = "beta";

pub const DISTRIBUTION: &str = "distribution";
pub const TELEMETRY: &str = "telemetry";
pub const ANALYTICS: &str = "analytics";

pub const WEIGHTS: [(&str, f64); 3] = [(DISTRIBUTION, 0.35), (TELEMETRY, 0.35), (ANALYTICS, 0.30)];

fn automation_rank(level: AutomationLevel) -> u32 {
    match level {
        AutomationLevel::None => 0,
        AutomationLevel::Partial => 1,
        AutomationLevel::Full => 2,
    }
}

pub fn distribution_metrics(content: &ArtifactContent) -> Option<MetricMap> {
    let ArtifactContent::BetaDistribution(d) = content else {
        return None;
    };
    Some(
        MetricMap::new()
            .with("channel_count", d.channels.len())
            .with("tester_count", d.tester_count)
            .with("distribution_ready", d.distribution_ready)
            .with("automation_level", automation_rank(d.automation_level)),
    )
}

pub fn telemetry_metrics(content: &ArtifactContent) -> Option<MetricMap> {
    let ArtifactContent::TelemetryPlan(t) = content else {
        return None;
    };
    Some(
        MetricMap::new()
            .with("event_count", t.events.len())
            .with("dashboard_count", t.dashboards)
            .with("alert_count", t.alerts)
            .with("crash_reporting", t.crash_reporting),
    )
}

pub fn analytics_metrics(content: &ArtifactContent) -> Option<MetricMap> {
    let ArtifactContent::AnalyticsPlan(a) = content else {
        return None;
    };
    Some(
        MetricMap::new()
            .with("kpi_count", a.kpis)
            .with("funnel_count", a.funnels)
            .with("experiment_count", a.experiments)
            .with("feedback_loop", a.feedback_loop),
    )
}

pub fn distribution_scorer() -> DimensionScorer {
    DimensionScorer::new(DISTRIBUTION)
        .slice("channel_count", BucketTable::new(&[(1.0, 10), (2.0, 10), (3.0, 10)], 30))
        .slice(
            "tester_count",
            BucketTable::new(&[(10.0, 10), (50.0, 10), (100.0, 10)], 30),
        )
        .slice("distribution_ready", BucketTable::flag(20))
        .slice("automation_level", BucketTable::new(&[(1.0, 10), (2.0, 10)], 20))
}

pub fn telemetry_scorer() -> DimensionScorer {
    DimensionScorer::new(TELEMETRY)
        .slice(
            "event_count",
            BucketTable::new(&[(5.0, 10), (15.0, 10), (30.0, 10), (50.0, 10)], 40),
        )
        .slice("dashboard_count", BucketTable::new(&[(1.0, 10), (3.0, 10)], 20))
        .slice("alert_count", BucketTable::new(&[(1.0, 10), (5.0, 10)], 20))
        .slice("crash_reporting", BucketTable::flag(20))
}

pub fn analytics_scorer() -> DimensionScorer {
    DimensionScorer::new(ANALYTICS)
        .slice("kpi_count", BucketTable::new(&[(3.0, 15), (8.0, 15)], 30))
        .slice("funnel_count", BucketTable::new(&[(1.0, 10), (3.0, 10)], 20))
        .slice("experiment_count", BucketTable::new(&[(1.0, 15), (3.0, 10)], 25))
        .slice("feedback_loop", BucketTable::flag(25))
}

pub fn status_policy() -> StatusPolicy {
    StatusPolicy {
        block_floor: 40,
        required_flags: vec!["distribution_ready".to_string()],
        needs_work_composite: 70,
        needs_work_floor: 60,
        excellent_composite: 85,
        excellent_floor: 75,
    }
}

/// The beta phase aggregator and gate-input builder.
pub fn scored_phase() -> Result<ScoredPhase, ConfigError> {
    let dimensions = vec![
        Dimension::new(
            DISTRIBUTION,
            BETA_DISTRIBUTION,
            distribution_metrics,
            &[
                "channel_count",
                "tester_count",
                "distribution_ready",
                "automation_level",
            ],
            distribution_scorer(),
        ),
        Dimension::new(
            TELEMETRY,
            TELEMETRY_PLAN,
            telemetry_metrics,
            &["event_count", "dashboard_count", "alert_count", "crash_reporting"],
            telemetry_scorer(),
        ),
        Dimension::new(
            ANALYTICS,
            ANALYTICS_PLAN,
            analytics_metrics,
            &["kpi_count", "funnel_count", "experiment_count", "feedback_loop"],
            analytics_scorer(),
        ),
    ];
    Ok(
        ScoredPhase::new(PHASE, dimensions, &WEIGHTS, status_policy())?.with_gated_metrics(&[
            "distribution_ready",
            "tester_count",
            "crash_reporting",
        ]),
    )
}

/// Default beta gate.
pub fn default_gate_table() -> Result<GateTable, ConfigError> {
    GateTable::new(vec![
        MetricRule::required(READINESS_SCORE, Comparator::Gte, 70.0),
        MetricRule::required("distribution_ready", Comparator::Eq, true),
        MetricRule::required("tester_count", Comparator::Gte, 50.0),
        MetricRule::required("crash_reporting", Comparator::Eq, true),
        MetricRule::required("telemetry_score", Comparator::Gte, 60.0),
        MetricRule::advisory("analytics_score", Comparator::Gte, 50.0),
    ])
}
