//! Scoring properties: weight validation, bounded scores and monotonic
//! dimensions.

use phasegate_core::domain::artifact::{
    AccessibilityReport, AnalyticsPlan, AutomationLevel, BetaDistribution, CoverageReport,
    TelemetryPlan, TestPlan, WcagLevel, BETA_DISTRIBUTION, TELEMETRY_PLAN,
};
use phasegate_core::scoring::{beta, qa, MAX_SCORE};
use phasegate_core::{
    Artifact, ArtifactContent, ConfigError, Dimension, ReadinessStatus, ScoreWeights, ScoredPhase,
};

fn beta_dimensions() -> Vec<Dimension> {
    vec![
        Dimension::new(
            beta::DISTRIBUTION,
            BETA_DISTRIBUTION,
            beta::distribution_metrics,
            &[
                "channel_count",
                "tester_count",
                "distribution_ready",
                "automation_level",
            ],
            beta::distribution_scorer(),
        ),
        Dimension::new(
            beta::TELEMETRY,
            TELEMETRY_PLAN,
            beta::telemetry_metrics,
            &["event_count", "dashboard_count", "alert_count", "crash_reporting"],
            beta::telemetry_scorer(),
        ),
    ]
}

#[test]
fn weights_not_summing_to_one_are_rejected() {
    let err = ScoredPhase::new(
        beta::PHASE,
        beta_dimensions(),
        &[(beta::DISTRIBUTION, 0.5), (beta::TELEMETRY, 0.4)],
        beta::status_policy(),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::WeightSum { .. }));

    assert!(ScoredPhase::new(
        beta::PHASE,
        beta_dimensions(),
        &[(beta::DISTRIBUTION, 0.5), (beta::TELEMETRY, 0.5)],
        beta::status_policy(),
    )
    .is_ok());
}

#[test]
fn weights_must_cover_every_dimension() {
    let err = ScoredPhase::new(
        beta::PHASE,
        beta_dimensions(),
        &[(beta::DISTRIBUTION, 1.0)],
        beta::status_policy(),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPhase { .. }));
}

#[test]
fn negative_weights_are_rejected() {
    let err = ScoreWeights::new("beta", &[("a", 1.2), ("b", -0.2)]).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidWeight { .. }));
    assert!(matches!(
        ScoreWeights::new("beta", &[]),
        Err(ConfigError::EmptyWeights { .. })
    ));
}

#[test]
fn beta_scores_stay_within_bounds() {
    let phase = beta::scored_phase().unwrap();
    for testers in [0u32, 9, 10, 50, 99, 100, 10_000] {
        for events in [0usize, 5, 30, 500] {
            for automation in [
                AutomationLevel::None,
                AutomationLevel::Partial,
                AutomationLevel::Full,
            ] {
                let artifacts = vec![
                    Artifact::new(ArtifactContent::BetaDistribution(BetaDistribution {
                        channels: vec!["c".to_string(); 7],
                        tester_count: testers,
                        distribution_ready: true,
                        automation_level: automation,
                    })),
                    Artifact::new(ArtifactContent::TelemetryPlan(TelemetryPlan {
                        events: vec!["e".to_string(); events],
                        dashboards: 50,
                        alerts: 50,
                        crash_reporting: true,
                    })),
                    Artifact::new(ArtifactContent::AnalyticsPlan(AnalyticsPlan {
                        kpis: 100,
                        funnels: 100,
                        experiments: 100,
                        feedback_loop: true,
                    })),
                ];
                let scores = phase.score(&artifacts);
                assert!(scores.composite <= MAX_SCORE);
                assert!(scores.dimensions.values().all(|s| *s <= MAX_SCORE));
            }
        }
    }
}

#[test]
fn more_testers_never_lower_the_distribution_score() {
    let phase = beta::scored_phase().unwrap();
    let mut previous = 0;
    for testers in (0..=200u32).step_by(5) {
        let artifact = Artifact::new(ArtifactContent::BetaDistribution(BetaDistribution {
            tester_count: testers,
            distribution_ready: true,
            ..BetaDistribution::default()
        }));
        let score = phase.score(&[artifact]).dimensions[beta::DISTRIBUTION];
        assert!(score >= previous, "{testers} testers scored {score} < {previous}");
        previous = score;
    }
}

#[test]
fn more_violations_never_raise_the_accessibility_score() {
    let phase = qa::scored_phase().unwrap();
    let mut previous = u32::MAX;
    for violations in 0..=12u32 {
        let artifact = Artifact::new(ArtifactContent::AccessibilityReport(AccessibilityReport {
            wcag_level: WcagLevel::AA,
            violations,
            critical_violations: violations / 4,
            screen_reader_tested: true,
        }));
        let score = phase.score(&[artifact]).dimensions[qa::ACCESSIBILITY];
        assert!(score <= previous, "{violations} violations scored {score} > {previous}");
        previous = score;
    }
}

#[test]
fn higher_coverage_never_lowers_the_composite() {
    let phase = qa::scored_phase().unwrap();
    let mut previous = 0;
    for pct in (0..=100).step_by(5) {
        let pct = f64::from(pct);
        let artifacts = vec![
            Artifact::new(ArtifactContent::TestPlan(TestPlan {
                test_cases: 40,
                e2e_scenarios: 3,
                regression_suite: true,
            })),
            Artifact::new(ArtifactContent::CoverageReport(CoverageReport {
                line_coverage_pct: pct,
                branch_coverage_pct: pct,
                critical_paths_covered: true,
            })),
        ];
        let composite = phase.score(&artifacts).composite;
        assert!(composite >= previous);
        previous = composite;
    }
}

#[test]
fn missing_artifacts_score_zero_and_block() {
    let scores = qa::scored_phase().unwrap().score(&[]);
    assert!(scores.dimensions.values().all(|s| *s == 0));
    assert_eq!(scores.composite, 0);
    assert_eq!(scores.status, ReadinessStatus::Blocked);
}

#[test]
fn first_artifact_of_a_type_wins() {
    let phase = beta::scored_phase().unwrap();
    let strong = Artifact::new(ArtifactContent::BetaDistribution(BetaDistribution {
        channels: vec!["a".into(), "b".into(), "c".into()],
        tester_count: 500,
        distribution_ready: true,
        automation_level: AutomationLevel::Full,
    }));
    let weak = Artifact::new(ArtifactContent::BetaDistribution(BetaDistribution::default()));

    let strong_first = phase.score(&[strong.clone(), weak.clone()]);
    let weak_first = phase.score(&[weak, strong]);
    assert_eq!(strong_first.dimensions[beta::DISTRIBUTION], 100);
    assert_eq!(weak_first.dimensions[beta::DISTRIBUTION], 0);
}
