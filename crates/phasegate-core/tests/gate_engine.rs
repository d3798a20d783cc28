//! Gate engine behaviour at the edges: inclusive boundaries, absent
//! metrics and the pass/warn/fail split.

use phasegate_core::{
    evaluate_gate, Comparator, ConfigError, Decision, GateEvaluationInput, GateTable, MetricMap,
    MetricRule, MetricValue,
};

fn input(metrics: MetricMap) -> GateEvaluationInput {
    GateEvaluationInput {
        run_id: "run-gate".to_string(),
        phase: "qa".to_string(),
        artifacts: Vec::new(),
        metrics,
        overall_score: 70,
    }
}

fn qa_table() -> GateTable {
    GateTable::new(vec![
        MetricRule::required("readiness_score", Comparator::Gte, 65.0),
        MetricRule::required("critical_violations", Comparator::Lte, 0.0),
        MetricRule::required("critical_paths_covered", Comparator::Eq, true),
    ])
    .unwrap()
}

#[test]
fn thresholds_are_inclusive() {
    let metrics = MetricMap::new()
        .with("readiness_score", 65.0)
        .with("critical_violations", 0.0)
        .with("critical_paths_covered", true);
    let decision = evaluate_gate(&qa_table(), &input(metrics));
    assert_eq!(decision.decision, Decision::Pass);
    assert!(decision.failed_metrics.is_empty());
}

#[test]
fn just_below_threshold_fails() {
    let metrics = MetricMap::new()
        .with("readiness_score", 64.99)
        .with("critical_paths_covered", true);
    let decision = evaluate_gate(&qa_table(), &input(metrics));
    assert_eq!(decision.decision, Decision::Fail);
    assert_eq!(decision.failed_metrics.len(), 1);
    assert_eq!(decision.failed_metrics[0].metric, "readiness_score");
    assert_eq!(decision.failed_metrics[0].comparator, Comparator::Gte);
}

#[test]
fn absent_metrics_are_zero_valued() {
    let decision = evaluate_gate(&qa_table(), &input(MetricMap::new()));
    assert_eq!(decision.decision, Decision::Fail);

    let names: Vec<&str> = decision
        .failed_metrics
        .iter()
        .map(|m| m.metric.as_str())
        .collect();
    // An absent count satisfies `lte 0`; absent score and flag do not.
    assert_eq!(names, vec!["readiness_score", "critical_paths_covered"]);
    assert_eq!(decision.failed_metrics[0].actual, MetricValue::Number(0.0));
    assert_eq!(decision.failed_metrics[1].actual, MetricValue::Flag(false));
}

#[test]
fn table_without_advisory_rules_never_warns() {
    let table = qa_table();
    assert!(!table.has_advisory_rules());
    for score in [0.0, 64.0, 65.0, 100.0] {
        let metrics = MetricMap::new()
            .with("readiness_score", score)
            .with("critical_paths_covered", true);
        let decision = evaluate_gate(&table, &input(metrics));
        assert_ne!(decision.decision, Decision::Warn);
        assert!(decision.warnings.is_empty());
    }
}

#[test]
fn advisory_miss_warns_and_required_miss_fails() {
    let table = GateTable::new(vec![
        MetricRule::required("readiness_score", Comparator::Gte, 65.0),
        MetricRule::advisory("branch_coverage", Comparator::Gte, 0.7),
    ])
    .unwrap();

    let warned = evaluate_gate(
        &table,
        &input(
            MetricMap::new()
                .with("readiness_score", 80.0)
                .with("branch_coverage", 0.5),
        ),
    );
    assert_eq!(warned.decision, Decision::Warn);
    assert!(warned.passed());
    assert!(warned.failed_metrics.is_empty());
    assert_eq!(warned.warnings[0].metric, "branch_coverage");

    let failed = evaluate_gate(
        &table,
        &input(
            MetricMap::new()
                .with("readiness_score", 40.0)
                .with("branch_coverage", 0.5),
        ),
    );
    assert_eq!(failed.decision, Decision::Fail);
    assert!(!failed.passed());
    assert_eq!(failed.warnings.len(), 1);
}

#[test]
fn failed_metric_renders_actual_and_requirement() {
    let decision = evaluate_gate(
        &qa_table(),
        &input(
            MetricMap::new()
                .with("readiness_score", 64.0)
                .with("critical_violations", 2.0)
                .with("critical_paths_covered", true),
        ),
    );
    let rendered: Vec<String> = decision
        .failed_metrics
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        rendered,
        vec![
            "readiness_score is 64, required >= 65",
            "critical_violations is 2, required <= 0",
        ]
    );
}

#[test]
fn tables_load_from_json_rows() {
    let table: GateTable = serde_json::from_value(serde_json::json!({
        "metrics": [
            { "metric": "readiness_score", "comparator": "gte", "threshold": 70 },
            { "metric": "crash_reporting", "comparator": "eq", "threshold": true },
            { "metric": "analytics_score", "comparator": "gte", "threshold": 50, "level": "advisory" }
        ]
    }))
    .unwrap();
    assert_eq!(table.rules().len(), 3);
    assert!(table.has_advisory_rules());
    assert_eq!(
        table.rule("crash_reporting").map(|r| r.threshold),
        Some(MetricValue::Flag(true))
    );
}

#[test]
fn malformed_tables_are_rejected() {
    let duplicate = GateTable::new(vec![
        MetricRule::required("score", Comparator::Gte, 1.0),
        MetricRule::required("score", Comparator::Lte, 5.0),
    ])
    .unwrap_err();
    assert!(matches!(duplicate, ConfigError::DuplicateThreshold { .. }));

    let mismatch =
        GateTable::new(vec![MetricRule::required("ready", Comparator::Gte, true)]).unwrap_err();
    assert!(matches!(mismatch, ConfigError::ComparatorMismatch { .. }));
}
