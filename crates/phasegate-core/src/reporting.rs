//! Gate reports: markdown rendering and digest-verified persistence.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use uuid::Uuid;

use crate::domain::{PhaseError, Result};
use crate::gate::{FailedMetric, GateDecision};
use crate::retry::{build_hints, GatedOutcome};

pub const SCHEMA_VERSION: &str = "1.0";

/// Persisted record of one gated phase run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub schema_version: String,
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub run_id: String,
    pub phase: String,
    pub attempts: u32,
    pub decision: GateDecision,
    /// Earlier decisions, oldest first; the last entry equals `decision`.
    #[serde(default)]
    pub history: Vec<GateDecision>,
}

impl GateReport {
    pub fn new(run_id: impl Into<String>, phase: impl Into<String>, decision: GateDecision) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            report_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            run_id: run_id.into(),
            phase: phase.into(),
            attempts: 1,
            history: vec![decision.clone()],
            decision,
        }
    }

    /// Report for a gated run, or `None` if the gate never ran.
    pub fn from_outcome(run_id: impl Into<String>, outcome: &GatedOutcome) -> Option<Self> {
        let decision = outcome.gate.clone()?;
        Some(Self {
            attempts: outcome.attempts,
            history: outcome.history.clone(),
            ..Self::new(run_id, outcome.result.phase.clone(), decision)
        })
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn push_metric_rows(out: &mut String, metrics: &[FailedMetric]) {
    out.push_str("| metric | actual | required |\n|---|---|---|\n");
    for m in metrics {
        out.push_str(&format!(
            "| `{}` | {} | {} {} |\n",
            m.metric,
            m.actual,
            m.comparator,
            m.threshold
        ));
    }
    out.push('\n');
}

/// Render a gate decision as markdown for PR comments and CI summaries.
pub fn render_gate_report_md(decision: &GateDecision) -> String {
    let mut out = String::new();
    out.push_str("# Gate Report\n\n");
    out.push_str(&format!(
        "- decision: **{}**\n- overall score: {}\n- failed metrics: {}\n- warnings: {}\n\n",
        decision.decision,
        decision.overall_score,
        decision.failed_metrics.len(),
        decision.warnings.len()
    ));

    if !decision.failed_metrics.is_empty() {
        out.push_str("## Failed Metrics\n");
        push_metric_rows(&mut out, &decision.failed_metrics);
        out.push_str("## Hints\n");
        for hint in build_hints(decision) {
            out.push_str(&format!("- {hint}\n"));
        }
        out.push('\n');
    }

    if !decision.warnings.is_empty() {
        out.push_str("## Warnings\n");
        push_metric_rows(&mut out, &decision.warnings);
    }
    out
}

/// Write the markdown rendering of `report` to `path`.
pub fn write_gate_report_md(path: &Path, report: &GateReport) -> anyhow::Result<()> {
    let md = render_gate_report_md(&report.decision);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// `run_id` and `phase` become path components and may not leave `dir`.
fn check_key(field: &'static str, value: &str) -> Result<()> {
    let bad = value.is_empty()
        || value == "."
        || value.contains("..")
        || value.contains(['/', '\\'])
        || Path::new(value).is_absolute();
    if bad {
        return Err(PhaseError::InvalidReportKey {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn report_paths(dir: &Path, run_id: &str, phase: &str) -> Result<(PathBuf, PathBuf)> {
    check_key("run_id", run_id)?;
    check_key("phase", phase)?;
    let run_dir = dir.join(run_id);
    Ok((
        run_dir.join(format!("{phase}-gate.json")),
        run_dir.join(format!("{phase}-gate.digest")),
    ))
}

/// Persist `<dir>/<run_id>/<phase>-gate.json` and its `.digest` sibling.
pub fn write_gate_report(report: &GateReport, dir: &Path) -> Result<PathBuf> {
    let (report_path, digest_path) = report_paths(dir, &report.run_id, &report.phase)?;
    if let Some(parent) = report_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec_pretty(report)?;
    std::fs::write(&report_path, &json)?;
    std::fs::write(&digest_path, sha256_hex(&json).as_bytes())?;

    Ok(report_path)
}

/// Read a report written by [`write_gate_report`], verifying its digest.
pub fn read_gate_report(run_id: &str, phase: &str, dir: &Path) -> Result<GateReport> {
    let (report_path, digest_path) = report_paths(dir, run_id, phase)?;

    let json = std::fs::read(&report_path)?;
    let expected = std::fs::read_to_string(&digest_path)?;
    let actual = sha256_hex(&json);
    if expected.trim() != actual {
        return Err(PhaseError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MetricValue;
    use crate::gate::{Comparator, Decision};

    fn failing() -> GateDecision {
        GateDecision {
            decision: Decision::Fail,
            overall_score: 64,
            failed_metrics: vec![FailedMetric {
                metric: "readiness_score".to_string(),
                actual: MetricValue::Number(64.0),
                threshold: MetricValue::Number(70.0),
                comparator: Comparator::Gte,
            }],
            warnings: vec![],
        }
    }

    #[test]
    fn markdown_render_is_stable() {
        let actual = render_gate_report_md(&failing());
        let expected = "# Gate Report\n\n- decision: **fail**\n- overall score: 64\n- failed metrics: 1\n- warnings: 0\n\n## Failed Metrics\n| metric | actual | required |\n|---|---|---|\n| `readiness_score` | 64 | gte 70 |\n\n## Hints\n- increase readiness_score: currently 64, need >= 70\n\n";
        assert_eq!(actual, expected);
    }

    #[test]
    fn report_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let report = GateReport::new("run-42", "beta", failing());
        let path = write_gate_report(&report, dir.path()).unwrap();
        assert!(path.ends_with("run-42/beta-gate.json"));

        let loaded = read_gate_report("run-42", "beta", dir.path()).unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn tampered_report_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let report = GateReport::new("run-7", "qa", failing());
        let path = write_gate_report(&report, dir.path()).unwrap();

        let tampered = std::fs::read_to_string(&path)
            .unwrap()
            .replace("\"overall_score\": 64", "\"overall_score\": 99");
        std::fs::write(&path, tampered).unwrap();

        let err = read_gate_report("run-7", "qa", dir.path()).unwrap_err();
        assert!(matches!(err, PhaseError::DigestMismatch { .. }));
    }

    #[test]
    fn report_keys_cannot_escape_the_report_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("reports");

        for (run_id, phase) in [
            ("../escape", "beta"),
            ("run-1", "../../beta"),
            ("nested/run", "beta"),
            ("run-1", "qa\\x"),
            ("..", "beta"),
            ("", "beta"),
        ] {
            let report = GateReport::new(run_id, phase, failing());
            let err = write_gate_report(&report, &dir).unwrap_err();
            assert!(
                matches!(err, PhaseError::InvalidReportKey { .. }),
                "{run_id:?}/{phase:?} was accepted"
            );
            assert!(matches!(
                read_gate_report(run_id, phase, &dir),
                Err(PhaseError::InvalidReportKey { .. })
            ));
        }
        assert!(!root.path().join("escape").exists());
        assert!(!dir.exists());
    }

    #[test]
    fn markdown_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.md");
        write_gate_report_md(&path, &GateReport::new("r", "beta", failing())).unwrap();
        let md = std::fs::read_to_string(&path).unwrap();
        assert!(md.starts_with("# Gate Report"));
    }
}
