//! Security scan coordination.
//!
//! Unlike [`PhaseCoordinator`](crate::coordinator::PhaseCoordinator), which
//! tolerates failures down to a minimum, the security phase has a fixed
//! topology:
//!
//! 1. The critical-path scanners (SAST, dependency, secrets) run in parallel
//!    and every one of them must succeed.
//! 2. Optional scanners (container, IaC) then run in parallel, each only when
//!    its input list is non-empty. Skipped or failed optional scanners count
//!    as absent, never as failures.
//! 3. All reports are merged by severity into a [`SecurityReport`] and the
//!    summary is handed to a standard [`Gate`] for the final decision.

pub mod report;

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::dispatcher::{self, Settled, Task};
use crate::domain::{AgentError, Artifact, ArtifactContent, ConfigError};
use crate::gate::{Comparator, Gate, GateDecision, GateEvaluationInput, GateTable, MetricRule};
use crate::metrics::METRICS;
use crate::obs::{phase_span, EventSink, PhaseEvent, TracingEventSink};

pub use report::{
    merge_findings, overall_status, Finding, ScanReport, ScannerKind, SecurityReport,
    SecurityStatus, Severity, SeveritySummary,
};
use report::{
    CRITICAL_FINDINGS, HIGH_FINDINGS, LOW_FINDINGS, MEDIUM_FINDINGS, SECRETS_FOUND,
    SECURITY_METRICS,
};

pub const PHASE: &str = "security";

/// Error raised by the security coordinator.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("critical scanner {scanner} failed: {reason}")]
    CriticalScannerFailed { scanner: String, reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// What the scanners look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTarget {
    pub run_id: String,
    pub project_id: String,
    /// Container images; the container scanner is skipped when empty.
    #[serde(default)]
    pub images: Vec<String>,
    /// Infrastructure-as-code files; the IaC scanner is skipped when empty.
    #[serde(default)]
    pub iac_files: Vec<String>,
}

impl ScanTarget {
    pub fn new(run_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    pub fn with_iac_files(mut self, files: Vec<String>) -> Self {
        self.iac_files = files;
        self
    }
}

#[async_trait]
pub trait SecurityScanner: Send + Sync {
    fn name(&self) -> &str;

    async fn scan(&self, target: &ScanTarget) -> Result<ScanReport, AgentError>;
}

/// The three scanners that must always run.
#[derive(Clone)]
pub struct CriticalScanners {
    pub sast: Arc<dyn SecurityScanner>,
    pub dependency: Arc<dyn SecurityScanner>,
    pub secrets: Arc<dyn SecurityScanner>,
}

/// Final state of a security run.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityOutcome {
    pub report: SecurityReport,
    /// Raw reports of every scanner that ran successfully.
    pub scans: Vec<ScanReport>,
    pub gate: GateDecision,
    pub artifact: Artifact,
}

impl SecurityOutcome {
    pub fn passed(&self) -> bool {
        self.gate.passed()
    }
}

/// Default security gate. Criticals, highs and secrets block; any medium or
/// low finding warns, so the decision always matches [`overall_status`].
pub fn default_gate_table() -> Result<GateTable, ConfigError> {
    GateTable::new(vec![
        MetricRule::required(CRITICAL_FINDINGS, Comparator::Lte, 0.0),
        MetricRule::required(HIGH_FINDINGS, Comparator::Lte, 0.0),
        MetricRule::required(SECRETS_FOUND, Comparator::Eq, false),
        MetricRule::advisory(MEDIUM_FINDINGS, Comparator::Lte, 0.0),
        MetricRule::advisory(LOW_FINDINGS, Comparator::Lte, 0.0),
    ])
}

/// Gate evaluation input for a merged report.
pub fn gate_input(run_id: &str, report: &SecurityReport, artifact: &Artifact) -> GateEvaluationInput {
    GateEvaluationInput {
        run_id: run_id.to_string(),
        phase: PHASE.to_string(),
        artifacts: vec![artifact.clone()],
        metrics: report.summary.to_metrics(),
        overall_score: report.summary.risk_score(),
    }
}

pub struct SecurityCoordinator {
    critical: CriticalScanners,
    container: Option<Arc<dyn SecurityScanner>>,
    iac: Option<Arc<dyn SecurityScanner>>,
    gate: Gate,
    events: Arc<dyn EventSink>,
}

impl SecurityCoordinator {
    pub fn new(critical: CriticalScanners, table: GateTable) -> Result<Self, ConfigError> {
        table.require_metrics(PHASE, [CRITICAL_FINDINGS, HIGH_FINDINGS, SECRETS_FOUND])?;
        table.check_known(PHASE, SECURITY_METRICS)?;
        Ok(Self {
            critical,
            container: None,
            iac: None,
            gate: Gate::new(table),
            events: Arc::new(TracingEventSink),
        })
    }

    pub fn with_container_scanner(mut self, scanner: Arc<dyn SecurityScanner>) -> Self {
        self.container = Some(scanner);
        self
    }

    pub fn with_iac_scanner(mut self, scanner: Arc<dyn SecurityScanner>) -> Self {
        self.iac = Some(scanner);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub async fn execute(&self, target: &ScanTarget) -> Result<SecurityOutcome, SecurityError> {
        let span = phase_span(&target.run_id, PHASE);
        self.run(target).instrument(span).await
    }

    async fn run(&self, target: &ScanTarget) -> Result<SecurityOutcome, SecurityError> {
        METRICS.inc_security_scans();
        let target = Arc::new(target.clone());

        let critical = [
            &self.critical.sast,
            &self.critical.dependency,
            &self.critical.secrets,
        ];
        let settled = dispatch(&critical, &target).await;

        let mut scans = Vec::new();
        let mut first_failure = None;
        for (scanner, outcome) in critical.iter().zip(settled) {
            match outcome {
                Settled::Fulfilled(report) => scans.push(report),
                Settled::Rejected(err) => {
                    self.events.emit(&PhaseEvent::ScannerFailed {
                        run_id: target.run_id.clone(),
                        scanner: scanner.name().to_string(),
                        critical: true,
                        error: err.to_string(),
                    });
                    first_failure.get_or_insert(SecurityError::CriticalScannerFailed {
                        scanner: scanner.name().to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        if let Some(err) = first_failure {
            return Err(err);
        }

        let mut skipped = Vec::new();
        let mut optional = Vec::new();
        for (slot, inputs, what) in [
            (&self.container, target.images.len(), "no container images"),
            (&self.iac, target.iac_files.len(), "no IaC files"),
        ] {
            let Some(scanner) = slot else { continue };
            if inputs == 0 {
                self.events.emit(&PhaseEvent::ScannerSkipped {
                    run_id: target.run_id.clone(),
                    scanner: scanner.name().to_string(),
                    reason: what.to_string(),
                });
                skipped.push(scanner.name().to_string());
            } else {
                optional.push(scanner);
            }
        }

        let mut failed = Vec::new();
        if !optional.is_empty() {
            let settled = dispatch(&optional, &target).await;
            for (scanner, outcome) in optional.iter().zip(settled) {
                match outcome {
                    Settled::Fulfilled(report) => scans.push(report),
                    Settled::Rejected(err) => {
                        self.events.emit(&PhaseEvent::ScannerFailed {
                            run_id: target.run_id.clone(),
                            scanner: scanner.name().to_string(),
                            critical: false,
                            error: err.to_string(),
                        });
                        failed.push(scanner.name().to_string());
                    }
                }
            }
        }

        let mut report = SecurityReport::from_reports(&scans);
        report.scanners_skipped = skipped;
        report.scanners_failed = failed;

        let artifact = Artifact::from_agent(
            "security-coordinator",
            ArtifactContent::SecurityReport(report.clone()),
        );
        let gate = self
            .gate
            .evaluate(&gate_input(&target.run_id, &report, &artifact));
        METRICS.inc_gate_evaluations();
        self.events.emit(&PhaseEvent::GateEvaluated {
            run_id: target.run_id.clone(),
            phase: PHASE.to_string(),
            attempt: 1,
            decision: gate.decision,
            overall_score: gate.overall_score,
            failed_metrics: gate.failed_metrics.len(),
        });

        Ok(SecurityOutcome {
            report,
            scans,
            gate,
            artifact,
        })
    }
}

async fn dispatch(
    scanners: &[&Arc<dyn SecurityScanner>],
    target: &Arc<ScanTarget>,
) -> Vec<Settled<ScanReport, AgentError>> {
    let tasks: Vec<Task<ScanReport, AgentError>> = scanners
        .iter()
        .map(|scanner| {
            let scanner = Arc::clone(scanner);
            let target = Arc::clone(target);
            async move { scanner.scan(&target).await }.boxed()
        })
        .collect();
    let cap = tasks.len();
    dispatcher::run_all(tasks, cap).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Decision;

    struct StaticScanner {
        name: &'static str,
        report: Result<ScanReport, AgentError>,
    }

    #[async_trait]
    impl SecurityScanner for StaticScanner {
        fn name(&self) -> &str {
            self.name
        }

        async fn scan(&self, _target: &ScanTarget) -> Result<ScanReport, AgentError> {
            self.report.clone()
        }
    }

    fn clean(name: &'static str, kind: ScannerKind) -> Arc<dyn SecurityScanner> {
        Arc::new(StaticScanner {
            name,
            report: Ok(ScanReport::new(name, kind)),
        })
    }

    fn critical() -> CriticalScanners {
        CriticalScanners {
            sast: clean("semgrep", ScannerKind::Sast),
            dependency: clean("osv", ScannerKind::Dependency),
            secrets: clean("gitleaks", ScannerKind::Secrets),
        }
    }

    #[tokio::test]
    async fn clean_scan_passes_and_skips_optional() {
        let coordinator = SecurityCoordinator::new(critical(), default_gate_table().unwrap())
            .unwrap()
            .with_container_scanner(clean("trivy", ScannerKind::Container));

        let outcome = coordinator
            .execute(&ScanTarget::new("run-1", "proj-1"))
            .await
            .unwrap();
        assert_eq!(outcome.report.status, SecurityStatus::Pass);
        assert_eq!(outcome.report.scanners_run.len(), 3);
        assert_eq!(outcome.report.scanners_skipped, vec!["trivy"]);
        assert_eq!(outcome.gate.decision, Decision::Pass);
        assert_eq!(outcome.gate.overall_score, 100);
    }

    #[tokio::test]
    async fn failed_critical_scanner_is_an_error() {
        let mut scanners = critical();
        scanners.secrets = Arc::new(StaticScanner {
            name: "gitleaks",
            report: Err(AgentError::failed("gitleaks", "binary not found")),
        });
        let coordinator =
            SecurityCoordinator::new(scanners, default_gate_table().unwrap()).unwrap();

        let err = coordinator
            .execute(&ScanTarget::new("run-1", "proj-1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SecurityError::CriticalScannerFailed { ref scanner, .. } if scanner == "gitleaks"
        ));
    }

    #[test]
    fn table_without_secret_rule_is_rejected() {
        let table = GateTable::new(vec![
            MetricRule::required(CRITICAL_FINDINGS, Comparator::Lte, 0.0),
            MetricRule::required(HIGH_FINDINGS, Comparator::Lte, 0.0),
        ])
        .unwrap();
        assert!(matches!(
            SecurityCoordinator::new(critical(), table),
            Err(ConfigError::MissingThreshold { .. })
        ));
    }
}
