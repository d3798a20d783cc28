//! Scanner reports and severity roll-up.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::MetricMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Which family of scanner produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerKind {
    Sast,
    Dependency,
    Secrets,
    Container,
    Iac,
}

impl ScannerKind {
    /// Critical-path scanners always run and may not fail.
    pub fn is_critical(self) -> bool {
        matches!(self, Self::Sast | Self::Dependency | Self::Secrets)
    }
}

impl fmt::Display for ScannerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sast => "sast",
            Self::Dependency => "dependency",
            Self::Secrets => "secrets",
            Self::Container => "container",
            Self::Iac => "iac",
        };
        write!(f, "{s}")
    }
}

/// A single finding, violation or issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Finding {
    pub fn new(severity: Severity, title: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Output of one scanner run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub scanner: String,
    pub kind: ScannerKind,
    #[serde(default)]
    pub findings: Vec<Finding>,
    /// Set by secret scanners when a credential was found.
    #[serde(default)]
    pub secrets_found: bool,
}

impl ScanReport {
    pub fn new(scanner: impl Into<String>, kind: ScannerKind) -> Self {
        Self {
            scanner: scanner.into(),
            kind,
            findings: Vec::new(),
            secrets_found: false,
        }
    }

    pub fn with_finding(mut self, finding: Finding) -> Self {
        self.findings.push(finding);
        self
    }

    pub fn with_secret(mut self, finding: Finding) -> Self {
        self.secrets_found = true;
        self.findings.push(finding);
        self
    }

    /// True when the flag is set or a secret scanner reported any finding.
    pub fn has_secrets(&self) -> bool {
        self.secrets_found || (self.kind == ScannerKind::Secrets && !self.findings.is_empty())
    }
}

/// Per-severity counts across every non-null report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub critical_count: u32,
    pub high_count: u32,
    pub medium_count: u32,
    pub low_count: u32,
    pub secrets_found: bool,
}

impl SeveritySummary {
    pub fn total(&self) -> u32 {
        self.critical_count
            .saturating_add(self.high_count)
            .saturating_add(self.medium_count)
            .saturating_add(self.low_count)
    }

    /// 100 minus fixed penalties per finding, floored at 0. Reported as the
    /// gate's overall score; the discrete rules decide the outcome.
    pub fn risk_score(&self) -> u32 {
        let penalty = self
            .critical_count
            .saturating_mul(40)
            .saturating_add(self.high_count.saturating_mul(20))
            .saturating_add(self.medium_count.saturating_mul(5))
            .saturating_add(self.low_count)
            .saturating_add(if self.secrets_found { 40 } else { 0 });
        100u32.saturating_sub(penalty)
    }

    /// Gate metrics for this summary.
    pub fn to_metrics(&self) -> MetricMap {
        MetricMap::new()
            .with(CRITICAL_FINDINGS, self.critical_count)
            .with(HIGH_FINDINGS, self.high_count)
            .with(MEDIUM_FINDINGS, self.medium_count)
            .with(LOW_FINDINGS, self.low_count)
            .with(SECRETS_FOUND, self.secrets_found)
            .with(SECURITY_SCORE, self.risk_score())
    }
}

pub const CRITICAL_FINDINGS: &str = "critical_findings";
pub const HIGH_FINDINGS: &str = "high_findings";
pub const MEDIUM_FINDINGS: &str = "medium_findings";
pub const LOW_FINDINGS: &str = "low_findings";
pub const SECRETS_FOUND: &str = "secrets_found";
pub const SECURITY_SCORE: &str = "security_score";

/// Every metric [`SeveritySummary::to_metrics`] emits.
pub const SECURITY_METRICS: [&str; 6] = [
    CRITICAL_FINDINGS,
    HIGH_FINDINGS,
    MEDIUM_FINDINGS,
    LOW_FINDINGS,
    SECRETS_FOUND,
    SECURITY_SCORE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for SecurityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "pass",
            Self::Warn => "warn",
            Self::Fail => "fail",
        };
        write!(f, "{s}")
    }
}

/// Merged result of a security scan, stored as a `security-report` artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityReport {
    pub summary: SeveritySummary,
    pub status: SecurityStatus,
    pub scanners_run: Vec<String>,
    #[serde(default)]
    pub scanners_skipped: Vec<String>,
    /// Optional scanners that errored and were treated as absent.
    #[serde(default)]
    pub scanners_failed: Vec<String>,
}

impl SecurityReport {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a ScanReport>) -> Self {
        let reports: Vec<&ScanReport> = reports.into_iter().collect();
        let summary = merge_findings(reports.iter().copied());
        Self {
            summary,
            status: overall_status(&summary),
            scanners_run: reports.iter().map(|r| r.scanner.clone()).collect(),
            scanners_skipped: Vec::new(),
            scanners_failed: Vec::new(),
        }
    }
}

/// Count findings per severity across `reports`.
pub fn merge_findings<'a>(reports: impl IntoIterator<Item = &'a ScanReport>) -> SeveritySummary {
    let mut summary = SeveritySummary::default();
    for report in reports {
        summary.secrets_found |= report.has_secrets();
        for finding in &report.findings {
            let count = match finding.severity {
                Severity::Critical => &mut summary.critical_count,
                Severity::High => &mut summary.high_count,
                Severity::Medium => &mut summary.medium_count,
                Severity::Low => &mut summary.low_count,
            };
            *count = count.saturating_add(1);
        }
    }
    summary
}

/// Any critical, high or secret fails; medium or low warns.
pub fn overall_status(summary: &SeveritySummary) -> SecurityStatus {
    if summary.critical_count > 0 || summary.secrets_found || summary.high_count > 0 {
        SecurityStatus::Fail
    } else if summary.medium_count > 0 || summary.low_count > 0 {
        SecurityStatus::Warn
    } else {
        SecurityStatus::Pass
    }
}
