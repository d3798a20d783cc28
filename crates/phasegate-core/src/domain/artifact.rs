//! Typed artifacts produced by agents.
//!
//! On the wire an artifact is `{ "type", "content", "metadata" }`. Known
//! `type` tags decode into a typed [`ArtifactContent`] payload; anything else
//! (or a known tag whose content does not decode) is kept as
//! [`ArtifactContent::Opaque`] so newer agents never break older aggregators.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::security::report::SecurityReport;

pub const BETA_DISTRIBUTION: &str = "beta-distribution";
pub const TELEMETRY_PLAN: &str = "telemetry-plan";
pub const ANALYTICS_PLAN: &str = "analytics-plan";
pub const TEST_PLAN: &str = "test-plan";
pub const COVERAGE_REPORT: &str = "coverage-report";
pub const ACCESSIBILITY_REPORT: &str = "accessibility-report";
pub const PHASE_COMPLETE: &str = "phase-complete";
pub const SECURITY_REPORT: &str = "security-report";

/// How much of a rollout is automated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationLevel {
    #[default]
    None,
    Partial,
    Full,
}

/// Conformance level claimed by an accessibility audit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WcagLevel {
    #[default]
    #[serde(rename = "none")]
    None,
    A,
    AA,
    AAA,
}

/// Beta distribution plan. Missing fields default to zero/false.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BetaDistribution {
    pub channels: Vec<String>,
    pub tester_count: u32,
    pub distribution_ready: bool,
    pub automation_level: AutomationLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryPlan {
    pub events: Vec<String>,
    pub dashboards: u32,
    pub alerts: u32,
    pub crash_reporting: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsPlan {
    pub kpis: u32,
    pub funnels: u32,
    pub experiments: u32,
    pub feedback_loop: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestPlan {
    pub test_cases: u32,
    pub e2e_scenarios: u32,
    pub regression_suite: bool,
}

/// Coverage percentages are in 0–100.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageReport {
    pub line_coverage_pct: f64,
    pub branch_coverage_pct: f64,
    pub critical_paths_covered: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessibilityReport {
    pub wcag_level: WcagLevel,
    pub violations: u32,
    pub critical_violations: u32,
    pub screen_reader_tested: bool,
}

/// Composite record emitted by a phase aggregator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseComplete {
    pub phase: String,
    pub composite_score: u32,
    pub status: String,
    pub dimensions: BTreeMap<String, u32>,
    pub agents_succeeded: usize,
    pub agents_failed: usize,
    /// Digests of the artifacts that fed the aggregation, in input order.
    pub input_digests: Vec<String>,
}

/// Tagged artifact payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    BetaDistribution(BetaDistribution),
    TelemetryPlan(TelemetryPlan),
    AnalyticsPlan(AnalyticsPlan),
    TestPlan(TestPlan),
    CoverageReport(CoverageReport),
    AccessibilityReport(AccessibilityReport),
    PhaseComplete(PhaseComplete),
    SecurityReport(SecurityReport),
    /// Unknown or undecodable payload, kept verbatim.
    Opaque {
        artifact_type: String,
        value: serde_json::Value,
    },
}

impl ArtifactContent {
    /// The wire `type` tag for this payload.
    pub fn type_name(&self) -> &str {
        match self {
            Self::BetaDistribution(_) => BETA_DISTRIBUTION,
            Self::TelemetryPlan(_) => TELEMETRY_PLAN,
            Self::AnalyticsPlan(_) => ANALYTICS_PLAN,
            Self::TestPlan(_) => TEST_PLAN,
            Self::CoverageReport(_) => COVERAGE_REPORT,
            Self::AccessibilityReport(_) => ACCESSIBILITY_REPORT,
            Self::PhaseComplete(_) => PHASE_COMPLETE,
            Self::SecurityReport(_) => SECURITY_REPORT,
            Self::Opaque { artifact_type, .. } => artifact_type,
        }
    }

    /// Decode a payload from its wire tag. Never fails.
    pub fn from_parts(artifact_type: &str, value: serde_json::Value) -> Self {
        fn typed<T: serde::de::DeserializeOwned>(
            value: &serde_json::Value,
            wrap: fn(T) -> ArtifactContent,
        ) -> Option<ArtifactContent> {
            serde_json::from_value(value.clone()).ok().map(wrap)
        }

        let decoded = match artifact_type {
            BETA_DISTRIBUTION => typed(&value, Self::BetaDistribution),
            TELEMETRY_PLAN => typed(&value, Self::TelemetryPlan),
            ANALYTICS_PLAN => typed(&value, Self::AnalyticsPlan),
            TEST_PLAN => typed(&value, Self::TestPlan),
            COVERAGE_REPORT => typed(&value, Self::CoverageReport),
            ACCESSIBILITY_REPORT => typed(&value, Self::AccessibilityReport),
            PHASE_COMPLETE => typed(&value, Self::PhaseComplete),
            SECURITY_REPORT => typed(&value, Self::SecurityReport),
            _ => None,
        };

        decoded.unwrap_or_else(|| Self::Opaque {
            artifact_type: artifact_type.to_string(),
            value,
        })
    }

    /// Payload as a JSON value.
    pub fn to_value(&self) -> serde_json::Value {
        let encoded = match self {
            Self::BetaDistribution(c) => serde_json::to_value(c),
            Self::TelemetryPlan(c) => serde_json::to_value(c),
            Self::AnalyticsPlan(c) => serde_json::to_value(c),
            Self::TestPlan(c) => serde_json::to_value(c),
            Self::CoverageReport(c) => serde_json::to_value(c),
            Self::AccessibilityReport(c) => serde_json::to_value(c),
            Self::PhaseComplete(c) => serde_json::to_value(c),
            Self::SecurityReport(c) => serde_json::to_value(c),
            Self::Opaque { value, .. } => Ok(value.clone()),
        };
        // Plain data structs with string keys always encode.
        encoded.unwrap_or(serde_json::Value::Null)
    }
}

/// Provenance attached to every artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

impl Default for ArtifactMetadata {
    fn default() -> Self {
        Self {
            generated_at: Utc::now(),
            confidence: None,
            agent_id: None,
        }
    }
}

/// An immutable agent output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireArtifact", into = "WireArtifact")]
pub struct Artifact {
    pub content: ArtifactContent,
    pub metadata: ArtifactMetadata,
}

impl Artifact {
    pub fn new(content: ArtifactContent) -> Self {
        Self {
            content,
            metadata: ArtifactMetadata::default(),
        }
    }

    pub fn from_agent(agent_id: impl Into<String>, content: ArtifactContent) -> Self {
        Self {
            content,
            metadata: ArtifactMetadata {
                agent_id: Some(agent_id.into()),
                ..ArtifactMetadata::default()
            },
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.metadata.confidence = Some(confidence);
        self
    }

    pub fn artifact_type(&self) -> &str {
        self.content.type_name()
    }

    /// SHA-256 hex digest over `type` and `content`; metadata is excluded so
    /// regenerating identical content yields the same digest.
    pub fn digest(&self) -> String {
        let canonical = serde_json::json!({
            "type": self.artifact_type(),
            "content": self.content.to_value(),
        });
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

#[derive(Serialize, Deserialize)]
struct WireArtifact {
    #[serde(rename = "type")]
    artifact_type: String,
    #[serde(default)]
    content: serde_json::Value,
    #[serde(default)]
    metadata: ArtifactMetadata,
}

impl From<WireArtifact> for Artifact {
    fn from(wire: WireArtifact) -> Self {
        Self {
            content: ArtifactContent::from_parts(&wire.artifact_type, wire.content),
            metadata: wire.metadata,
        }
    }
}

impl From<Artifact> for WireArtifact {
    fn from(artifact: Artifact) -> Self {
        Self {
            artifact_type: artifact.artifact_type().to_string(),
            content: artifact.content.to_value(),
            metadata: artifact.metadata,
        }
    }
}

/// First artifact whose payload `pick` accepts. The first match is
/// authoritative; later artifacts of the same type are ignored.
pub fn find_first<'a, T>(
    artifacts: &'a [Artifact],
    pick: impl Fn(&'a ArtifactContent) -> Option<&'a T>,
) -> Option<&'a T> {
    artifacts.iter().find_map(|a| pick(&a.content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_type_decodes_to_typed_payload() {
        let artifact: Artifact = serde_json::from_value(json!({
            "type": "beta-distribution",
            "content": { "channels": ["testflight"], "tester_count": 40 },
            "metadata": { "generated_at": "2026-01-01T00:00:00Z", "agent_id": "dist" }
        }))
        .unwrap();

        match &artifact.content {
            ArtifactContent::BetaDistribution(d) => {
                assert_eq!(d.tester_count, 40);
                assert!(!d.distribution_ready);
                assert_eq!(d.automation_level, AutomationLevel::None);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(artifact.metadata.agent_id.as_deref(), Some("dist"));
    }

    #[test]
    fn test_unknown_type_is_kept_opaque() {
        let artifact: Artifact = serde_json::from_value(json!({
            "type": "pricing-model",
            "content": { "tiers": 3 }
        }))
        .unwrap();

        assert_eq!(artifact.artifact_type(), "pricing-model");
        assert!(matches!(artifact.content, ArtifactContent::Opaque { .. }));

        let back = serde_json::to_value(&artifact).unwrap();
        assert_eq!(back["type"], "pricing-model");
        assert_eq!(back["content"]["tiers"], 3);
    }

    #[test]
    fn test_malformed_known_type_falls_back_to_opaque() {
        let artifact: Artifact = serde_json::from_value(json!({
            "type": "test-plan",
            "content": "not an object"
        }))
        .unwrap();
        assert!(matches!(artifact.content, ArtifactContent::Opaque { .. }));
        assert_eq!(artifact.artifact_type(), TEST_PLAN);
    }

    #[test]
    fn test_digest_ignores_metadata() {
        let content = ArtifactContent::TestPlan(TestPlan {
            test_cases: 12,
            ..TestPlan::default()
        });
        let a = Artifact::from_agent("one", content.clone());
        let b = Artifact::from_agent("two", content).with_confidence(0.4);
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_find_first_returns_first_match() {
        let artifacts = vec![
            Artifact::new(ArtifactContent::TestPlan(TestPlan {
                test_cases: 1,
                ..TestPlan::default()
            })),
            Artifact::new(ArtifactContent::TestPlan(TestPlan {
                test_cases: 2,
                ..TestPlan::default()
            })),
        ];
        let found = find_first(&artifacts, |c| match c {
            ArtifactContent::TestPlan(p) => Some(p),
            _ => None,
        });
        assert_eq!(found.map(|p| p.test_cases), Some(1));
    }
}
