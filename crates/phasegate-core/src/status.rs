//! Readiness classification.
//!
//! Checks run in a fixed order and the first match wins:
//!
//! 1. any dimension below `block_floor`, or any required flag false → `Blocked`
//! 2. composite below `needs_work_composite`, or any dimension below
//!    `needs_work_floor` → `NeedsWork`
//! 3. composite at or above `excellent_composite` and every dimension at or
//!    above `excellent_floor` → `Excellent`
//! 4. otherwise → `Good`
//!
//! There is no weighted voting between the checks; a borderline case is
//! classified by the first rule it trips.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{ConfigError, MetricMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadinessStatus {
    Blocked,
    NeedsWork,
    Good,
    Excellent,
}

impl ReadinessStatus {
    pub fn is_blocked(self) -> bool {
        self == Self::Blocked
    }
}

impl fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Blocked => "BLOCKED",
            Self::NeedsWork => "NEEDS_WORK",
            Self::Good => "GOOD",
            Self::Excellent => "EXCELLENT",
        };
        write!(f, "{s}")
    }
}

/// Phase-specific thresholds for [`classify`](StatusPolicy::classify).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPolicy {
    pub block_floor: u32,
    #[serde(default)]
    pub required_flags: Vec<String>,
    pub needs_work_composite: u32,
    pub needs_work_floor: u32,
    pub excellent_composite: u32,
    pub excellent_floor: u32,
}

impl StatusPolicy {
    /// Floors must be ordered block < needs-work <= excellent.
    pub fn validate(&self, phase: &str) -> Result<(), ConfigError> {
        let ordered = self.block_floor <= self.needs_work_floor
            && self.needs_work_floor <= self.excellent_floor
            && self.needs_work_composite <= self.excellent_composite
            && self.excellent_composite <= 100;
        if ordered {
            Ok(())
        } else {
            Err(ConfigError::InvalidPhase {
                phase: phase.to_string(),
                reason: "status thresholds must increase from blocked to excellent".to_string(),
            })
        }
    }

    pub fn classify(
        &self,
        composite: u32,
        dimensions: &BTreeMap<String, u32>,
        flags: &MetricMap,
    ) -> ReadinessStatus {
        let lowest = dimensions.values().copied().min().unwrap_or(0);

        if lowest < self.block_floor || self.required_flags.iter().any(|f| !flags.flag(f)) {
            return ReadinessStatus::Blocked;
        }
        if composite < self.needs_work_composite || lowest < self.needs_work_floor {
            return ReadinessStatus::NeedsWork;
        }
        if composite >= self.excellent_composite && lowest >= self.excellent_floor {
            return ReadinessStatus::Excellent;
        }
        ReadinessStatus::Good
    }
}
