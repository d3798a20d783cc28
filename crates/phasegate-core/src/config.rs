//! Phase configuration files.
//!
//! A phase config names the phase, its agent policy, its retry budget and
//! its gate table:
//!
//! ```toml
//! [phase]
//! phase_name = "beta"
//! min_required_agents = 2
//! max_concurrency = 3
//!
//! [retry]
//! max_gate_retries = 2
//!
//! [[gate.metrics]]
//! metric = "readiness_score"
//! comparator = "gte"
//! threshold = 70
//! ```
//!
//! Loading validates everything that can be checked without the agent set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::coordinator::{Aggregator, PhaseConfig, PhaseCoordinator};
use crate::domain::ConfigError;
use crate::gate::GateTable;
use crate::retry::{EnhancedPhaseCoordinator, GateInputBuilder, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseGateConfig {
    pub phase: PhaseConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    pub gate: GateTable,
}

impl PhaseGateConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.phase.check()?;
        self.retry.validate()
    }

    /// Wire agents and a phase pack into a gated coordinator.
    pub fn build<P>(
        self,
        agents: Vec<Arc<dyn Agent>>,
        phase: Arc<P>,
    ) -> Result<EnhancedPhaseCoordinator, ConfigError>
    where
        P: Aggregator + GateInputBuilder + 'static,
    {
        let inner = PhaseCoordinator::new(self.phase, agents, phase.clone())?;
        EnhancedPhaseCoordinator::new(inner, self.gate, phase, self.retry)
    }
}
