//! Phase coordination: fan out to agents, fan in through an aggregator.
//!
//! A [`PhaseCoordinator`] owns one phase's agent set. Each attempt runs every
//! agent through [`dispatcher::run_all`] under the configured concurrency cap,
//! partitions the outcomes, and only invokes the [`Aggregator`] when at least
//! `min_required_agents` agents succeeded. Otherwise the attempt returns a
//! failed [`PhaseResult`] without aggregating.

use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};

use crate::agent::Agent;
use crate::dispatcher::{self, Settled, Task};
use crate::domain::{
    AgentError, AgentInput, Artifact, ConfigError, PhaseFailure, PhaseInput, PhaseResult,
    PhaseSummary, Result,
};
use crate::metrics::METRICS;
use crate::obs::{phase_span, EventSink, PhaseEvent, TracingEventSink};

/// Static shape of a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub phase_name: String,
    pub min_required_agents: usize,
    pub max_concurrency: usize,
}

impl PhaseConfig {
    pub fn new(
        phase_name: impl Into<String>,
        min_required_agents: usize,
        max_concurrency: usize,
    ) -> Self {
        Self {
            phase_name: phase_name.into(),
            min_required_agents,
            max_concurrency,
        }
    }

    /// Checks that do not depend on the agent set.
    pub fn check(&self) -> std::result::Result<(), ConfigError> {
        if self.phase_name.trim().is_empty() {
            return Err(ConfigError::InvalidPhase {
                phase: self.phase_name.clone(),
                reason: "phase name must not be empty".to_string(),
            });
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidPhase {
                phase: self.phase_name.clone(),
                reason: "max_concurrency must be at least 1".to_string(),
            });
        }
        if self.min_required_agents == 0 {
            return Err(ConfigError::InvalidPhase {
                phase: self.phase_name.clone(),
                reason: "min_required_agents must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Check the config against the number of agents it will drive.
    pub fn validate(&self, agent_count: usize) -> std::result::Result<(), ConfigError> {
        self.check()?;
        if self.min_required_agents > agent_count {
            return Err(ConfigError::MinAgentsUnreachable {
                phase: self.phase_name.clone(),
                required: self.min_required_agents,
                available: agent_count,
            });
        }
        Ok(())
    }
}

/// An agent that settled successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSuccess {
    pub agent: String,
    pub artifacts: Vec<Artifact>,
}

/// An agent that failed; kept for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentFailure {
    pub agent: String,
    pub error: AgentError,
}

/// What an aggregator sees.
#[derive(Debug, Clone, Copy)]
pub struct AggregationContext<'a> {
    pub phase: &'a str,
    pub successes: &'a [AgentSuccess],
    pub failures: &'a [AgentFailure],
}

impl<'a> AggregationContext<'a> {
    /// Artifacts of all successful agents, in agent order.
    pub fn artifacts(&self) -> impl Iterator<Item = &'a Artifact> {
        self.successes.iter().flat_map(|s| s.artifacts.iter())
    }

    pub fn collected_artifacts(&self) -> Vec<Artifact> {
        self.artifacts().cloned().collect()
    }
}

/// Output of an aggregator: its composite artifacts and the phase summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub artifacts: Vec<Artifact>,
    pub summary: PhaseSummary,
}

/// Reduces successful agent outputs into dimension scores and a composite.
pub trait Aggregator: Send + Sync {
    /// Construction-time checks, e.g. that weights sum to 1.0.
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        Ok(())
    }

    /// A missing artifact type must score 0 for its dimension, never error.
    fn aggregate(&self, ctx: &AggregationContext<'_>) -> Result<Aggregation>;
}

/// Runs one phase's agents and aggregates their results.
pub struct PhaseCoordinator {
    config: PhaseConfig,
    agents: Vec<Arc<dyn Agent>>,
    aggregator: Arc<dyn Aggregator>,
    events: Arc<dyn EventSink>,
}

impl PhaseCoordinator {
    /// Validate and build. Fails fast on any configuration problem.
    pub fn new(
        config: PhaseConfig,
        agents: Vec<Arc<dyn Agent>>,
        aggregator: Arc<dyn Aggregator>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate(agents.len())?;
        aggregator.validate()?;
        Ok(Self {
            config,
            agents,
            aggregator,
            events: Arc::new(TracingEventSink),
        })
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    pub fn phase_name(&self) -> &str {
        &self.config.phase_name
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    pub(crate) fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Run one attempt for `input`.
    pub async fn execute(&self, input: &PhaseInput) -> Result<PhaseResult> {
        let span = phase_span(&input.workflow_run_id, &self.config.phase_name);
        self.run_attempt(AgentInput::from_phase(input), 1)
            .instrument(span)
            .await
    }

    /// One attempt without its own span; callers instrument.
    pub(crate) async fn run_attempt(&self, input: AgentInput, attempt: u32) -> Result<PhaseResult> {
        let started = Instant::now();
        let phase = self.config.phase_name.as_str();
        let run_id = input.workflow_run_id.clone();

        self.events.emit(&PhaseEvent::PhaseStarted {
            run_id: run_id.clone(),
            phase: phase.to_string(),
            attempt,
            agents: self.agents.len(),
        });
        METRICS.inc_phases();

        let input = Arc::new(input);
        let tasks: Vec<Task<Vec<Artifact>, AgentError>> = self
            .agents
            .iter()
            .map(|agent| {
                let agent = Arc::clone(agent);
                let input = Arc::clone(&input);
                async move { agent.execute(&input).await }.boxed()
            })
            .collect();

        let settled = dispatcher::run_all(tasks, self.config.max_concurrency).await;

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for (agent, outcome) in self.agents.iter().zip(settled) {
            let name = agent.name().to_string();
            match outcome {
                Settled::Fulfilled(artifacts) => {
                    self.events.emit(&PhaseEvent::AgentSettled {
                        run_id: run_id.clone(),
                        phase: phase.to_string(),
                        agent: name.clone(),
                        success: true,
                        artifacts: artifacts.len(),
                        error: None,
                    });
                    successes.push(AgentSuccess {
                        agent: name,
                        artifacts,
                    });
                }
                Settled::Rejected(error) => {
                    self.events.emit(&PhaseEvent::AgentSettled {
                        run_id: run_id.clone(),
                        phase: phase.to_string(),
                        agent: name.clone(),
                        success: false,
                        artifacts: 0,
                        error: Some(error.to_string()),
                    });
                    failures.push(AgentFailure { agent: name, error });
                }
            }
        }
        METRICS.add_agent_failures(failures.len() as u64);

        let failure_messages: Vec<String> = failures.iter().map(|f| f.error.to_string()).collect();

        if successes.len() < self.config.min_required_agents {
            debug!(
                succeeded = successes.len(),
                required = self.config.min_required_agents,
                "not enough agents succeeded; skipping aggregation"
            );
            self.emit_completed(&run_id, false, successes.len(), failures.len(), None, started);
            return Ok(PhaseResult::failed(
                phase,
                PhaseFailure::InsufficientSuccesses {
                    succeeded: successes.len(),
                    required: self.config.min_required_agents,
                    failures: failure_messages,
                },
            ));
        }

        let ctx = AggregationContext {
            phase,
            successes: &successes,
            failures: &failures,
        };
        let aggregation = self.aggregator.aggregate(&ctx)?;

        let mut summary = aggregation.summary;
        summary.phase = phase.to_string();
        summary.agents_succeeded = successes.len();
        summary.agents_failed = failures.len();
        summary.failures = failure_messages;

        let mut artifacts = ctx.collected_artifacts();
        artifacts.extend(aggregation.artifacts);

        self.emit_completed(
            &run_id,
            true,
            successes.len(),
            failures.len(),
            Some(summary.composite_score),
            started,
        );
        Ok(PhaseResult::succeeded(phase, artifacts, summary))
    }

    fn emit_completed(
        &self,
        run_id: &str,
        success: bool,
        succeeded: usize,
        failed: usize,
        composite_score: Option<u32>,
        started: Instant,
    ) {
        self.events.emit(&PhaseEvent::PhaseCompleted {
            run_id: run_id.to_string(),
            phase: self.config.phase_name.clone(),
            success,
            succeeded,
            failed,
            composite_score,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::FnAgent;
    use crate::status::ReadinessStatus;
    use std::collections::BTreeMap;

    struct CountingAggregator;

    impl Aggregator for CountingAggregator {
        fn aggregate(&self, ctx: &AggregationContext<'_>) -> Result<Aggregation> {
            Ok(Aggregation {
                artifacts: Vec::new(),
                summary: PhaseSummary {
                    phase: ctx.phase.to_string(),
                    composite_score: ctx.artifacts().count() as u32,
                    status: ReadinessStatus::Good,
                    dimensions: BTreeMap::new(),
                    agents_succeeded: 0,
                    agents_failed: 0,
                    failures: Vec::new(),
                },
            })
        }
    }

    fn ok_agent(name: &str) -> Arc<dyn Agent> {
        FnAgent::shared(name.to_string(), |_input| async { Ok(Vec::new()) })
    }

    #[test]
    fn config_rejects_unreachable_minimum() {
        let err = PhaseCoordinator::new(
            PhaseConfig::new("beta", 3, 2),
            vec![ok_agent("a"), ok_agent("b")],
            Arc::new(CountingAggregator),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::MinAgentsUnreachable { .. }));

        let err = PhaseConfig::new("beta", 0, 2).validate(2).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPhase { .. }));

        let err = PhaseConfig::new("beta", 1, 0).validate(2).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPhase { .. }));
    }

    #[tokio::test]
    async fn summary_counts_are_filled_by_coordinator() {
        let coordinator = PhaseCoordinator::new(
            PhaseConfig::new("beta", 1, 2),
            vec![
                ok_agent("a"),
                FnAgent::shared("b", |_input| async {
                    Err(AgentError::failed("b", "model unavailable"))
                }),
            ],
            Arc::new(CountingAggregator),
        )
        .unwrap();

        let result = coordinator
            .execute(&PhaseInput::new("run-1", "proj-1"))
            .await
            .unwrap();
        let summary = result.summary.unwrap();
        assert_eq!(summary.agents_succeeded, 1);
        assert_eq!(summary.agents_failed, 1);
        assert_eq!(summary.failures, vec!["agent b failed: model unavailable"]);
        assert_eq!(summary.phase, "beta");
    }
}
