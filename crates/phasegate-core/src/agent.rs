//! Agent boundary.
//!
//! An agent takes an [`AgentInput`] and yields either a list of artifacts or
//! an [`AgentError`]. Coordinators treat agents as opaque; how an agent
//! produces its artifacts (prompting a model, parsing JSON, falling back to a
//! canned value) is its own business.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AgentError, AgentInput, Artifact};

/// Result of one agent invocation.
pub type AgentResult = std::result::Result<Vec<Artifact>, AgentError>;

/// A stateless unit of work run once per phase attempt.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, input: &AgentInput) -> AgentResult;
}

/// Loosely-typed agent response as reported by external workers:
/// `{ success, artifacts?, error? }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub success: bool,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentOutput {
    /// Normalise into an [`AgentResult`]. `success: false` without a message
    /// still becomes an error.
    pub fn into_result(self, agent: &str) -> AgentResult {
        if self.success {
            Ok(self.artifacts)
        } else {
            Err(AgentError::failed(
                agent,
                self.error
                    .unwrap_or_else(|| "agent reported failure".to_string()),
            ))
        }
    }
}

/// Agent backed by an async closure.
///
/// Inject deterministic closures in tests; wire to real workers in
/// production.
pub struct FnAgent<F> {
    name: String,
    run: F,
}

impl<F, Fut> FnAgent<F>
where
    F: Fn(AgentInput) -> Fut + Send + Sync,
    Fut: Future<Output = AgentResult> + Send + 'static,
{
    pub fn new(name: impl Into<String>, run: F) -> Self {
        Self {
            name: name.into(),
            run,
        }
    }

    pub fn shared(name: impl Into<String>, run: F) -> Arc<dyn Agent>
    where
        F: 'static,
    {
        Arc::new(Self::new(name, run))
    }
}

#[async_trait]
impl<F, Fut> Agent for FnAgent<F>
where
    F: Fn(AgentInput) -> Fut + Send + Sync,
    Fut: Future<Output = AgentResult> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: &AgentInput) -> AgentResult {
        (self.run)(input.clone()).await
    }
}
