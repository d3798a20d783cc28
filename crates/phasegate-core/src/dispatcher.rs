//! Bounded-concurrency task dispatch with per-task outcomes.
//!
//! [`run_all`] spawns every task onto a [`JoinSet`], gates execution behind a
//! [`Semaphore`] sized to the concurrency cap, and returns one [`Settled`]
//! per task in submission order. A failing or panicking task never cancels
//! its siblings, and the call only returns once every task has settled.
//!
//! There is no cancellation or timeout at this layer: once dispatched, a
//! task runs to completion. Per-task deadlines belong to the task itself.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::domain::AgentError;

/// A boxed, spawnable unit of work.
pub type Task<T, E> = BoxFuture<'static, Result<T, E>>;

/// Outcome of one task.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Settled<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Fulfilled(v) => Ok(v),
            Self::Rejected(e) => Err(e),
        }
    }
}

impl<T, E> From<Result<T, E>> for Settled<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Self::Fulfilled(v),
            Err(e) => Self::Rejected(e),
        }
    }
}

/// A task that ended abnormally (panicked or was torn down by the runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAborted {
    pub index: usize,
    pub detail: String,
}

impl From<TaskAborted> for AgentError {
    fn from(aborted: TaskAborted) -> Self {
        AgentError::Panicked {
            index: aborted.index,
            detail: aborted.detail,
        }
    }
}

/// Run `tasks` with at most `max_concurrency` in flight; a cap of zero is
/// treated as one.
///
/// Must be called from within a Tokio runtime.
pub async fn run_all<T, E>(tasks: Vec<Task<T, E>>, max_concurrency: usize) -> Vec<Settled<T, E>>
where
    T: Send + 'static,
    E: From<TaskAborted> + Send + 'static,
{
    let total = tasks.len();
    let cap = max_concurrency.max(1);
    debug!(tasks = total, max_concurrency = cap, "dispatching batch");

    let sem = Arc::new(Semaphore::new(cap));
    let mut join_set = JoinSet::new();

    for (idx, task) in tasks.into_iter().enumerate() {
        let sem = Arc::clone(&sem);
        join_set.spawn(async move {
            let _permit = sem.acquire_owned().await.ok();
            let settled = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(result) => Settled::from(result),
                Err(payload) => {
                    let detail = panic_message(payload.as_ref());
                    warn!(task = idx, detail = %detail, "task panicked");
                    Settled::Rejected(E::from(TaskAborted { index: idx, detail }))
                }
            };
            (idx, settled)
        });
    }

    let mut slots: Vec<Option<Settled<T, E>>> = (0..total).map(|_| None).collect();
    let mut join_errors = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, settled)) => slots[idx] = Some(settled),
            Err(e) => join_errors.push(e.to_string()),
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                let detail = if join_errors.is_empty() {
                    "task did not report a result".to_string()
                } else {
                    join_errors.join("; ")
                };
                Settled::Rejected(E::from(TaskAborted { index, detail }))
            })
        })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
