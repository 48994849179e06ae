//! Long-running render poller.
//!
//! [`poll_until_done`] waits one interval, queries the task, and repeats
//! until the task reaches a terminal status or the attempt ceiling is hit.
//! A failed query is logged and skipped. A [`CancellationToken`] aborts the
//! loop while it is waiting between polls.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::api::{RenderApi, RenderRequest};
use crate::error::RenderError;
use crate::status::{failure_detail_of, locator_of, status_of, RenderStatus, ResultLocator};

/// Submission, status and content retrieval for remote render tasks.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Create a task and return its vendor id.
    async fn create_task(&self, request: &RenderRequest) -> Result<String, RenderError>;

    async fn task_status(&self, task_id: &str) -> Result<Value, RenderError>;

    /// Bytes of a finished task, when the service serves them directly.
    async fn task_content(&self, task_id: &str) -> Result<Option<Vec<u8>>, RenderError>;
}

#[async_trait]
impl RenderBackend for RenderApi {
    async fn create_task(&self, request: &RenderRequest) -> Result<String, RenderError> {
        RenderApi::create_task(self, request).await
    }

    async fn task_status(&self, task_id: &str) -> Result<Value, RenderError> {
        self.get_task(task_id).await
    }

    async fn task_content(&self, task_id: &str) -> Result<Option<Vec<u8>>, RenderError> {
        self.fetch_content(task_id).await
    }
}

/// Poll cadence and ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    /// 5 s between polls, 240 polls: about 20 minutes.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 240,
        }
    }
}

impl PollConfig {
    /// Longest time a poll loop can run.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Poll `task_id` until it finishes, fails, times out or is cancelled.
pub async fn poll_until_done<B>(
    backend: &B,
    task_id: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<ResultLocator, RenderError>
where
    B: RenderBackend + ?Sized,
{
    for attempt in 1..=config.max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(task_id, attempt, "Render polling cancelled");
                return Err(RenderError::Cancelled);
            }
            _ = tokio::time::sleep(config.interval) => {}
        }

        let snapshot = match backend.task_status(task_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(task_id, attempt, error = %e, "Render poll failed");
                continue;
            }
        };

        match status_of(&snapshot) {
            RenderStatus::Succeeded => {
                tracing::info!(task_id, attempt, "Render task succeeded");
                return resolve_locator(backend, task_id, &snapshot).await;
            }
            RenderStatus::Failed => {
                let detail = failure_detail_of(&snapshot);
                tracing::warn!(task_id, attempt, detail = %detail, "Render task failed");
                return Err(RenderError::RemoteFailed(detail));
            }
            status => {
                tracing::debug!(task_id, attempt, status = ?status, "Render task pending");
            }
        }
    }

    tracing::warn!(task_id, attempts = config.max_attempts, "Render polling timed out");
    Err(RenderError::Timeout {
        attempts: config.max_attempts,
    })
}

async fn resolve_locator<B>(
    backend: &B,
    task_id: &str,
    snapshot: &Value,
) -> Result<ResultLocator, RenderError>
where
    B: RenderBackend + ?Sized,
{
    if let Some(url) = locator_of(snapshot) {
        return Ok(ResultLocator::Url(url));
    }

    match backend.task_content(task_id).await {
        Ok(Some(bytes)) => Ok(ResultLocator::Content(bytes)),
        Ok(None) => Err(RenderError::ResultUnresolvable(task_id.to_string())),
        Err(e) => {
            tracing::warn!(task_id, error = %e, "Render content retrieval failed");
            Err(RenderError::ResultUnresolvable(task_id.to_string()))
        }
    }
}
