//! Runs generation work as tracked jobs.
//!
//! [`JobRunner::spawn`] registers a job, raises the shot's generating flag
//! and drives the work future on its own tokio task. Every outcome lands in
//! the registry, and the flag is cleared when the task ends. Each job gets
//! a child of the runner's master [`CancellationToken`].
//!
//! Job tasks live in a [`JoinSet`]. Finished tasks are reaped on the next
//! spawn, so the set only holds jobs that may still be running.
//!
//! There is no limit on how many jobs run at once.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use storyreel_core::error::CoreError;
use storyreel_core::failure::user_facing_message;
use storyreel_core::job::{ContentRef, GenerationJob, JobKind, JobStatus, JobUpdate};
use storyreel_core::registry::JobRegistry;
use storyreel_core::types::JobId;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// Progress recorded when a job starts running.
pub const STARTED_PROGRESS: u8 = 5;

/// Result strings longer than this are summarized in the job record.
const RESULT_SUMMARY_LIMIT: usize = 256;

/// What a spawned job is about.
#[derive(Debug, Clone)]
pub struct JobMeta {
    pub kind: JobKind,
    pub name: String,
    pub content_ref: Option<ContentRef>,
}

impl JobMeta {
    pub fn new(kind: JobKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            content_ref: None,
        }
    }

    pub fn for_entity(mut self, content_ref: ContentRef) -> Self {
        self.content_ref = Some(content_ref);
        self
    }
}

pub struct JobRunner {
    registry: Arc<JobRegistry>,
    /// Per-job cancellation tokens, removed when the job's task ends.
    tokens: Arc<RwLock<HashMap<JobId, CancellationToken>>>,
    tasks: Mutex<JoinSet<()>>,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
}

impl JobRunner {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self {
            registry,
            tokens: Arc::new(RwLock::new(HashMap::new())),
            tasks: Mutex::new(JoinSet::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Submit a job and run `work` in the background.
    ///
    /// `work` receives the job's cancellation token and resolves to the
    /// result value stored on the shot. Returns as soon as the job is
    /// registered.
    pub async fn spawn<F, Fut>(&self, meta: JobMeta, work: F) -> JobId
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, PipelineError>> + Send + 'static,
    {
        let id = self
            .registry
            .submit(meta.kind, meta.name.clone(), meta.content_ref.clone())
            .await;

        if let (Some(entity_id), Some(flag)) = (entity_of(&meta), meta.kind.generating_flag()) {
            self.registry
                .shot_state()
                .set_generating_flag(entity_id, flag)
                .await;
        }

        let token = self.cancel.child_token();
        self.tokens.write().await.insert(id, token.clone());

        let registry = Arc::clone(&self.registry);
        let tokens = Arc::clone(&self.tokens);
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.try_join_next() {
            log_join(result);
        }
        tasks.spawn(async move {
            drive(&registry, id, &meta, token, work).await;
            tokens.write().await.remove(&id);
        });
        drop(tasks);

        tracing::info!(job_id = %id, "Job spawned");
        id
    }

    /// Signal a running job to stop. Returns `false` if it is not running.
    pub async fn cancel(&self, id: JobId) -> bool {
        match self.tokens.read().await.get(&id) {
            Some(token) => {
                tracing::info!(job_id = %id, "Cancelling job");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove a job from the registry. In-flight work keeps running.
    pub async fn delete(&self, id: JobId) -> Result<GenerationJob, CoreError> {
        self.registry.delete(id).await
    }

    /// Remove every job from the registry. In-flight work keeps running.
    pub async fn clear_all(&self) -> usize {
        self.registry.clear_all().await
    }

    /// Number of job tasks not yet reaped.
    pub async fn tracked_tasks(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Wait for every job spawned so far to finish.
    pub async fn wait_all(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        while let Some(result) = tasks.join_next().await {
            log_join(result);
        }
    }

    /// Signal every running job to stop without waiting.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Cancel every running job, then wait up to `grace` for them to stop.
    /// Tasks still running after `grace` are aborted.
    pub async fn shutdown(&self, grace: Duration) {
        tracing::info!("Shutting down job runner");
        self.cancel_all();
        if tokio::time::timeout(grace, self.wait_all()).await.is_err() {
            tracing::warn!(grace_secs = grace.as_secs(), "Jobs still running after grace period");
        }
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Job task panicked");
    }
}

fn entity_of(meta: &JobMeta) -> Option<&str> {
    meta.content_ref.as_ref().map(|r| r.entity_id.as_str())
}

/// Run one job to a terminal state.
async fn drive<F, Fut>(
    registry: &JobRegistry,
    id: JobId,
    meta: &JobMeta,
    token: CancellationToken,
    work: F,
) where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<String, PipelineError>>,
{
    record(
        registry,
        id,
        JobStatus::Running,
        JobUpdate::progress(STARTED_PROGRESS),
    )
    .await;

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => Err(PipelineError::Cancelled),
        result = work(token.clone()) => result,
    };

    let shot_state = registry.shot_state();
    match outcome {
        Ok(value) => {
            if let Some(entity_id) = entity_of(meta) {
                if let Some(previous) = shot_state.current_result(entity_id, meta.kind).await {
                    if previous != value {
                        shot_state
                            .append_history(entity_id, meta.kind, &previous)
                            .await;
                    }
                }
                shot_state.store_result(entity_id, meta.kind, &value).await;
            }
            record(
                registry,
                id,
                JobStatus::Success,
                JobUpdate::result(summarize(&value)),
            )
            .await;
        }
        Err(e) if e.is_cancelled() => {
            record(registry, id, JobStatus::Cancelled, JobUpdate::default()).await;
        }
        Err(e) => {
            tracing::warn!(job_id = %id, class = ?e.failure_class(), error = %e, "Job failed");
            let message = user_facing_message(&e.to_string());
            record(registry, id, JobStatus::Failed, JobUpdate::error(message)).await;
        }
    }

    // Cleared even if a same-kind sibling is still running on this shot.
    if let (Some(entity_id), Some(flag)) = (entity_of(meta), meta.kind.generating_flag()) {
        shot_state.clear_generating_flag(entity_id, flag).await;
    }
}

async fn record(registry: &JobRegistry, id: JobId, status: JobStatus, update: JobUpdate) {
    if let Err(e) = registry.transition(id, status, update).await {
        tracing::warn!(job_id = %id, error = %e, "Job transition rejected");
    }
}

/// Keep large payloads such as image data URIs out of the job record.
fn summarize(value: &str) -> String {
    if value.len() <= RESULT_SUMMARY_LIMIT {
        return value.to_string();
    }
    match value.split_once(',') {
        Some((header, _)) if value.starts_with("data:") => {
            format!("{header},… ({} chars)", value.len())
        }
        _ => {
            let mut end = RESULT_SUMMARY_LIMIT;
            while !value.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}…", &value[..end])
        }
    }
}
