//! Process-wide registry of generation jobs.
//!
//! [`JobRegistry`] owns every [`GenerationJob`] for one session. It is not a
//! singleton: construct one per session and share it via `Arc`. All
//! mutations run under a single write guard, so two jobs finishing at the
//! same instant cannot lose each other's update.
//!
//! Registry changes are broadcast as [`JobEvent`]s. Call
//! [`JobRegistry::subscribe`] to receive them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::error::CoreError;
use crate::job::{ContentRef, GenerationJob, JobKind, JobStatus, JobUpdate};
use crate::shot_state::ShotStateSync;
use crate::types::JobId;

/// Broadcast channel capacity for registry events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A change to the registry, for display layers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Submitted { job: GenerationJob },
    Updated { job: GenerationJob },
    Removed { job_id: JobId },
    Cleared { count: usize },
}

// ---------------------------------------------------------------------------
// JobRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RegistryState {
    jobs: HashMap<JobId, GenerationJob>,
    /// Display order, newest first.
    order: VecDeque<JobId>,
}

impl RegistryState {
    fn has_active_sibling(&self, entity_id: &str, kind: JobKind) -> bool {
        self.jobs
            .values()
            .any(|j| j.targets(entity_id, kind) && j.status.is_active())
    }
}

pub struct JobRegistry {
    state: RwLock<RegistryState>,
    shot_state: Arc<dyn ShotStateSync>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl JobRegistry {
    pub fn new(shot_state: Arc<dyn ShotStateSync>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(RegistryState::default()),
            shot_state,
            event_tx,
        }
    }

    /// Subscribe to registry events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// The synchronizer this registry notifies.
    pub fn shot_state(&self) -> &Arc<dyn ShotStateSync> {
        &self.shot_state
    }

    /// Create a pending job at the head of the display list.
    pub async fn submit(
        &self,
        kind: JobKind,
        name: impl Into<String>,
        content_ref: Option<ContentRef>,
    ) -> JobId {
        let job = GenerationJob::new(kind, name, content_ref);
        let id = job.id;

        {
            let mut state = self.state.write().await;
            state.order.push_front(id);
            state.jobs.insert(id, job.clone());
        }

        tracing::debug!(job_id = %id, kind = %kind, "Job submitted");
        self.publish(JobEvent::Submitted { job });
        id
    }

    /// Move a job to `status`, applying `update`.
    ///
    /// Returns `Ok(None)` when the job has already been removed, so late
    /// completions of deleted jobs are harmless. Illegal transitions are
    /// rejected and leave the job unchanged.
    pub async fn transition(
        &self,
        id: JobId,
        status: JobStatus,
        update: JobUpdate,
    ) -> Result<Option<GenerationJob>, CoreError> {
        let job = {
            let mut state = self.state.write().await;
            let Some(job) = state.jobs.get_mut(&id) else {
                tracing::debug!(job_id = %id, status = %status, "Transition on removed job ignored");
                return Ok(None);
            };
            job.apply(status, update, chrono::Utc::now())?;
            job.clone()
        };

        if status.is_terminal() {
            tracing::info!(job_id = %id, kind = %job.kind, status = %status, "Job finished");
        }
        self.publish(JobEvent::Updated { job: job.clone() });
        Ok(Some(job))
    }

    pub async fn get(&self, id: JobId) -> Option<GenerationJob> {
        self.state.read().await.jobs.get(&id).cloned()
    }

    /// Snapshot of all jobs, newest first.
    pub async fn list(&self) -> Vec<GenerationJob> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.jobs.get(id).cloned())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.jobs.is_empty()
    }

    /// Number of pending or running jobs of `kind` targeting `entity_id`.
    pub async fn active_count(&self, entity_id: &str, kind: JobKind) -> usize {
        self.state
            .read()
            .await
            .jobs
            .values()
            .filter(|j| j.targets(entity_id, kind) && j.status.is_active())
            .count()
    }

    /// Remove a job and, unless a sibling still owns it, clear its flag.
    ///
    /// In-flight work is not cancelled. Returns the removed job, or
    /// `CoreError::JobNotFound`.
    pub async fn delete(&self, id: JobId) -> Result<GenerationJob, CoreError> {
        let (job, clear_flag) = {
            let mut state = self.state.write().await;
            let job = state.jobs.remove(&id).ok_or(CoreError::JobNotFound(id))?;
            state.order.retain(|o| *o != id);

            let flag = job.kind.generating_flag();
            let clear_flag = match (job.entity_id(), flag) {
                (Some(entity_id), Some(flag)) if !state.has_active_sibling(entity_id, job.kind) => {
                    Some((entity_id.to_string(), flag))
                }
                _ => None,
            };
            (job, clear_flag)
        };

        // The guard is released before calling out so a synchronizer that
        // reads the registry cannot deadlock.
        if let Some((entity_id, flag)) = clear_flag {
            self.shot_state
                .clear_generating_flag(&entity_id, flag)
                .await;
        } else if job.entity_id().is_some() && job.kind.generating_flag().is_some() {
            tracing::debug!(
                job_id = %id,
                kind = %job.kind,
                "Sibling job still active, generating flag kept",
            );
        }

        tracing::info!(job_id = %id, kind = %job.kind, "Job deleted");
        self.publish(JobEvent::Removed { job_id: id });
        Ok(job)
    }

    /// Remove every job and clear all flags on each referenced entity.
    ///
    /// Returns the number of jobs removed.
    pub async fn clear_all(&self) -> usize {
        let (count, entities) = {
            let mut state = self.state.write().await;
            let count = state.jobs.len();
            let entities: HashSet<String> = state
                .jobs
                .drain()
                .filter_map(|(_, job)| job.content_ref.map(|r| r.entity_id))
                .collect();
            state.order.clear();
            (count, entities)
        };

        for entity_id in &entities {
            self.shot_state.clear_all_flags(entity_id).await;
        }

        tracing::info!(count, entities = entities.len(), "Job registry cleared");
        self.publish(JobEvent::Cleared { count });
        count
    }

    fn publish(&self, event: JobEvent) {
        // A send error only means nobody is subscribed.
        let _ = self.event_tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
