//! Generation job model and lifecycle rules.
//!
//! A job is created `pending`, moves to `running` when its invocation
//! begins, and ends in exactly one terminal state. Once terminal it is
//! immutable until deleted from the registry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::failure::UNKNOWN_ERROR;
use crate::shot_state::GeneratingFlag;
use crate::types::{EntityId, JobId, Timestamp};

/// Upper bound for [`GenerationJob::progress`].
pub const MAX_PROGRESS: u8 = 100;

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// What a generation job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Image,
    Video,
    Prompt,
    VideoPrompt,
    Analysis,
    VisualDetail,
}

impl JobKind {
    pub const ALL: [JobKind; 6] = [
        JobKind::Image,
        JobKind::Video,
        JobKind::Prompt,
        JobKind::VideoPrompt,
        JobKind::Analysis,
        JobKind::VisualDetail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Image => "image",
            JobKind::Video => "video",
            JobKind::Prompt => "prompt",
            JobKind::VideoPrompt => "video_prompt",
            JobKind::Analysis => "analysis",
            JobKind::VisualDetail => "visual_detail",
        }
    }

    /// The per-shot flag this kind raises while in flight.
    ///
    /// Scene analysis targets a scene, not a shot, and has no flag.
    pub fn generating_flag(self) -> Option<GeneratingFlag> {
        match self {
            JobKind::Image => Some(GeneratingFlag::Image),
            JobKind::Video => Some(GeneratingFlag::Video),
            JobKind::Prompt => Some(GeneratingFlag::Prompt),
            JobKind::VideoPrompt => Some(GeneratingFlag::VideoPrompt),
            JobKind::VisualDetail => Some(GeneratingFlag::VisualDetail),
            JobKind::Analysis => None,
        }
    }

    /// Short human-readable description shown next to the job name.
    pub fn description(self) -> &'static str {
        match self {
            JobKind::Image => "Storyboard image generation",
            JobKind::Video => "Shot video generation",
            JobKind::VisualDetail => "Visual detail derivation",
            JobKind::Analysis => "Scene analysis",
            JobKind::Prompt | JobKind::VideoPrompt => "AI prompt derivation",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    /// Aborted by an external signal. Distinct from `Failed`.
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Pending or running.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    ///
    /// `Running -> Running` is allowed so progress can be reported. A job
    /// may fail or be cancelled before it ever started. Nothing leaves a
    /// terminal state and nothing re-enters `Pending`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Running)
                | (Running, Success)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ContentRef
// ---------------------------------------------------------------------------

/// The content entity a job targets, with positional labels for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    pub entity_id: EntityId,
    pub scene_number: Option<String>,
    pub shot_number: Option<String>,
}

impl ContentRef {
    pub fn new(entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_id: entity_id.into(),
            scene_number: None,
            shot_number: None,
        }
    }

    /// Attach scene/shot labels (e.g. scene `"1"`, shot `"3"`).
    pub fn with_position(
        mut self,
        scene_number: impl Into<String>,
        shot_number: impl Into<String>,
    ) -> Self {
        self.scene_number = Some(scene_number.into());
        self.shot_number = Some(shot_number.into());
        self
    }
}

// ---------------------------------------------------------------------------
// JobUpdate
// ---------------------------------------------------------------------------

/// Optional fields applied together with a status transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub progress: Option<u8>,
    /// Only recorded when the target status is `Failed`.
    pub error: Option<String>,
    /// Result summary or locator, recorded on `Success`.
    pub result: Option<String>,
}

impl JobUpdate {
    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn result(result: impl Into<String>) -> Self {
        Self {
            result: Some(result.into()),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationJob
// ---------------------------------------------------------------------------

/// A tracked unit of asynchronous work wrapping one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: JobId,
    pub kind: JobKind,
    pub name: String,
    pub description: String,
    pub content_ref: Option<ContentRef>,
    pub status: JobStatus,
    /// Completion percentage (0-100).
    pub progress: u8,
    pub submitted_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    /// Set iff `status == Failed`.
    pub error: Option<String>,
    pub result: Option<String>,
}

impl GenerationJob {
    /// Create a pending job with a fresh id.
    pub fn new(kind: JobKind, name: impl Into<String>, content_ref: Option<ContentRef>) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            kind,
            name: name.into(),
            description: kind.description().to_string(),
            content_ref,
            status: JobStatus::Pending,
            progress: 0,
            submitted_at: chrono::Utc::now(),
            started_at: None,
            ended_at: None,
            error: None,
            result: None,
        }
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.content_ref.as_ref().map(|r| r.entity_id.as_str())
    }

    /// Whether this job is of `kind` and targets `entity_id`.
    pub fn targets(&self, entity_id: &str, kind: JobKind) -> bool {
        self.kind == kind && self.entity_id() == Some(entity_id)
    }

    /// Apply a status transition and its fields at time `now`.
    ///
    /// Rejects illegal transitions without touching the job.
    pub fn apply(
        &mut self,
        next: JobStatus,
        update: JobUpdate,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }

        match next {
            JobStatus::Running => {
                self.started_at.get_or_insert(now);
                if let Some(p) = update.progress {
                    // Progress never moves backwards while running.
                    self.progress = self.progress.max(p.min(MAX_PROGRESS));
                }
            }
            JobStatus::Success => {
                self.progress = MAX_PROGRESS;
                self.ended_at = Some(now);
                if update.result.is_some() {
                    self.result = update.result;
                }
            }
            JobStatus::Failed => {
                self.ended_at = Some(now);
                let error = update
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                self.error = Some(error);
            }
            JobStatus::Cancelled => {
                self.ended_at = Some(now);
            }
            JobStatus::Pending => {}
        }

        if next != JobStatus::Failed {
            self.error = None;
        }
        self.status = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
