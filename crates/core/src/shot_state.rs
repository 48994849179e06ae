//! Per-shot generation state that the job registry keeps in sync.
//!
//! The content store itself lives outside this crate. The registry only
//! talks to it through [`ShotStateSync`], and [`InMemoryShotState`] is the
//! implementation used by the worker binary and by tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::job::JobKind;

// ---------------------------------------------------------------------------
// GeneratingFlag
// ---------------------------------------------------------------------------

/// Boolean "generation in progress" marker on a shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratingFlag {
    Image,
    Video,
    Prompt,
    VideoPrompt,
    VisualDetail,
}

impl GeneratingFlag {
    pub const ALL: [GeneratingFlag; 5] = [
        GeneratingFlag::Image,
        GeneratingFlag::Video,
        GeneratingFlag::Prompt,
        GeneratingFlag::VideoPrompt,
        GeneratingFlag::VisualDetail,
    ];
}

// ---------------------------------------------------------------------------
// Sync trait
// ---------------------------------------------------------------------------

/// Side channel from the job registry into the content store.
///
/// Implementations must not fail the caller: a missing shot is a no-op.
#[async_trait]
pub trait ShotStateSync: Send + Sync {
    async fn set_generating_flag(&self, entity_id: &str, flag: GeneratingFlag);

    async fn clear_generating_flag(&self, entity_id: &str, flag: GeneratingFlag);

    /// Record a previous result before it is overwritten.
    async fn append_history(&self, entity_id: &str, kind: JobKind, value: &str);

    /// The value a new result of `kind` would replace, if any.
    async fn current_result(&self, entity_id: &str, kind: JobKind) -> Option<String>;

    async fn store_result(&self, entity_id: &str, kind: JobKind, value: &str);

    /// Clear every generating flag on `entity_id`.
    async fn clear_all_flags(&self, entity_id: &str) {
        for flag in GeneratingFlag::ALL {
            self.clear_generating_flag(entity_id, flag).await;
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryShotState
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ShotRecord {
    flags: HashSet<GeneratingFlag>,
    results: HashMap<JobKind, String>,
    /// Newest first.
    history: HashMap<JobKind, Vec<String>>,
}

/// Process-local content store holding flags, results and history per shot.
#[derive(Debug, Default)]
pub struct InMemoryShotState {
    shots: RwLock<HashMap<String, ShotRecord>>,
}

impl InMemoryShotState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_generating(&self, entity_id: &str, flag: GeneratingFlag) -> bool {
        self.shots
            .read()
            .await
            .get(entity_id)
            .is_some_and(|s| s.flags.contains(&flag))
    }

    /// History entries for `kind`, newest first.
    pub async fn history(&self, entity_id: &str, kind: JobKind) -> Vec<String> {
        self.shots
            .read()
            .await
            .get(entity_id)
            .and_then(|s| s.history.get(&kind).cloned())
            .unwrap_or_default()
    }

    /// Make history entry `index` the current result again.
    ///
    /// The value being replaced joins the history head unless already
    /// present, and the restored value leaves the history. Returns `false`
    /// if there is no such entry.
    pub async fn restore_from_history(&self, entity_id: &str, kind: JobKind, index: usize) -> bool {
        let mut shots = self.shots.write().await;
        let Some(shot) = shots.get_mut(entity_id) else {
            return false;
        };
        let Some(value) = shot.history.get(&kind).and_then(|h| h.get(index)).cloned() else {
            return false;
        };
        if let Some(previous) = shot.results.get(&kind).cloned() {
            push_history(shot, kind, previous);
        }
        if let Some(entries) = shot.history.get_mut(&kind) {
            entries.retain(|v| *v != value);
        }
        shot.results.insert(kind, value);
        true
    }
}

/// Prepend `value` unless it is already recorded. Existing entries keep
/// their position.
fn push_history(shot: &mut ShotRecord, kind: JobKind, value: String) {
    let entries = shot.history.entry(kind).or_default();
    if !entries.contains(&value) {
        entries.insert(0, value);
    }
}

#[async_trait]
impl ShotStateSync for InMemoryShotState {
    async fn set_generating_flag(&self, entity_id: &str, flag: GeneratingFlag) {
        self.shots
            .write()
            .await
            .entry(entity_id.to_string())
            .or_default()
            .flags
            .insert(flag);
    }

    async fn clear_generating_flag(&self, entity_id: &str, flag: GeneratingFlag) {
        if let Some(shot) = self.shots.write().await.get_mut(entity_id) {
            shot.flags.remove(&flag);
        }
    }

    async fn append_history(&self, entity_id: &str, kind: JobKind, value: &str) {
        if value.is_empty() {
            return;
        }
        let mut shots = self.shots.write().await;
        let shot = shots.entry(entity_id.to_string()).or_default();
        push_history(shot, kind, value.to_string());
    }

    async fn current_result(&self, entity_id: &str, kind: JobKind) -> Option<String> {
        self.shots
            .read()
            .await
            .get(entity_id)
            .and_then(|s| s.results.get(&kind).cloned())
    }

    async fn store_result(&self, entity_id: &str, kind: JobKind, value: &str) {
        self.shots
            .write()
            .await
            .entry(entity_id.to_string())
            .or_default()
            .results
            .insert(kind, value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clear_all_flags_clears_every_flag() {
        let state = InMemoryShotState::new();
        for flag in GeneratingFlag::ALL {
            state.set_generating_flag("shot-1", flag).await;
        }
        state.clear_all_flags("shot-1").await;
        for flag in GeneratingFlag::ALL {
            assert!(!state.is_generating("shot-1", flag).await);
        }
    }

    #[tokio::test]
    async fn clearing_unknown_shot_is_a_noop() {
        let state = InMemoryShotState::new();
        state
            .clear_generating_flag("missing", GeneratingFlag::Image)
            .await;
        assert!(!state.is_generating("missing", GeneratingFlag::Image).await);
    }

    #[tokio::test]
    async fn history_skips_values_already_present() {
        let state = InMemoryShotState::new();
        state.append_history("s", JobKind::Image, "a").await;
        state.append_history("s", JobKind::Image, "b").await;
        state.append_history("s", JobKind::Image, "a").await;
        assert_eq!(state.history("s", JobKind::Image).await, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn history_is_unbounded() {
        let state = InMemoryShotState::new();
        for i in 0..50 {
            state
                .append_history("s", JobKind::Prompt, &format!("p{i}"))
                .await;
        }
        let history = state.history("s", JobKind::Prompt).await;
        assert_eq!(history.len(), 50);
        assert_eq!(history[0], "p49");
    }

    #[tokio::test]
    async fn restored_value_leaves_history() {
        let state = InMemoryShotState::new();
        state.append_history("s", JobKind::Image, "old").await;
        state.store_result("s", JobKind::Image, "new").await;

        assert!(state.restore_from_history("s", JobKind::Image, 0).await);
        assert_eq!(
            state.current_result("s", JobKind::Image).await.as_deref(),
            Some("old")
        );
        assert_eq!(state.history("s", JobKind::Image).await, vec!["new"]);
        assert!(!state.restore_from_history("s", JobKind::Image, 9).await);
    }

    #[tokio::test]
    async fn restore_keeps_position_of_current_already_in_history() {
        let state = InMemoryShotState::new();
        state.append_history("s", JobKind::Video, "v1").await;
        state.append_history("s", JobKind::Video, "v2").await;
        state.append_history("s", JobKind::Video, "v3").await;
        state.store_result("s", JobKind::Video, "v1").await;

        // History is [v3, v2, v1]; restoring v2 leaves v1 where it was.
        assert!(state.restore_from_history("s", JobKind::Video, 1).await);
        assert_eq!(
            state.current_result("s", JobKind::Video).await.as_deref(),
            Some("v2")
        );
        assert_eq!(state.history("s", JobKind::Video).await, vec!["v3", "v1"]);
    }

    #[tokio::test]
    async fn restore_without_current_result_just_promotes_entry() {
        let state = InMemoryShotState::new();
        state.append_history("s", JobKind::Image, "a").await;
        state.append_history("s", JobKind::Image, "b").await;

        assert!(state.restore_from_history("s", JobKind::Image, 1).await);
        assert_eq!(
            state.current_result("s", JobKind::Image).await.as_deref(),
            Some("a")
        );
        assert_eq!(state.history("s", JobKind::Image).await, vec!["b"]);
    }
}
