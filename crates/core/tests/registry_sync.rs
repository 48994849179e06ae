//! Registry behaviour as seen by the shot-state synchronizer.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use storyreel_core::job::{ContentRef, JobKind, JobStatus, JobUpdate};
use storyreel_core::registry::JobRegistry;
use storyreel_core::shot_state::{GeneratingFlag, InMemoryShotState, ShotStateSync};

// ---------------------------------------------------------------------------
// Recording synchronizer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingSync {
    cleared: Mutex<Vec<(String, GeneratingFlag)>>,
}

impl RecordingSync {
    fn cleared(&self) -> Vec<(String, GeneratingFlag)> {
        self.cleared.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShotStateSync for RecordingSync {
    async fn set_generating_flag(&self, _entity_id: &str, _flag: GeneratingFlag) {}

    async fn clear_generating_flag(&self, entity_id: &str, flag: GeneratingFlag) {
        self.cleared
            .lock()
            .unwrap()
            .push((entity_id.to_string(), flag));
    }

    async fn append_history(&self, _entity_id: &str, _kind: JobKind, _value: &str) {}

    async fn current_result(&self, _entity_id: &str, _kind: JobKind) -> Option<String> {
        None
    }

    async fn store_result(&self, _entity_id: &str, _kind: JobKind, _value: &str) {}
}

fn shot(id: &str) -> Option<ContentRef> {
    Some(ContentRef::new(id).with_position("1", "2"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deleting_only_job_clears_its_flag() {
    let sync = Arc::new(RecordingSync::default());
    let reg = JobRegistry::new(sync.clone());

    let id = reg.submit(JobKind::Image, "Shot 1-2 image", shot("E")).await;
    reg.transition(id, JobStatus::Running, JobUpdate::progress(5))
        .await
        .unwrap();
    reg.delete(id).await.unwrap();

    assert_eq!(sync.cleared(), vec![("E".to_string(), GeneratingFlag::Image)]);
}

#[tokio::test]
async fn deleting_one_of_two_siblings_keeps_flag() {
    let sync = Arc::new(RecordingSync::default());
    let reg = JobRegistry::new(sync.clone());

    let first = reg.submit(JobKind::Image, "first", shot("E")).await;
    let second = reg.submit(JobKind::Image, "second", shot("E")).await;
    reg.transition(second, JobStatus::Running, JobUpdate::default())
        .await
        .unwrap();

    reg.delete(first).await.unwrap();
    assert!(sync.cleared().is_empty());
    assert_eq!(reg.active_count("E", JobKind::Image).await, 1);

    reg.delete(second).await.unwrap();
    assert_eq!(sync.cleared(), vec![("E".to_string(), GeneratingFlag::Image)]);
}

#[tokio::test]
async fn finished_sibling_does_not_hold_the_flag() {
    let sync = Arc::new(RecordingSync::default());
    let reg = JobRegistry::new(sync.clone());

    let done = reg.submit(JobKind::Video, "done", shot("E")).await;
    reg.transition(done, JobStatus::Running, JobUpdate::default())
        .await
        .unwrap();
    reg.transition(done, JobStatus::Success, JobUpdate::result("https://cdn/v.mp4"))
        .await
        .unwrap();
    let other = reg.submit(JobKind::Video, "other", shot("E")).await;

    reg.delete(other).await.unwrap();
    assert_eq!(sync.cleared(), vec![("E".to_string(), GeneratingFlag::Video)]);
}

#[tokio::test]
async fn sibling_of_another_kind_does_not_hold_the_flag() {
    let sync = Arc::new(RecordingSync::default());
    let reg = JobRegistry::new(sync.clone());

    let image = reg.submit(JobKind::Image, "image", shot("E")).await;
    let _prompt = reg.submit(JobKind::Prompt, "prompt", shot("E")).await;

    reg.delete(image).await.unwrap();
    assert_eq!(sync.cleared(), vec![("E".to_string(), GeneratingFlag::Image)]);
}

#[tokio::test]
async fn deleting_analysis_job_touches_no_flag() {
    let sync = Arc::new(RecordingSync::default());
    let reg = JobRegistry::new(sync.clone());

    let id = reg.submit(JobKind::Analysis, "Scene 1", shot("scene-1")).await;
    reg.delete(id).await.unwrap();
    assert!(sync.cleared().is_empty());
}

#[tokio::test]
async fn clear_all_clears_every_flag_on_every_entity() {
    let state = Arc::new(InMemoryShotState::new());
    let reg = JobRegistry::new(state.clone());

    for entity in ["A", "B"] {
        for flag in GeneratingFlag::ALL {
            state.set_generating_flag(entity, flag).await;
        }
    }
    reg.submit(JobKind::Image, "a", shot("A")).await;
    reg.submit(JobKind::Prompt, "b", shot("B")).await;
    reg.submit(JobKind::Analysis, "no entity", None).await;

    assert_eq!(reg.clear_all().await, 3);
    assert!(reg.is_empty().await);
    for entity in ["A", "B"] {
        for flag in GeneratingFlag::ALL {
            assert!(
                !state.is_generating(entity, flag).await,
                "{entity} still has {flag:?}"
            );
        }
    }
}

#[tokio::test]
async fn success_round_trip_reads_back_identical_fields() {
    let reg = JobRegistry::new(Arc::new(InMemoryShotState::new()));
    let id = reg.submit(JobKind::VideoPrompt, "Shot 1-1", shot("S")).await;

    reg.transition(id, JobStatus::Running, JobUpdate::progress(5))
        .await
        .unwrap();
    reg.transition(id, JobStatus::Running, JobUpdate::progress(60))
        .await
        .unwrap();
    reg.transition(id, JobStatus::Success, JobUpdate::result("R"))
        .await
        .unwrap();

    let job = reg.get(id).await.unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.kind, JobKind::VideoPrompt);
    assert_eq!(job.result.as_deref(), Some("R"));
    assert_eq!(job.status, JobStatus::Success);
    assert!(job.ended_at.is_some());
    assert!(job.started_at.is_some());
    assert!(job.error.is_none());
    assert_eq!(job.progress, 100);
}

#[tokio::test]
async fn concurrent_completions_are_not_lost() {
    let reg = Arc::new(JobRegistry::new(Arc::new(InMemoryShotState::new())));
    let mut ids = Vec::new();
    for i in 0..32 {
        ids.push(reg.submit(JobKind::Prompt, format!("p{i}"), shot("E")).await);
    }

    let handles: Vec<_> = ids
        .iter()
        .copied()
        .map(|id| {
            let reg = Arc::clone(&reg);
            tokio::spawn(async move {
                reg.transition(id, JobStatus::Running, JobUpdate::default())
                    .await
                    .unwrap();
                reg.transition(id, JobStatus::Success, JobUpdate::result(id.to_string()))
                    .await
                    .unwrap();
            })
        })
        .collect();
    for h in handles {
        h.await.unwrap();
    }

    for id in ids {
        let job = reg.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.result, Some(id.to_string()));
    }
    assert_eq!(reg.active_count("E", JobKind::Prompt).await, 0);
}
