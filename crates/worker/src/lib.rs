//! Line-delimited JSON intake for the generation worker.
//!
//! Each input line is one [`WorkerRequest`]. [`submit`] turns it into a
//! tracked job on the [`JobRunner`]. Structured results (prompt
//! derivations, script breakdowns) are stored as JSON text.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use storyreel_core::job::{ContentRef, JobKind};
use storyreel_core::types::JobId;
use storyreel_pipeline::error::PipelineError;
use storyreel_pipeline::runner::{JobMeta, JobRunner};
use storyreel_pipeline::service::{locator_to_string, GenerationService, ImageRequest, VideoRequest};

const DEFAULT_IMAGE_ASPECT: &str = "1:1";
const DEFAULT_VIDEO_ASPECT: &str = "16:9";

/// One generation request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkerRequest {
    pub kind: JobKind,
    pub name: String,
    /// Target shot. Omitted for scene-level work.
    #[serde(default)]
    pub shot_id: Option<String>,
    #[serde(default)]
    pub scene_number: Option<String>,
    #[serde(default)]
    pub shot_number: Option<String>,
    pub instruction: String,
    /// Continuity reference for text and image jobs, first frame for video.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    /// Full script for an analysis job. When present the job breaks the
    /// script into shots and `instruction`, if non-empty, replaces the
    /// default breakdown instructions.
    #[serde(default)]
    pub script: Option<String>,
}

impl WorkerRequest {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse_line(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }

    pub fn meta(&self) -> JobMeta {
        let meta = JobMeta::new(self.kind, self.name.clone());
        match &self.shot_id {
            Some(shot_id) => {
                let mut content_ref = ContentRef::new(shot_id.clone());
                content_ref.scene_number = self.scene_number.clone();
                content_ref.shot_number = self.shot_number.clone();
                meta.for_entity(content_ref)
            }
            None => meta,
        }
    }

    fn aspect_or(&self, default: &str) -> String {
        self.aspect_ratio
            .clone()
            .unwrap_or_else(|| default.to_string())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, PipelineError> {
    serde_json::to_string(value).map_err(|e| PipelineError::Encode(e.to_string()))
}

/// Spawn the job that serves `request`.
pub async fn submit(
    runner: &JobRunner,
    service: Arc<GenerationService>,
    request: WorkerRequest,
) -> JobId {
    let meta = request.meta();
    runner
        .spawn(meta, move |cancel| async move {
            let image = request.image.as_deref();
            match request.kind {
                JobKind::Prompt => {
                    let aspect = request.aspect_or(DEFAULT_IMAGE_ASPECT);
                    let derivation = service
                        .deduce_prompt(&request.instruction, image, &aspect)
                        .await?;
                    encode(&derivation)
                }
                JobKind::VideoPrompt | JobKind::VisualDetail => {
                    service.deduce_text(&request.instruction, image).await
                }
                JobKind::Analysis => match request.script.as_deref() {
                    Some(script) => {
                        let instructions = Some(request.instruction.trim()).filter(|s| !s.is_empty());
                        let shots = service.break_down_script(script, instructions).await?;
                        encode(&shots)
                    }
                    None => service.analyze(&request.instruction).await,
                },
                JobKind::Image => {
                    let image_request = ImageRequest {
                        instruction: request.instruction.clone(),
                        continuity_images: request.image.iter().cloned().collect(),
                        aspect_ratio: request.aspect_or(DEFAULT_IMAGE_ASPECT),
                        ..Default::default()
                    };
                    service.generate_image(&image_request).await
                }
                JobKind::Video => {
                    let video_request = VideoRequest {
                        prompt: request.instruction.clone(),
                        image: request.image.clone(),
                        aspect_ratio: request.aspect_or(DEFAULT_VIDEO_ASPECT),
                        duration: request.duration.clone().unwrap_or_default(),
                    };
                    let locator = service.generate_video(&video_request, &cancel).await?;
                    Ok::<_, PipelineError>(locator_to_string(locator))
                }
            }
        })
        .await
}
