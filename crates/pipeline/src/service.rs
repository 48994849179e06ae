//! Generation calls for shots: script breakdown, prompt derivation, scene
//! analysis, image and video synthesis.
//!
//! [`GenerationService`] only performs calls. Wrapping them in tracked jobs
//! is [`JobRunner`](crate::runner::JobRunner)'s job.

use std::sync::Arc;

use base64::Engine;
use storyreel_gemini::api::{GeminiApi, ImageGenerator, SafetyPolicy};
use storyreel_gemini::cascade::{self, CascadeRequest, ContentGenerator};
use storyreel_gemini::chat::{is_google_model, ChatApi, ModelRouter};
use storyreel_gemini::parts::{reference_image, ContentPart};
use storyreel_gemini::response::{parse_breakdown, PromptDerivation, ScriptShot};
use storyreel_render::api::{RenderApi, RenderRequest};
use storyreel_render::poller::{poll_until_done, RenderBackend};
use storyreel_render::status::ResultLocator;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Image size tier sent to models that accept one.
pub const DEFAULT_IMAGE_SIZE: &str = "2K";

const CONTINUITY_CAPTION: &str =
    "Reference: previously generated image for the prior shot. Keep visual continuity.";
const STYLE_CAPTION: &str = "Global style reference";
const LAYOUT_CAPTION: &str = "Layout reference";
const PREVIOUS_SHOT_CAPTION: &str = "Previous shot reference (visual consistency)";

/// Default instructions for splitting a script into shots.
pub const BREAKDOWN_INSTRUCTIONS: &str = "Split the script below into storyboard shots of \
roughly fifteen seconds each. Answer with a JSON array only. Each element is an object with \
the keys segment_text (the exact script text covered), visual_description (what the camera \
sees), composition (framing and camera movement) and audio_cue (dialogue or sound).";

/// Reference images and instruction for a storyboard image.
#[derive(Debug, Clone, Default)]
pub struct ImageRequest {
    pub instruction: String,
    /// `(character name, image)` pairs.
    pub characters: Vec<(String, String)>,
    pub style_image: Option<String>,
    pub layout_image: Option<String>,
    pub continuity_images: Vec<String>,
    pub aspect_ratio: String,
    pub image_size: String,
}

impl ImageRequest {
    /// Parts in model order: characters, style, layout, continuity, then
    /// the instruction.
    pub fn parts(&self) -> Vec<ContentPart> {
        let mut parts = Vec::new();
        for (name, image) in &self.characters {
            parts.extend(reference_image(image, &format!("Character reference: {name}")));
        }
        if let Some(style) = &self.style_image {
            parts.extend(reference_image(style, STYLE_CAPTION));
        }
        if let Some(layout) = &self.layout_image {
            parts.extend(reference_image(layout, LAYOUT_CAPTION));
        }
        for image in &self.continuity_images {
            parts.extend(reference_image(image, PREVIOUS_SHOT_CAPTION));
        }
        parts.push(ContentPart::text(&self.instruction));
        parts
    }
}

/// A video render for one shot.
#[derive(Debug, Clone, Default)]
pub struct VideoRequest {
    pub prompt: String,
    /// First frame, usually the shot's generated image.
    pub image: Option<String>,
    pub aspect_ratio: String,
    pub duration: String,
}

pub struct GenerationService {
    config: PipelineConfig,
    text: Arc<dyn ContentGenerator>,
    images: Arc<dyn ImageGenerator>,
    render: Arc<dyn RenderBackend>,
}

impl GenerationService {
    pub fn new(
        config: PipelineConfig,
        text: Arc<dyn ContentGenerator>,
        images: Arc<dyn ImageGenerator>,
        render: Arc<dyn RenderBackend>,
    ) -> Self {
        Self {
            config,
            text,
            images,
            render,
        }
    }

    /// Build the real HTTP clients from `config`.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(storyreel_gemini::api::GeminiApiError::from)?;

        let gemini = Arc::new(GeminiApi::with_client(
            client.clone(),
            config.gemini_api_key.clone(),
            config.gemini_base_url.clone(),
        ));
        let chat = Arc::new(ChatApi::with_client(
            client.clone(),
            config.chat_api_key.clone(),
            config.chat_base_url.clone(),
        ));
        let text = Arc::new(ModelRouter::new(gemini.clone(), chat));
        let render = Arc::new(RenderApi::with_client(
            client,
            config.video_api_key.clone(),
            config.video_base_url.clone(),
        ));

        Ok(Self::new(config, text, gemini, render))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Text derivation through the invocation cascade.
    ///
    /// A continuity image is kept through the fallback model and dropped
    /// only as a last resort. Non-Google text models take a single
    /// text-only call instead.
    pub async fn deduce_text(
        &self,
        instruction: &str,
        continuity_image: Option<&str>,
    ) -> Result<String, PipelineError> {
        if !is_google_model(&self.config.text_model) {
            let parts = [ContentPart::text(instruction)];
            return Ok(self
                .text
                .generate(&self.config.text_model, &parts, SafetyPolicy::BlockNone)
                .await?);
        }

        let image_parts = continuity_image
            .map(|image| reference_image(image, CONTINUITY_CAPTION))
            .unwrap_or_default();
        let request = CascadeRequest::new(
            self.config.text_model.clone(),
            self.config.fallback_model.clone(),
            image_parts,
            vec![ContentPart::text(instruction)],
        );

        let outcome = cascade::run(self.text.as_ref(), &request).await?;
        if outcome.image_dropped(&request) {
            tracing::warn!(model = %outcome.model, "Continuity image dropped to satisfy safety filter");
        }
        Ok(outcome.text)
    }

    /// Derive positive/negative prompts for a shot.
    pub async fn deduce_prompt(
        &self,
        instruction: &str,
        continuity_image: Option<&str>,
        default_aspect: &str,
    ) -> Result<PromptDerivation, PipelineError> {
        let text = self.deduce_text(instruction, continuity_image).await?;
        Ok(PromptDerivation::from_response(&text, default_aspect))
    }

    /// Split `script` into shots with the text model.
    ///
    /// `instructions` replaces [`BREAKDOWN_INSTRUCTIONS`] when given.
    pub async fn break_down_script(
        &self,
        script: &str,
        instructions: Option<&str>,
    ) -> Result<Vec<ScriptShot>, PipelineError> {
        let instructions = instructions.unwrap_or(BREAKDOWN_INSTRUCTIONS);
        let parts = [ContentPart::text(format!("{instructions}\n\nScript:\n{script}"))];
        tracing::info!(model = %self.config.text_model, chars = script.len(), "Breaking down script");

        let reply = self
            .text
            .generate_json(&self.config.text_model, &parts, SafetyPolicy::Default)
            .await?;
        let shots = parse_breakdown(&reply)
            .ok_or_else(|| PipelineError::InvalidResponse("expected a JSON array of shots".into()))?;
        tracing::info!(shots = shots.len(), "Script broken down");
        Ok(shots)
    }

    /// Single text-only call with default safety settings.
    pub async fn analyze(&self, instruction: &str) -> Result<String, PipelineError> {
        let parts = [ContentPart::text(instruction)];
        Ok(self
            .text
            .generate(&self.config.text_model, &parts, SafetyPolicy::Default)
            .await?)
    }

    /// Generate a storyboard image. Returns a `data:` URI.
    pub async fn generate_image(&self, request: &ImageRequest) -> Result<String, PipelineError> {
        let parts = request.parts();
        let image_size = if request.image_size.is_empty() {
            DEFAULT_IMAGE_SIZE
        } else {
            &request.image_size
        };
        tracing::info!(
            model = %self.config.image_model,
            parts = parts.len(),
            aspect_ratio = %request.aspect_ratio,
            "Generating image",
        );

        Ok(self
            .images
            .generate_image(
                &self.config.image_model,
                &parts,
                &request.aspect_ratio,
                image_size,
            )
            .await?)
    }

    /// Submit a render task and poll it to completion.
    pub async fn generate_video(
        &self,
        request: &VideoRequest,
        cancel: &CancellationToken,
    ) -> Result<ResultLocator, PipelineError> {
        let render_request = RenderRequest {
            model: self.config.video_model.clone(),
            prompt: request.prompt.clone(),
            image: request.image.clone(),
            aspect_ratio: request.aspect_ratio.clone(),
            duration: request.duration.clone(),
        };

        let task_id = self.render.create_task(&render_request).await?;
        tracing::info!(task_id = %task_id, "Render task created");

        Ok(poll_until_done(self.render.as_ref(), &task_id, &self.config.poll, cancel).await?)
    }
}

/// A locator as a string suitable for storing on a shot.
///
/// Fetched content becomes a `data:video/mp4;base64,..` URI.
pub fn locator_to_string(locator: ResultLocator) -> String {
    match locator {
        ResultLocator::Url(url) => url,
        ResultLocator::Content(bytes) => format!(
            "data:video/mp4;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ),
    }
}
