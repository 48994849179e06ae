//! Invocation cascade for requests carrying a continuity reference image.
//!
//! A primary model may reject an attached image on safety grounds. The
//! cascade keeps the image for as long as possible:
//!
//! 1. primary model, text + image
//! 2. fixed fallback model, text + the same image
//! 3. primary model, text only
//!
//! Only a content-safety rejection moves past step 1. Step 2 falls through
//! on any failure. Step 3 is final. Without an image the plan is a single
//! text-only primary call.
//!
//! [`plan`] is pure and [`run`] is the single driver loop that evaluates
//! it against a [`ContentGenerator`].

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use storyreel_core::failure::{FailureClass, UNKNOWN_ERROR};

use crate::api::{GeminiApi, GeminiApiError, SafetyPolicy};
use crate::parts::ContentPart;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A classified failure of one generation call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct InvocationError {
    pub class: FailureClass,
    pub status: Option<u16>,
    pub message: String,
}

impl InvocationError {
    pub fn new(class: FailureClass, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            class,
            status,
            message: message.into(),
        }
    }
}

impl From<GeminiApiError> for InvocationError {
    fn from(err: GeminiApiError) -> Self {
        Self {
            class: err.failure_class(),
            status: err.status(),
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Which configured model an attempt calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelChoice {
    Primary,
    Fallback,
}

/// What goes into the request's parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    TextAndImage,
    TextOnly,
}

impl fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadShape::TextAndImage => f.write_str("text+image"),
            PayloadShape::TextOnly => f.write_str("text"),
        }
    }
}

/// When a failed attempt hands over to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallthrough {
    OnContentSafety,
    Always,
    Never,
}

impl Fallthrough {
    fn allows(self, class: FailureClass) -> bool {
        match self {
            Fallthrough::OnContentSafety => class.triggers_cascade(),
            Fallthrough::Always => true,
            Fallthrough::Never => false,
        }
    }
}

/// One strategy tried during a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvocationAttempt {
    pub model: ModelChoice,
    pub payload: PayloadShape,
    pub safety: SafetyPolicy,
    pub fallthrough: Fallthrough,
}

/// The ordered attempts for a request with or without a reference image.
pub fn plan(has_image: bool) -> Vec<InvocationAttempt> {
    let attempt = |model, payload, fallthrough| InvocationAttempt {
        model,
        payload,
        safety: SafetyPolicy::BlockNone,
        fallthrough,
    };

    if !has_image {
        return vec![attempt(
            ModelChoice::Primary,
            PayloadShape::TextOnly,
            Fallthrough::Never,
        )];
    }

    vec![
        attempt(
            ModelChoice::Primary,
            PayloadShape::TextAndImage,
            Fallthrough::OnContentSafety,
        ),
        attempt(
            ModelChoice::Fallback,
            PayloadShape::TextAndImage,
            Fallthrough::Always,
        ),
        attempt(
            ModelChoice::Primary,
            PayloadShape::TextOnly,
            Fallthrough::Never,
        ),
    ]
}

// ---------------------------------------------------------------------------
// Generator seam
// ---------------------------------------------------------------------------

/// Anything that can answer a text generation call.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        parts: &[ContentPart],
        safety: SafetyPolicy,
    ) -> Result<String, InvocationError>;

    /// Like [`generate`](Self::generate), but asks for a JSON reply where
    /// the backend supports it.
    async fn generate_json(
        &self,
        model: &str,
        parts: &[ContentPart],
        safety: SafetyPolicy,
    ) -> Result<String, InvocationError> {
        self.generate(model, parts, safety).await
    }
}

#[async_trait]
impl ContentGenerator for GeminiApi {
    async fn generate(
        &self,
        model: &str,
        parts: &[ContentPart],
        safety: SafetyPolicy,
    ) -> Result<String, InvocationError> {
        Ok(self.generate_text(model, parts, safety).await?)
    }
}

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// Inputs to a cascade run.
#[derive(Debug, Clone)]
pub struct CascadeRequest {
    pub primary_model: String,
    pub fallback_model: String,
    /// Image parts (with captions) first, then text parts.
    parts: Vec<ContentPart>,
    text_start: usize,
}

impl CascadeRequest {
    pub fn new(
        primary_model: impl Into<String>,
        fallback_model: impl Into<String>,
        image_parts: Vec<ContentPart>,
        text_parts: Vec<ContentPart>,
    ) -> Self {
        let text_start = image_parts.len();
        let mut parts = image_parts;
        parts.extend(text_parts);
        Self {
            primary_model: primary_model.into(),
            fallback_model: fallback_model.into(),
            parts,
            text_start,
        }
    }

    pub fn has_image(&self) -> bool {
        self.parts[..self.text_start].iter().any(|p| p.is_image())
    }

    fn model(&self, choice: ModelChoice) -> &str {
        match choice {
            ModelChoice::Primary => &self.primary_model,
            ModelChoice::Fallback => &self.fallback_model,
        }
    }

    fn parts(&self, shape: PayloadShape) -> &[ContentPart] {
        match shape {
            PayloadShape::TextAndImage => &self.parts,
            PayloadShape::TextOnly => &self.parts[self.text_start..],
        }
    }
}

/// A successful cascade result and the attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub text: String,
    pub attempt: InvocationAttempt,
    pub model: String,
    /// 1-based position of the winning attempt in the plan.
    pub step: usize,
}

impl CascadeOutcome {
    /// Whether the reference image was dropped to get this result.
    pub fn image_dropped(&self, request: &CascadeRequest) -> bool {
        request.has_image() && self.attempt.payload == PayloadShape::TextOnly
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Evaluate [`plan`] for `request`, short-circuiting on the first success.
pub async fn run<G>(generator: &G, request: &CascadeRequest) -> Result<CascadeOutcome, InvocationError>
where
    G: ContentGenerator + ?Sized,
{
    let attempts = plan(request.has_image());
    let total = attempts.len();
    let mut last_error = None;

    for (index, attempt) in attempts.into_iter().enumerate() {
        let step = index + 1;
        let model = request.model(attempt.model);
        tracing::info!(step, total, model, payload = %attempt.payload, "Invoking model");

        match generator
            .generate(model, request.parts(attempt.payload), attempt.safety)
            .await
        {
            Ok(text) => {
                tracing::debug!(step, model, chars = text.len(), "Model responded");
                return Ok(CascadeOutcome {
                    text,
                    attempt,
                    model: model.to_string(),
                    step,
                });
            }
            Err(err) if attempt.fallthrough.allows(err.class) && step < total => {
                tracing::warn!(
                    step,
                    model,
                    class = ?err.class,
                    error = %err,
                    "Attempt failed, moving to next strategy",
                );
                last_error = Some(err);
            }
            Err(err) => {
                tracing::warn!(step, model, class = ?err.class, error = %err, "Invocation failed");
                return Err(err);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| InvocationError::new(FailureClass::Transport, None, UNKNOWN_ERROR)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
