//! REST client for the native Gemini `generateContent` endpoint.
//!
//! Calls `POST {base}/v1beta/models/{model}:generateContent` with inline
//! base64 parts using [`reqwest`]. The key travels in the `x-goog-api-key`
//! header, never in the URL. Relay services that mirror the Google route
//! work through [`GeminiApi::new`]'s `base_url`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storyreel_core::failure::{self, FailureClass};

use crate::parts::{ContentPart, InlineData};

/// Default host for the public Gemini API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const API_KEY_HEADER: &str = "x-goog-api-key";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the Gemini REST layer.
#[derive(Debug, thiserror::Error)]
pub enum GeminiApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.). The URL
    /// is stripped before the error is stored.
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    /// The request or an attachment was rejected by a safety filter.
    #[error("Safety/Block error ({status}): {body}")]
    Blocked { status: u16, body: String },

    /// Gemini returned a non-2xx status code.
    #[error("Gemini API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("No candidates returned from API")]
    NoCandidates,

    /// An image model answered with text only.
    #[error("Model returned text instead of image: {0}")]
    TextInsteadOfImage(String),

    #[error("No image data found in response")]
    NoImage,
}

impl From<reqwest::Error> for GeminiApiError {
    fn from(e: reqwest::Error) -> Self {
        GeminiApiError::Request(e.without_url())
    }
}

impl GeminiApiError {
    /// HTTP status of the failed call, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            GeminiApiError::Request(e) => e.status().map(|s| s.as_u16()),
            GeminiApiError::Blocked { status, .. } | GeminiApiError::ApiError { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn failure_class(&self) -> FailureClass {
        match self {
            GeminiApiError::Request(e) if e.status().is_none() => FailureClass::Transport,
            other => failure::classify(other.status(), &other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

/// Which safety settings to send with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyPolicy {
    /// Send no settings; the model's defaults apply.
    #[default]
    Default,
    /// Lower every harm category threshold to `BLOCK_NONE`.
    BlockNone,
}

impl SafetyPolicy {
    fn settings(self) -> Vec<SafetySetting> {
        match self {
            SafetyPolicy::Default => Vec::new(),
            SafetyPolicy::BlockNone => HARM_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: serde_json::Value,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: &'a [ContentPart],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// GeminiApi
// ---------------------------------------------------------------------------

/// HTTP client for the Gemini `generateContent` endpoint.
pub struct GeminiApi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiApi {
    /// * `base_url` - Host root, e.g. `https://generativelanguage.googleapis.com`.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_key, base_url)
    }

    /// Reuse an existing [`reqwest::Client`] (shared pool, custom timeout).
    pub fn with_client(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        Self {
            client,
            api_key: api_key.into(),
            base_url,
        }
    }

    /// Run a text generation and join the first candidate's text parts.
    pub async fn generate_text(
        &self,
        model: &str,
        parts: &[ContentPart],
        safety: SafetyPolicy,
    ) -> Result<String, GeminiApiError> {
        let response = self
            .generate_content(model, parts, serde_json::json!({}), safety)
            .await?;
        let candidate = first_candidate(response)?;

        Ok(candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }

    /// Generate an image and return it as a `data:` URI.
    ///
    /// `image_size` (`1K`/`2K`/`4K`) is only sent to `gemini-3` image
    /// models; older image models reject the field.
    pub async fn generate_image(
        &self,
        model: &str,
        parts: &[ContentPart],
        aspect_ratio: &str,
        image_size: &str,
    ) -> Result<String, GeminiApiError> {
        let mut image_config = serde_json::json!({ "aspectRatio": aspect_ratio });
        if model.contains("gemini-3") {
            image_config["imageSize"] = serde_json::json!(image_size);
        }
        let generation_config = serde_json::json!({
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": image_config,
        });

        let response = self
            .generate_content(model, parts, generation_config, SafetyPolicy::Default)
            .await?;
        let candidate = first_candidate(response)?;
        let content_parts = candidate.content.map(|c| c.parts).unwrap_or_default();

        if let Some(data) = content_parts
            .iter()
            .filter_map(|p| p.inline_data.as_ref())
            .find(|d| !d.data.is_empty())
        {
            return Ok(data.to_data_uri());
        }

        match content_parts.into_iter().find_map(|p| p.text) {
            Some(text) => Err(GeminiApiError::TextInsteadOfImage(text)),
            None => Err(GeminiApiError::NoImage),
        }
    }

    // ---- private helpers ----

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    async fn generate_content(
        &self,
        model: &str,
        parts: &[ContentPart],
        generation_config: serde_json::Value,
        safety: SafetyPolicy,
    ) -> Result<GenerateContentResponse, GeminiApiError> {
        let body = GenerateContentRequest {
            contents: [RequestContent {
                role: "user",
                parts,
            }],
            generation_config,
            safety_settings: safety.settings(),
        };

        tracing::debug!(
            model,
            parts = parts.len(),
            images = parts.iter().filter(|p| p.is_image()).count(),
            "Calling generateContent",
        );

        let response = self
            .client
            .post(self.endpoint(model))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.json::<GenerateContentResponse>().await?)
    }

    /// Map non-2xx responses to [`GeminiApiError`], separating safety
    /// rejections from other API errors.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GeminiApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let status = status.as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        if is_blocked(status, &body) {
            Err(GeminiApiError::Blocked { status, body })
        } else {
            Err(GeminiApiError::ApiError { status, body })
        }
    }
}

/// Anything that can turn parts into an image `data:` URI.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(
        &self,
        model: &str,
        parts: &[ContentPart],
        aspect_ratio: &str,
        image_size: &str,
    ) -> Result<String, GeminiApiError>;
}

#[async_trait]
impl ImageGenerator for GeminiApi {
    async fn generate_image(
        &self,
        model: &str,
        parts: &[ContentPart],
        aspect_ratio: &str,
        image_size: &str,
    ) -> Result<String, GeminiApiError> {
        GeminiApi::generate_image(self, model, parts, aspect_ratio, image_size).await
    }
}

fn is_blocked(status: u16, body: &str) -> bool {
    status == 400
        || ["SAFETY", "blockReason", "PROHIBITED_CONTENT"]
            .iter()
            .any(|m| body.contains(m))
}

/// The first candidate, or a safety error when the prompt itself was
/// blocked and no candidate came back.
fn first_candidate(response: GenerateContentResponse) -> Result<Candidate, GeminiApiError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        if response.candidates.is_empty() {
            return Err(GeminiApiError::Blocked {
                status: 200,
                body: format!("blockReason: {reason}"),
            });
        }
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(GeminiApiError::NoCandidates)?;

    let empty = candidate
        .content
        .as_ref()
        .map_or(true, |c| c.parts.is_empty());
    match candidate.finish_reason.as_deref() {
        Some(reason @ ("SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST")) if empty => {
            Err(GeminiApiError::Blocked {
                status: 200,
                body: format!("finishReason: {reason}"),
            })
        }
        _ => Ok(candidate),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
