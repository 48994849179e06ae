//! OpenAI-compatible `/v1/chat/completions` client for non-Google text
//! models, and the router that picks a backend by model name.
//!
//! Chat relays take text only. Image parts are dropped with a warning and
//! the remaining text parts are joined into one user message.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storyreel_core::failure::{self, FailureClass};

use crate::api::SafetyPolicy;
use crate::cascade::{ContentGenerator, InvocationError};
use crate::parts::ContentPart;

/// Default relay host for chat models.
pub const DEFAULT_CHAT_BASE_URL: &str = "https://api.wfei.site";

/// System message sent with every chat completion.
const SYSTEM_PROMPT: &str = "You are a storyboard assistant. Follow the user's instructions exactly.";

/// Model name prefixes served by the native Google endpoint.
const GOOGLE_MODEL_PREFIXES: [&str; 3] = ["gemini", "veo", "imagen"];

/// Whether `model` is served by the native Google endpoint.
pub fn is_google_model(model: &str) -> bool {
    let model = model.trim().to_lowercase();
    GOOGLE_MODEL_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the chat completions layer.
#[derive(Debug, thiserror::Error)]
pub enum ChatApiError {
    /// The HTTP request itself failed. The URL is stripped before storing.
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    /// The relay returned a non-2xx status code.
    #[error("OpenAI API Error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("No choices returned from API")]
    NoChoices,
}

impl From<reqwest::Error> for ChatApiError {
    fn from(e: reqwest::Error) -> Self {
        ChatApiError::Request(e.without_url())
    }
}

impl ChatApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ChatApiError::Request(e) => e.status().map(|s| s.as_u16()),
            ChatApiError::ApiError { status, .. } => Some(*status),
            ChatApiError::NoChoices => None,
        }
    }

    pub fn failure_class(&self) -> FailureClass {
        match self {
            ChatApiError::Request(e) if e.status().is_none() => FailureClass::Transport,
            ChatApiError::NoChoices => FailureClass::Transport,
            other => failure::classify(other.status(), &other.to_string()),
        }
    }
}

impl From<ChatApiError> for InvocationError {
    fn from(err: ChatApiError) -> Self {
        InvocationError::new(err.failure_class(), err.status(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// ChatApi
// ---------------------------------------------------------------------------

/// HTTP client for an OpenAI-compatible chat completions relay.
pub struct ChatApi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ChatApi {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_key, base_url)
    }

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

    /// Run one completion and return the first choice's content.
    ///
    /// `json_mode` asks the relay for a `json_object` response.
    pub async fn complete(
        &self,
        model: &str,
        user_prompt: &str,
        json_mode: bool,
    ) -> Result<String, ChatApiError> {
        let body = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        tracing::debug!(model, json_mode, chars = user_prompt.len(), "Calling chat completions");

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let parsed: ChatResponse = response.json().await?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or(ChatApiError::NoChoices)
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ChatApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string()
            });
        Err(ChatApiError::ApiError {
            status: status.as_u16(),
            message,
        })
    }
}

/// Join the text parts into one prompt. Images cannot be sent to chat
/// relays and are dropped.
fn user_prompt(model: &str, parts: &[ContentPart]) -> String {
    let images = parts.iter().filter(|p| p.is_image()).count();
    if images > 0 {
        tracing::warn!(model, images, "Chat models take text only, dropping image parts");
    }
    parts
        .iter()
        .filter_map(ContentPart::as_text)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl ContentGenerator for ChatApi {
    /// Safety settings are a Gemini concept and are ignored here.
    async fn generate(
        &self,
        model: &str,
        parts: &[ContentPart],
        _safety: SafetyPolicy,
    ) -> Result<String, InvocationError> {
        Ok(self.complete(model, &user_prompt(model, parts), false).await?)
    }

    async fn generate_json(
        &self,
        model: &str,
        parts: &[ContentPart],
        _safety: SafetyPolicy,
    ) -> Result<String, InvocationError> {
        Ok(self.complete(model, &user_prompt(model, parts), true).await?)
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Sends Google models to the native endpoint and everything else to the
/// chat relay.
pub struct ModelRouter {
    google: Arc<dyn ContentGenerator>,
    chat: Arc<dyn ContentGenerator>,
}

impl ModelRouter {
    pub fn new(google: Arc<dyn ContentGenerator>, chat: Arc<dyn ContentGenerator>) -> Self {
        Self { google, chat }
    }

    fn backend(&self, model: &str) -> &dyn ContentGenerator {
        if is_google_model(model) {
            self.google.as_ref()
        } else {
            self.chat.as_ref()
        }
    }
}

#[async_trait]
impl ContentGenerator for ModelRouter {
    async fn generate(
        &self,
        model: &str,
        parts: &[ContentPart],
        safety: SafetyPolicy,
    ) -> Result<String, InvocationError> {
        self.backend(model).generate(model, parts, safety).await
    }

    async fn generate_json(
        &self,
        model: &str,
        parts: &[ContentPart],
        safety: SafetyPolicy,
    ) -> Result<String, InvocationError> {
        self.backend(model).generate_json(model, parts, safety).await
    }
}
