//! REST client for an OpenAI-compatible `/v1/videos` render relay.
//!
//! Tasks are created with a multipart form so the reference image travels
//! as a binary attachment rather than inline base64.

use base64::Engine;
use serde_json::Value;

use crate::error::RenderError;
use crate::status::task_id_of;

/// Default relay host.
pub const DEFAULT_BASE_URL: &str = "https://api.wfei.site";

/// Clip length used when the duration string has no digits.
pub const DEFAULT_SECONDS: &str = "15";

const DEFAULT_SIZE: &str = "1920x1080";

/// File name of the reference attachment in the multipart form.
const REFERENCE_FILE_NAME: &str = "reference_image.png";

/// One video render submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub model: String,
    pub prompt: String,
    /// Data URI, bare base64 or an `http(s)` URL.
    pub image: Option<String>,
    pub aspect_ratio: String,
    /// Free-form duration such as `"10s"`.
    pub duration: String,
}

/// Output resolution for an aspect ratio.
pub fn size_for_aspect(aspect_ratio: &str) -> &'static str {
    match aspect_ratio.trim() {
        "16:9" => "1920x1080",
        "9:16" => "1080x1920",
        "4:3" => "1440x1080",
        "3:4" => "1080x1440",
        "1:1" => "1024x1024",
        _ => DEFAULT_SIZE,
    }
}

/// The digits of `duration`, or [`DEFAULT_SECONDS`].
pub fn seconds_from_duration(duration: &str) -> String {
    let digits: String = duration.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        DEFAULT_SECONDS.to_string()
    } else {
        digits
    }
}

/// Decode a data URI or bare base64 image payload.
pub fn decode_inline_image(image: &str) -> Result<Vec<u8>, RenderError> {
    let image = image.trim();
    let payload = match image.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| RenderError::InvalidImage("data URI is not base64".into()))?,
        None => image,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| RenderError::InvalidImage(e.to_string()))
}

/// HTTP client for the render relay.
pub struct RenderApi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl RenderApi {
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

    /// Submit a render task and return the vendor task id.
    ///
    /// Sends `POST /v1/videos` as multipart form data. Not retried.
    pub async fn create_task(&self, request: &RenderRequest) -> Result<String, RenderError> {
        let seconds = seconds_from_duration(&request.duration);
        let size = size_for_aspect(&request.aspect_ratio);

        let mut form = reqwest::multipart::Form::new()
            .text("model", request.model.clone())
            .text("prompt", request.prompt.clone())
            .text("seconds", seconds.clone())
            .text("size", size);

        if let Some(image) = request.image.as_deref().filter(|i| !i.trim().is_empty()) {
            let bytes = self.image_bytes(image).await?;
            let part = reqwest::multipart::Part::bytes(bytes)
                .file_name(REFERENCE_FILE_NAME)
                .mime_str("image/png")?;
            form = form.part("input_reference", part);
        }

        tracing::info!(
            model = %request.model,
            seconds = %seconds,
            size,
            with_image = request.image.is_some(),
            "Creating render task",
        );

        let response = self
            .client
            .post(format!("{}/v1/videos", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let body: Value = response.json().await?;

        task_id_of(&body).ok_or_else(|| RenderError::MissingTaskId(body.to_string()))
    }

    /// Sends `GET /v1/videos/{id}` and returns the raw status document.
    pub async fn get_task(&self, task_id: &str) -> Result<Value, RenderError> {
        let response = self
            .client
            .get(format!("{}/v1/videos/{}", self.base_url, task_id))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// Sends `GET /v1/videos/{id}/content`. `None` when the relay has no
    /// content for the task.
    pub async fn fetch_content(&self, task_id: &str) -> Result<Option<Vec<u8>>, RenderError> {
        let response = self
            .client
            .get(format!("{}/v1/videos/{}/content", self.base_url, task_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let bytes = response.bytes().await?;
        Ok((!bytes.is_empty()).then(|| bytes.to_vec()))
    }

    // ---- private helpers ----

    async fn image_bytes(&self, image: &str) -> Result<Vec<u8>, RenderError> {
        if image.starts_with("http://") || image.starts_with("https://") {
            let response = self.client.get(image).send().await?;
            let response = Self::ensure_success(response).await?;
            return Ok(response.bytes().await?.to_vec());
        }
        decode_inline_image(image)
    }

    /// Non-2xx responses become [`RenderError::ApiError`] carrying the
    /// vendor's `error.message` or `message` when the body is JSON.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RenderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(RenderError::ApiError {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }
}

fn error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    json.pointer("/error/message")
        .or_else(|| json.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| json.to_string())
}
