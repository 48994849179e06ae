use std::time::Duration;

use storyreel_render::poller::PollConfig;

use crate::error::ConfigError;

/// Pipeline configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    /// Primary model for text derivation and analysis.
    pub text_model: String,
    pub image_model: String,
    /// Fixed second step of the invocation cascade.
    pub fallback_model: String,
    /// Key and host for non-Google text models (OpenAI-compatible relay).
    pub chat_api_key: String,
    pub chat_base_url: String,
    pub video_api_key: String,
    pub video_base_url: String,
    pub video_model: String,
    pub poll: PollConfig,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl PipelineConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                     | Default                                     |
    /// |-----------------------------|---------------------------------------------|
    /// | `GEMINI_API_KEY`            | required (falls back to `API_KEY`)          |
    /// | `GEMINI_BASE_URL`           | `https://generativelanguage.googleapis.com` |
    /// | `TEXT_MODEL`                | `gemini-2.5-pro`                            |
    /// | `IMAGE_MODEL`               | `gemini-3-pro-image-preview`                |
    /// | `FALLBACK_MODEL`            | `gemini-2.5-flash`                          |
    /// | `CHAT_API_KEY`              | the Gemini key                              |
    /// | `CHAT_BASE_URL`             | `https://api.wfei.site`                     |
    /// | `VIDEO_API_KEY`             | the Gemini key                              |
    /// | `VIDEO_BASE_URL`            | `https://api.wfei.site`                     |
    /// | `VIDEO_MODEL`               | `sora-2`                                    |
    /// | `RENDER_POLL_INTERVAL_SECS` | `5`                                         |
    /// | `RENDER_POLL_MAX_ATTEMPTS`  | `240`                                       |
    /// | `REQUEST_TIMEOUT_SECS`      | `120`                                       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup` instead of the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let or = |var: &str, default: &str| get(var).unwrap_or_else(|| default.to_string());

        let gemini_api_key = get("GEMINI_API_KEY")
            .or_else(|| get("API_KEY"))
            .ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;
        let video_api_key = get("VIDEO_API_KEY").unwrap_or_else(|| gemini_api_key.clone());
        let chat_api_key = get("CHAT_API_KEY").unwrap_or_else(|| gemini_api_key.clone());

        let interval_secs = parse_number(&get, "RENDER_POLL_INTERVAL_SECS", 5)?;
        let max_attempts = parse_number(&get, "RENDER_POLL_MAX_ATTEMPTS", 240)?;
        let timeout_secs = parse_number(&get, "REQUEST_TIMEOUT_SECS", 120)?;

        for (var, value) in [
            ("RENDER_POLL_MAX_ATTEMPTS", max_attempts),
            ("REQUEST_TIMEOUT_SECS", timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    var,
                    value: "0".into(),
                    expected: "a positive integer",
                });
            }
        }

        Ok(Self {
            gemini_api_key,
            gemini_base_url: or("GEMINI_BASE_URL", storyreel_gemini::api::DEFAULT_BASE_URL),
            text_model: or("TEXT_MODEL", "gemini-2.5-pro"),
            image_model: or("IMAGE_MODEL", "gemini-3-pro-image-preview"),
            fallback_model: or("FALLBACK_MODEL", "gemini-2.5-flash"),
            chat_api_key,
            chat_base_url: or("CHAT_BASE_URL", storyreel_gemini::chat::DEFAULT_CHAT_BASE_URL),
            video_api_key,
            video_base_url: or("VIDEO_BASE_URL", storyreel_render::api::DEFAULT_BASE_URL),
            video_model: or("VIDEO_MODEL", "sora-2"),
            poll: PollConfig {
                interval: Duration::from_secs(interval_secs),
                max_attempts: u32::try_from(max_attempts).map_err(|_| ConfigError::Invalid {
                    var: "RENDER_POLL_MAX_ATTEMPTS",
                    value: max_attempts.to_string(),
                    expected: "at most 4294967295",
                })?,
            },
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_number<G>(get: &G, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            var,
            value,
            expected: "a non-negative integer",
        }),
    }
}
