use storyreel_core::failure::{self, FailureClass};

/// Errors from render submission and polling.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.). The URL
    /// is stripped since signed reference URLs carry tokens.
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    /// The render service returned a non-2xx status code.
    #[error("Video API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// The reference image could not be turned into bytes.
    #[error("Invalid reference image: {0}")]
    InvalidImage(String),

    /// Task creation succeeded but the response carried no id.
    #[error("No task ID returned: {0}")]
    MissingTaskId(String),

    /// The remote task reported failure.
    #[error("Task failed: {0}")]
    RemoteFailed(String),

    /// The poll ceiling was reached.
    #[error("Video generation timed out after {attempts} polls")]
    Timeout { attempts: u32 },

    /// The task succeeded but no result could be located.
    #[error("Video {0} completed but no result URL or content was found")]
    ResultUnresolvable(String),

    #[error("Video generation cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for RenderError {
    fn from(e: reqwest::Error) -> Self {
        RenderError::Request(e.without_url())
    }
}

impl RenderError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            RenderError::Request(_) | RenderError::InvalidImage(_) | RenderError::MissingTaskId(_) => {
                FailureClass::Transport
            }
            RenderError::ApiError { status, message } => failure::classify(Some(*status), message),
            RenderError::RemoteFailed(_) => FailureClass::RemoteJobFailed,
            RenderError::Timeout { .. } => FailureClass::Timeout,
            RenderError::ResultUnresolvable(_) => FailureClass::ResultUnresolvable,
            RenderError::Cancelled => FailureClass::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poller_failures_have_distinct_classes() {
        assert_eq!(
            RenderError::RemoteFailed("x".into()).failure_class(),
            FailureClass::RemoteJobFailed
        );
        assert_eq!(
            RenderError::Timeout { attempts: 240 }.failure_class(),
            FailureClass::Timeout
        );
        assert_eq!(
            RenderError::ResultUnresolvable("t".into()).failure_class(),
            FailureClass::ResultUnresolvable
        );
        assert_eq!(RenderError::Cancelled.failure_class(), FailureClass::Cancelled);
    }

    #[test]
    fn submission_status_is_classified() {
        let err = RenderError::ApiError {
            status: 401,
            message: "invalid token".into(),
        };
        assert_eq!(err.failure_class(), FailureClass::Authentication);
    }
}
