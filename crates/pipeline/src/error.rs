use storyreel_core::error::CoreError;
use storyreel_core::failure::FailureClass;
use storyreel_gemini::api::GeminiApiError;
use storyreel_gemini::cascade::InvocationError;
use storyreel_render::error::RenderError;

/// Invalid or missing environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Errors from a generation run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Gemini(#[from] GeminiApiError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// The model answered, but not in the shape the call needs.
    #[error("Invalid format from model: {0}")]
    InvalidResponse(String),

    /// A job result could not be serialized.
    #[error("Failed to encode result: {0}")]
    Encode(String),

    #[error("Generation cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            PipelineError::Invocation(e) => e.class,
            PipelineError::Gemini(e) => e.failure_class(),
            PipelineError::Render(e) => e.failure_class(),
            PipelineError::Cancelled => FailureClass::Cancelled,
            PipelineError::Config(_)
            | PipelineError::Core(_)
            | PipelineError::InvalidResponse(_)
            | PipelineError::Encode(_) => FailureClass::Transport,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.failure_class() == FailureClass::Cancelled
    }
}
