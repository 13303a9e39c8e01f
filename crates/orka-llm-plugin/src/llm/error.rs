//! LLM error types.

use thiserror::Error;

/// Errors that can occur when making LLM API calls.
#[derive(Debug, Error)]
pub enum LLMError {
    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body was not the expected shape
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Another error with caller-supplied context in front of it
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<LLMError>,
    },
}

impl LLMError {
    /// Wrap this error with additional context, keeping it as the source.
    pub fn context(self, context: impl Into<String>) -> Self {
        LLMError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether a fresh attempt may succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        match self {
            LLMError::Request(e) => e.is_timeout() || e.is_connect(),
            LLMError::Api { status, .. } => {
                matches!(status, 408 | 409 | 429) || (500..600).contains(status)
            }
            LLMError::Decode(_) => false,
            LLMError::Context { source, .. } => source.is_transient(),
        }
    }
}
