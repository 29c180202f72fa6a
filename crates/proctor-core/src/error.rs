//! Error types shared across the proctor crates.
//!
//! `ProviderError` is defined here rather than in `proctor-providers` so the
//! exam runner can downcast and classify inference failures for retry
//! decisions without string matching.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration and per-row failures raised by the core exam machinery.
///
/// The first two variants are fatal and occur before any row is processed;
/// the remaining variants affect a single row.
#[derive(Debug, Error)]
pub enum ExamError {
    /// No registered provider lists the requested model.
    #[error("model '{0}' is not supported by any registered provider")]
    UnsupportedModel(String),

    /// The provider's API key environment variable is unset or empty.
    #[error("no API key found for provider '{provider}': set the {env_var} environment variable")]
    MissingApiKey { provider: String, env_var: String },

    /// A referenced image file could not be read or encoded.
    #[error("failed to read image '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row was handed to the grader phase without a recorded student answer.
    #[error("question {0} has no recorded student response to grade")]
    MissingStudentResponse(i64),
}

/// Errors that can occur during a blocking inference call to a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}
