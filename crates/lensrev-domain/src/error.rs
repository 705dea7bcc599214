//! The `{code, message}` error shape shared by model clients, lens outcomes,
//! and the overall review result.

use serde::{Deserialize, Serialize};

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The diff contained no files; the run never starts.
    NoDiff,
    /// None of the requested lenses is known.
    NoLenses,
    NetworkError,
    RateLimited,
    InvalidApiKey,
    /// The model failed or returned output that does not match the expected shape.
    ModelError,
    /// The lens was never claimed because the run was cancelled.
    NotStarted,
    /// A worker failed outside the typed error path (e.g. it panicked).
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoDiff => "NO_DIFF",
            ErrorCode::NoLenses => "NO_LENSES",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::InvalidApiKey => "INVALID_API_KEY",
            ErrorCode::ModelError => "MODEL_ERROR",
            ErrorCode::NotStarted => "NOT_STARTED",
            ErrorCode::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified review failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ReviewError {
    pub code: ErrorCode,
    pub message: String,
}

impl ReviewError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn no_diff() -> Self {
        Self::new(ErrorCode::NoDiff, "no files to review")
    }

    pub fn no_lenses(requested: &[String]) -> Self {
        Self::new(
            ErrorCode::NoLenses,
            format!("none of the requested lenses is known: {}", requested.join(", ")),
        )
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimited, message)
    }

    pub fn invalid_api_key(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidApiKey, message)
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ModelError, message)
    }

    pub fn not_started() -> Self {
        Self::new(
            ErrorCode::NotStarted,
            "lens was not started because the run was cancelled",
        )
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, message)
    }
}

impl From<serde_json::Error> for ReviewError {
    fn from(err: serde_json::Error) -> Self {
        ReviewError::model(format!("malformed structured output: {err}"))
    }
}

/// Result type for review operations.
pub type Result<T> = std::result::Result<T, ReviewError>;
