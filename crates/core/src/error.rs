//! Error types for kbsync.
//!
//! This module defines a unified error enum that covers all error categories
//! in the workspace: configuration, I/O, document parsing, the embedding
//! record, the vector index, providers, and the chat surface.

use thiserror::Error;

/// Response code carried by a chat payload when moderation flags the input.
pub const POLICY_VIOLATION_CODE: i32 = 10001;

/// Unified error type for kbsync.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed front matter or a missing required metadata field
    #[error("Front matter error: {0}")]
    FrontMatter(String),

    /// Embedding record file is unreadable or corrupt
    #[error("Record error: {0}")]
    Record(String),

    /// Vector index backend errors
    #[error("Index error: {0}")]
    Index(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Prompt rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Conversational memory errors
    #[error("Memory error: {0}")]
    Memory(String),

    /// Content was flagged by moderation. Not a system fault.
    #[error("{0}")]
    PolicyViolation(String),

    /// Access token did not match
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Session identifier has the wrong format
    #[error("Invalid session id: {0}")]
    InvalidSession(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Response code for errors that are delivered as a normal payload.
    ///
    /// Returns `None` for genuine faults.
    pub fn response_code(&self) -> Option<i32> {
        match self {
            AppError::PolicyViolation(_) => Some(POLICY_VIOLATION_CODE),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_violation_code() {
        let err = AppError::PolicyViolation("flagged".to_string());
        assert_eq!(err.response_code(), Some(POLICY_VIOLATION_CODE));
        assert_eq!(err.to_string(), "flagged");
    }

    #[test]
    fn test_faults_have_no_response_code() {
        assert_eq!(AppError::Index("down".to_string()).response_code(), None);
        assert_eq!(AppError::Config("missing".to_string()).response_code(), None);
    }
}
