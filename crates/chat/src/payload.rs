//! Chat request and response payloads.

use crate::session::SessionId;
use kbsync_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// An incoming chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub session_id: SessionId,
    pub message: String,
}

impl Question {
    pub fn new(session_id: &str, message: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            session_id: SessionId::parse(session_id)?,
            message: message.into(),
        })
    }

    /// Parse and validate a JSON request body.
    pub fn from_json(body: &str) -> AppResult<Self> {
        serde_json::from_str(body)
            .map_err(|e| AppError::InvalidSession(format!("Invalid chat request: {}", e)))
    }
}

/// The outgoing envelope. Code 0 means success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseContent {
    #[serde(default)]
    pub code: i32,

    #[serde(default)]
    pub message: serde_json::Value,
}

impl ResponseContent {
    pub fn ok(message: serde_json::Value) -> Self {
        Self { code: 0, message }
    }

    /// Envelope for errors that are answered rather than raised.
    ///
    /// Returns `None` for genuine faults.
    pub fn from_error(error: &AppError) -> Option<Self> {
        error.response_code().map(|code| Self {
            code,
            message: serde_json::Value::String(error.to_string()),
        })
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}
