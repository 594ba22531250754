//! Session identifiers.

use kbsync_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a session id in hex characters.
pub const SESSION_ID_LEN: usize = 64;

/// A 64-character hexadecimal session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(value: &str) -> AppResult<Self> {
        if value.len() == SESSION_ID_LEN && value.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(value.to_string()))
        } else {
            Err(AppError::InvalidSession(format!(
                "{} does not match the required session-id format",
                value
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}
