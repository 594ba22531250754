//! Access token check for the chat surface.

use kbsync_core::{AppError, AppResult};

/// Succeeds only when `provided` equals `expected`.
///
/// Comparison time does not depend on where the tokens differ.
pub fn verify_token(expected: &str, provided: Option<&str>) -> AppResult<()> {
    let provided = provided.unwrap_or_default();

    let same_len = expected.len() == provided.len();
    let diff = expected
        .bytes()
        .zip(provided.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));

    if same_len && diff == 0 && !expected.is_empty() {
        Ok(())
    } else {
        Err(AppError::Unauthorized("X-Token header invalid".to_string()))
    }
}
