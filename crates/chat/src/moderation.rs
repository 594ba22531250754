//! Input moderation.

use kbsync_core::{AppError, AppResult};

/// Message returned to callers when moderation flags their input.
pub const POLICY_VIOLATION_MESSAGE: &str = "Text was found that violates our content policy.";

/// Outcome of a moderation check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationResult {
    pub flagged: bool,

    /// What matched, for logging
    pub matches: Vec<String>,
}

/// Decides whether text may enter a conversation.
#[async_trait::async_trait]
pub trait Moderator: Send + Sync {
    async fn check(&self, text: &str) -> AppResult<ModerationResult>;

    /// Return `text` unchanged, or a policy violation when it is flagged.
    async fn moderate(&self, text: &str) -> AppResult<String> {
        let result = self.check(text).await?;
        if result.flagged {
            tracing::warn!("Moderation flagged input: {:?}", result.matches);
            return Err(AppError::PolicyViolation(POLICY_VIOLATION_MESSAGE.to_string()));
        }
        Ok(text.to_string())
    }
}

/// Flags text containing any configured term as a whole word, ignoring case.
#[derive(Debug, Clone, Default)]
pub struct KeywordModerator {
    terms: Vec<String>,
}

impl KeywordModerator {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl Moderator for KeywordModerator {
    async fn check(&self, text: &str) -> AppResult<ModerationResult> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();

        let matches: Vec<String> = self
            .terms
            .iter()
            .filter(|term| {
                if term.contains(char::is_whitespace) {
                    lower.contains(term.as_str())
                } else {
                    words.contains(&term.as_str())
                }
            })
            .cloned()
            .collect();

        Ok(ModerationResult {
            flagged: !matches.is_empty(),
            matches,
        })
    }
}
