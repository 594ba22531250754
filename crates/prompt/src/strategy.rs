//! Answer-combination strategies.

use kbsync_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How retrieved chunks are combined into one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineStrategy {
    /// All chunks in one prompt.
    #[default]
    Stuff,
    /// Extract relevant text per chunk, then answer from the extracts.
    MapReduce,
    /// Answer from the first chunk, then refine with each following chunk.
    Refine,
    /// Answer per chunk with a confidence score and keep the best.
    MapRerank,
}

impl CombineStrategy {
    pub const ALL: [CombineStrategy; 4] = [
        CombineStrategy::Stuff,
        CombineStrategy::MapReduce,
        CombineStrategy::Refine,
        CombineStrategy::MapRerank,
    ];

    pub fn parse(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "stuff" => Ok(Self::Stuff),
            "map_reduce" => Ok(Self::MapReduce),
            "refine" => Ok(Self::Refine),
            "map_rerank" => Ok(Self::MapRerank),
            other => Err(AppError::Config(format!(
                "Unknown combine strategy: {}. Supported: stuff, map_reduce, refine, map_rerank",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stuff => "stuff",
            Self::MapReduce => "map_reduce",
            Self::Refine => "refine",
            Self::MapRerank => "map_rerank",
        }
    }

    /// Number of LLM calls needed to combine `chunks` chunks.
    pub fn llm_calls(&self, chunks: usize) -> usize {
        match self {
            Self::Stuff => 1,
            Self::MapReduce => chunks + 1,
            Self::Refine | Self::MapRerank => chunks.max(1),
        }
    }
}

impl fmt::Display for CombineStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CombineStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
