//! Prompt system for kbsync conversations.
//!
//! Provides:
//! - The closed set of answer-combination strategies
//! - Handlebars templates for condensing questions and answering from context
//! - Parsing of scored answers produced by the map-rerank strategy

pub mod builder;
pub mod strategy;
pub mod templates;

pub use builder::{parse_scored_answer, PromptBuilder, RenderedPrompt, ScoredAnswer};
pub use strategy::CombineStrategy;
