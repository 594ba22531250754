//! Prompt builder for rendering conversation templates.

use crate::templates;
use handlebars::Handlebars;
use kbsync_core::{AppError, AppResult};
use serde::Serialize;
use serde_json::json;

const CONDENSE: &str = "condense";
const STUFF: &str = "stuff";
const MAP_QUESTION: &str = "map_question";
const MAP_COMBINE: &str = "map_combine";
const REFINE_QUESTION: &str = "refine_question";
const REFINE_STEP: &str = "refine_step";
const MAP_RERANK: &str = "map_rerank";

/// A rendered prompt ready for the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPrompt {
    pub system: Option<String>,
    pub user: String,
}

/// An answer with the model's self-reported confidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredAnswer {
    pub answer: String,
    pub score: u32,
}

/// Renders every conversation template from one registry.
pub struct PromptBuilder {
    registry: Handlebars<'static>,
}

impl PromptBuilder {
    pub fn new() -> AppResult<Self> {
        let mut registry = Handlebars::new();

        // Plain text, not HTML
        registry.register_escape_fn(handlebars::no_escape);

        for (name, template) in [
            (CONDENSE, templates::CONDENSE_QUESTION),
            (STUFF, templates::STUFF),
            (MAP_QUESTION, templates::MAP_QUESTION),
            (MAP_COMBINE, templates::MAP_COMBINE),
            (REFINE_QUESTION, templates::REFINE_QUESTION),
            (REFINE_STEP, templates::REFINE_STEP),
            (MAP_RERANK, templates::MAP_RERANK),
        ] {
            registry.register_template_string(name, template).map_err(|e| {
                AppError::Prompt(format!("Failed to register template '{}': {}", name, e))
            })?;
        }

        Ok(Self { registry })
    }

    fn render(&self, name: &str, data: &serde_json::Value) -> AppResult<String> {
        tracing::trace!("Rendering prompt template '{}'", name);
        self.registry
            .render(name, data)
            .map_err(|e| AppError::Prompt(format!("Failed to render template '{}': {}", name, e)))
    }

    /// Prompt that turns a follow-up into a standalone question.
    pub fn condense(&self, history: &str, question: &str) -> AppResult<String> {
        self.render(CONDENSE, &json!({ "history": history, "question": question }))
    }

    pub fn stuff(&self, context: &str, question: &str) -> AppResult<RenderedPrompt> {
        Ok(RenderedPrompt {
            system: Some(self.render(STUFF, &json!({ "context": context }))?),
            user: question.to_string(),
        })
    }

    pub fn map_question(&self, chunk: &str, question: &str) -> AppResult<RenderedPrompt> {
        Ok(RenderedPrompt {
            system: Some(self.render(MAP_QUESTION, &json!({ "context": chunk }))?),
            user: question.to_string(),
        })
    }

    pub fn map_combine(&self, summaries: &str, question: &str) -> AppResult<RenderedPrompt> {
        Ok(RenderedPrompt {
            system: Some(self.render(MAP_COMBINE, &json!({ "summaries": summaries }))?),
            user: question.to_string(),
        })
    }

    pub fn refine_question(&self, chunk: &str, question: &str) -> AppResult<RenderedPrompt> {
        Ok(RenderedPrompt {
            system: Some(self.render(REFINE_QUESTION, &json!({ "context": chunk }))?),
            user: question.to_string(),
        })
    }

    pub fn refine_step(
        &self,
        question: &str,
        existing_answer: &str,
        chunk: &str,
    ) -> AppResult<RenderedPrompt> {
        let user = self.render(
            REFINE_STEP,
            &json!({
                "question": question,
                "existing_answer": existing_answer,
                "context": chunk,
            }),
        )?;
        Ok(RenderedPrompt { system: None, user })
    }

    pub fn map_rerank(&self, chunk: &str, question: &str) -> AppResult<RenderedPrompt> {
        let user = self.render(MAP_RERANK, &json!({ "context": chunk, "question": question }))?;
        Ok(RenderedPrompt { system: None, user })
    }
}

/// Split a map-rerank completion into answer and score.
///
/// Expects the answer followed by a `Score: N` line. Returns `None` when no
/// score is present.
pub fn parse_scored_answer(text: &str) -> Option<ScoredAnswer> {
    let (answer, score_part) = text.rsplit_once("Score:")?;
    let digits: String = score_part
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let score = digits.parse::<u32>().ok()?.min(100);

    let answer = answer.trim();
    let answer = answer
        .strip_prefix("Helpful Answer:")
        .unwrap_or(answer)
        .trim();

    Some(ScoredAnswer {
        answer: answer.to_string(),
        score,
    })
}
