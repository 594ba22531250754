//! Chat command handler.
//!
//! Sends one message through the moderated conversation and prints the
//! response envelope.

use clap::Args;
use kbsync_chat::{
    verify_token, ChatAnswer, ChatReply, Conversation, ConversationOptions, KeywordModerator,
    MemoryStore, Question, ResponseContent,
};
use kbsync_core::{config::AppConfig, AppResult};
use kbsync_prompt::CombineStrategy;
use std::sync::Arc;

/// Ask the knowledge base a question within a session
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Message to send
    pub message: String,

    /// Session id (64 hex characters)
    #[arg(short, long)]
    pub session: String,

    /// Access token, checked against KBSYNC_ACCESS_TOKEN
    #[arg(long, env = "KBSYNC_TOKEN")]
    pub token: Option<String>,

    /// Combine strategy (stuff, map_reduce, refine, map_rerank)
    #[arg(long)]
    pub strategy: Option<CombineStrategy>,

    /// Number of chunks to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Print retrieval details alongside the answer
    #[arg(long)]
    pub details: bool,

    /// Output the response envelope as JSON
    #[arg(long)]
    pub json: bool,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        verify_token(config.require_access_token()?, self.token.as_deref())?;

        let question = Question::new(&self.session, self.message.clone())?;
        tracing::info!("Executing chat command for session {}", question.session_id);

        let mut options = ConversationOptions::from_config(config)?;
        if let Some(strategy) = self.strategy {
            options.strategy = strategy;
        }
        if let Some(top_k) = self.top_k {
            options.top_k = top_k;
        }

        let index = kbsync_content::open_index(config).await?;
        let conversation = Conversation::new(
            kbsync_llm::create_client(&config.llm)?,
            Arc::new(index),
            Arc::new(KeywordModerator::new(&config.chat.blocked_terms)),
            MemoryStore::from_config(&config.chat)?,
            options,
        )?;

        if self.details {
            match conversation.reply(&question).await? {
                ChatReply::Answered(answer) => self.print_answer(&answer)?,
                ChatReply::Refused(response) => self.print_response(&response)?,
            }
            return Ok(());
        }

        let response = conversation.chat_with_moderation(&question).await?;
        self.print_response(&response)?;

        Ok(())
    }

    fn print_answer(&self, answer: &ChatAnswer) -> AppResult<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(answer)?);
        } else {
            println!("{}", answer.answer);
            println!();
            println!("Question: {}", answer.question);
            println!("Sources:  {}", answer.sources.join(", "));
            println!("Tokens:   {}", answer.usage.total_tokens);
        }
        Ok(())
    }

    fn print_response(&self, response: &ResponseContent) -> AppResult<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(response)?);
        } else {
            match &response.message {
                serde_json::Value::String(text) => println!("{}", text),
                other => println!("{}", other),
            }
            if !response.is_success() {
                tracing::warn!("Chat answered with code {}", response.code);
            }
        }
        Ok(())
    }
}
