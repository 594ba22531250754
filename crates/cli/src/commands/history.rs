//! History command handler.

use clap::Args;
use kbsync_chat::{MemoryStore, MessageRole, SessionId};
use kbsync_core::{config::AppConfig, AppResult};

/// Show or clear the conversation memory of a session
#[derive(Args, Debug)]
pub struct HistoryCommand {
    /// Session id (64 hex characters)
    #[arg(short, long)]
    pub session: String,

    /// Delete the session's messages
    #[arg(long)]
    pub clear: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl HistoryCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let session_id = SessionId::parse(&self.session)?;
        tracing::info!("Executing history command for session {}", session_id);

        let memory = MemoryStore::from_config(&config.chat)?.for_session(&session_id)?;

        if self.clear {
            let removed = memory.clear()?;
            println!("Removed {} messages", removed);
            return Ok(());
        }

        let messages = memory.messages()?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&messages)?);
            return Ok(());
        }

        if messages.is_empty() {
            println!("No messages for this session");
        }
        for message in &messages {
            let speaker = match message.role {
                MessageRole::Human => "you",
                MessageRole::Ai => "kbsync",
            };
            println!("{:>6}: {}", speaker, message.content);
        }

        Ok(())
    }
}
