//! Per-session conversational memory in SQLite.
//!
//! Every message is one row keyed by session id and stored as JSON. Rows are
//! read back in insertion order.

use crate::session::SessionId;
use kbsync_core::config::ChatConfig;
use kbsync_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Who said a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Human,
    Ai,
}

/// One stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Ai,
            content: content.into(),
        }
    }
}

/// Render messages as a plain transcript for prompts.
pub fn format_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| match m.role {
            MessageRole::Human => format!("Human: {}", m.content),
            MessageRole::Ai => format!("Assistant: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Location of the memory database. Opens one connection per session.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    db_file: PathBuf,
    table: String,
}

impl MemoryStore {
    pub fn new(db_file: impl Into<PathBuf>, table: impl Into<String>) -> AppResult<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            db_file: db_file.into(),
            table,
        })
    }

    pub fn from_config(config: &ChatConfig) -> AppResult<Self> {
        Self::new(&config.memory_db, config.memory_table.clone())
    }

    pub fn for_session(&self, session_id: &SessionId) -> AppResult<SessionMemory> {
        SessionMemory::open(&self.db_file, &self.table, session_id.clone())
    }
}

/// Message log of one session.
pub struct SessionMemory {
    conn: Connection,
    table: String,
    session_id: SessionId,
}

impl SessionMemory {
    pub fn open(db_file: &Path, table: &str, session_id: SessionId) -> AppResult<Self> {
        validate_table_name(table)?;

        if let Some(parent) = db_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Memory(format!("Failed to create memory directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(db_file)
            .map_err(|e| AppError::Memory(format!("Failed to open memory store: {}", e)))?;

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                message TEXT,
                updated_time TEXT DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_session ON {table}(session_id);",
            table = table
        ))
        .map_err(|e| AppError::Memory(format!("Failed to create memory table: {}", e)))?;

        Ok(Self {
            conn,
            table: table.to_string(),
            session_id,
        })
    }

    pub fn add_message(&self, message: &ChatMessage) -> AppResult<()> {
        let json = serde_json::to_string(message)?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} (session_id, message) VALUES (?1, ?2)",
                    self.table
                ),
                params![self.session_id.as_str(), json],
            )
            .map_err(|e| AppError::Memory(format!("Failed to store message: {}", e)))?;
        Ok(())
    }

    /// Store a question and its answer.
    pub fn add_exchange(&self, question: &str, answer: &str) -> AppResult<()> {
        self.add_message(&ChatMessage::human(question))?;
        self.add_message(&ChatMessage::ai(answer))
    }

    /// Every message of the session, oldest first.
    pub fn messages(&self) -> AppResult<Vec<ChatMessage>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT message FROM {} WHERE session_id = ?1 ORDER BY id",
                self.table
            ))
            .map_err(|e| AppError::Memory(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![self.session_id.as_str()], |row| {
                row.get::<_, Option<String>>(0)
            })
            .map_err(|e| AppError::Memory(format!("Failed to read messages: {}", e)))?;

        let mut messages = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| AppError::Memory(format!("Failed to read message: {}", e)))?;
            if let Some(raw) = raw {
                messages.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(messages)
    }

    /// The last `k` exchanges (up to `2k` messages), oldest first.
    pub fn window(&self, k: usize) -> AppResult<Vec<ChatMessage>> {
        let mut messages = self.messages()?;
        let keep = k.saturating_mul(2);
        if messages.len() > keep {
            messages.drain(..messages.len() - keep);
        }
        Ok(messages)
    }

    /// Delete every message of the session.
    pub fn clear(&self) -> AppResult<usize> {
        self.conn
            .execute(
                &format!("DELETE FROM {} WHERE session_id = ?1", self.table),
                params![self.session_id.as_str()],
            )
            .map_err(|e| AppError::Memory(format!("Failed to clear session: {}", e)))
    }
}

fn validate_table_name(table: &str) -> AppResult<()> {
    let mut chars = table.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(AppError::Config(format!("Invalid memory table name: {:?}", table)))
    }
}
