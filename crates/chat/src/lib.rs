//! Conversational access to the knowledge base.
//!
//! Validates chat requests, moderates input, keeps per-session memory and
//! answers questions from chunks retrieved out of the vector index.

pub mod auth;
pub mod conversation;
pub mod memory;
pub mod moderation;
pub mod payload;
pub mod session;

pub use auth::verify_token;
pub use conversation::{ChatAnswer, ChatReply, Conversation, ConversationOptions};
pub use memory::{ChatMessage, MemoryStore, MessageRole, SessionMemory};
pub use moderation::{KeywordModerator, ModerationResult, Moderator, POLICY_VIOLATION_MESSAGE};
pub use payload::{Question, ResponseContent};
pub use session::SessionId;
