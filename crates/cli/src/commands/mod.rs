//! Command handlers for the kbsync CLI.

pub mod chat;
pub mod history;
pub mod search;
pub mod status;
pub mod sync;

pub use chat::ChatCommand;
pub use history::HistoryCommand;
pub use search::SearchCommand;
pub use status::StatusCommand;
pub use sync::SyncCommand;
