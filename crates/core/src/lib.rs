//! kbsync Core Library
//!
//! This crate provides the foundational utilities shared by every kbsync crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, RemovedDocumentPolicy};
pub use error::{AppError, AppResult};
