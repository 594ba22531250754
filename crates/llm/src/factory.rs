//! LLM provider factory.

use crate::client::LlmClient;
use crate::providers::{ollama::DEFAULT_BASE_URL, OllamaClient};
use kbsync_core::config::LlmConfig;
use kbsync_core::{AppError, AppResult};
use std::sync::Arc;

/// Create the LLM client named in `config`.
///
/// The Ollama endpoint comes from the config, then `OLLAMA_URL`, then the
/// local default.
pub fn create_client(config: &LlmConfig) -> AppResult<Arc<dyn LlmClient>> {
    match config.provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = config
                .endpoint
                .clone()
                .or_else(|| std::env::var("OLLAMA_URL").ok())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
            tracing::debug!("Using Ollama at {} with model {}", base_url, config.model);
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        other => Err(AppError::Config(format!(
            "Unknown LLM provider: {}. Supported: ollama",
            other
        ))),
    }
}
