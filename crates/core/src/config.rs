//! Configuration management for kbsync.
//!
//! Configuration is assembled once at startup and passed by reference into
//! every component. Sources, lowest precedence first:
//! - Built-in defaults
//! - YAML config file (`kbsync.yaml`, or the path in `KBSYNC_CONFIG`)
//! - Environment variables (`KBSYNC_*`)
//! - Command-line flags (`with_overrides`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "kbsync.yaml";

/// Embedding providers the content crate knows how to build.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["trigram", "ollama"];

/// LLM providers the llm crate knows how to build.
pub const KNOWN_LLM_PROVIDERS: [&str; 1] = ["ollama"];

/// What a reconciliation pass does with records whose source file is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovedDocumentPolicy {
    /// Delete the document's chunks from the index and drop the record.
    #[default]
    Purge,
    /// Drop the record but leave the chunks in the index.
    Retain,
}

impl RemovedDocumentPolicy {
    /// Parse a policy name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "purge" => Some(Self::Purge),
            "retain" => Some(Self::Retain),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purge => "purge",
            Self::Retain => "retain",
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Config file that was merged, if any
    pub config_file: Option<PathBuf>,

    /// Document tree, record file and index settings
    pub content: ContentConfig,

    /// Embedding provider used by the index
    pub embedding: EmbeddingConfig,

    /// LLM used by the chat surface
    pub llm: LlmConfig,

    /// Conversation settings
    pub chat: ChatConfig,

    /// Access token required by the chat surface
    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub log_json: bool,
}

/// Settings for the document tree and the index built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentConfig {
    /// Root directory holding the source documents
    pub content_dir: PathBuf,

    /// Record file name, stored inside `content_dir`
    pub record_file: String,

    /// SQLite file backing the vector index
    pub index_path: PathBuf,

    /// Collection name inside the index
    pub collection: String,

    /// Maximum chunk size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,

    /// File extensions treated as documents
    pub extensions: Vec<String>,

    /// Handling of records whose file disappeared
    pub removed_documents: RemovedDocumentPolicy,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("./original_content/"),
            record_file: "embedding.json".to_string(),
            index_path: PathBuf::from("./vectorstore/index.sqlite"),
            collection: "kbsync".to_string(),
            chunk_size: 1000,
            chunk_overlap: 100,
            extensions: vec!["md".to_string()],
            removed_documents: RemovedDocumentPolicy::default(),
        }
    }
}

impl ContentConfig {
    /// Full path of the record file.
    pub fn record_path(&self) -> PathBuf {
        self.content_dir.join(&self.record_file)
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingConfig {
    /// Provider name: "trigram" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Provider endpoint override
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

/// LLM provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub endpoint: Option<String>,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            endpoint: None,
            temperature: 0.0,
        }
    }
}

/// Conversation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatConfig {
    /// SQLite file holding per-session message logs
    pub memory_db: PathBuf,

    /// Table name inside `memory_db`
    pub memory_table: String,

    /// Number of past exchanges fed back into a conversation
    pub window: usize,

    /// Number of chunks retrieved per question
    pub top_k: usize,

    /// Answer-combination strategy name
    pub strategy: String,

    /// Terms that make the moderator flag a message
    pub blocked_terms: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            memory_db: PathBuf::from("./memorystore/chat_message_history.db"),
            memory_table: "memory_store".to_string(),
            window: 5,
            top_k: 4,
            strategy: "stuff".to_string(),
            blocked_terms: Vec::new(),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    content: Option<ContentConfig>,
    embedding: Option<EmbeddingConfig>,
    llm: Option<LlmConfig>,
    chat: Option<ChatConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

/// Command-line overrides applied on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub content_dir: Option<PathBuf>,
    pub index_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub verbose: bool,
    pub no_color: bool,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            content: ContentConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            chat: ChatConfig::default(),
            access_token: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file and environment variables.
    ///
    /// Environment variables:
    /// - `KBSYNC_CONFIG`: Path to config file
    /// - `KBSYNC_CONTENT_DIR`: Document root
    /// - `KBSYNC_INDEX_PATH`: Index database file
    /// - `KBSYNC_EMBEDDING_PROVIDER`: Embedding provider
    /// - `KBSYNC_LLM_MODEL`: Chat model identifier
    /// - `KBSYNC_ACCESS_TOKEN`: Access token for the chat surface
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        Self::load_from(None)
    }

    /// Like [`AppConfig::load`], with `config_file` taking precedence over
    /// `KBSYNC_CONFIG`.
    pub fn load_from(config_file: Option<&Path>) -> AppResult<Self> {
        let explicit = match config_file {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var("KBSYNC_CONFIG").ok().map(PathBuf::from),
        };
        let mut config = Self::load_file(explicit.as_deref())?;

        if let Ok(dir) = std::env::var("KBSYNC_CONTENT_DIR") {
            config.content.content_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("KBSYNC_INDEX_PATH") {
            config.content.index_path = PathBuf::from(path);
        }

        if let Ok(provider) = std::env::var("KBSYNC_EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }

        if let Ok(model) = std::env::var("KBSYNC_LLM_MODEL") {
            config.llm.model = model;
        }

        config.access_token = std::env::var("KBSYNC_ACCESS_TOKEN").ok();

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Load defaults merged with a config file.
    ///
    /// An explicitly named file must exist. Without one, `kbsync.yaml` in the
    /// current directory is merged when present.
    pub fn load_file(path: Option<&Path>) -> AppResult<Self> {
        let config = Self::default();

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(AppError::Config(format!(
                        "Config file does not exist: {:?}",
                        path
                    )));
                }
                config.merge_yaml(path)
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    config.merge_yaml(&default_path)
                } else {
                    Ok(config)
                }
            }
        }
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();
        result.config_file = Some(path.to_path_buf());

        if let Some(content) = file.content {
            result.content = content;
        }
        if let Some(embedding) = file.embedding {
            result.embedding = embedding;
        }
        if let Some(llm) = file.llm {
            result.llm = llm;
        }
        if let Some(chat) = file.chat {
            result.chat = chat;
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.log_json = json;
            }
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(dir) = overrides.content_dir {
            self.content.content_dir = dir;
        }

        if let Some(path) = overrides.index_path {
            self.content.index_path = path;
        }

        if let Some(level) = overrides.log_level {
            self.log_level = Some(level);
        }

        if overrides.verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if overrides.no_color {
            self.no_color = true;
        }

        if overrides.log_json {
            self.log_json = true;
        }

        self
    }

    /// Return the access token, or fail when none is configured.
    pub fn require_access_token(&self) -> AppResult<&str> {
        self.access_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AppError::Config(
                    "Access token not found in environment variable: KBSYNC_ACCESS_TOKEN"
                        .to_string(),
                )
            })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> AppResult<()> {
        let content = &self.content;

        if content.chunk_size == 0 {
            return Err(AppError::Config("chunkSize must be positive".to_string()));
        }

        if content.chunk_overlap >= content.chunk_size {
            return Err(AppError::Config(format!(
                "chunkOverlap ({}) must be smaller than chunkSize ({})",
                content.chunk_overlap, content.chunk_size
            )));
        }

        if content.extensions.is_empty() {
            return Err(AppError::Config(
                "At least one document extension is required".to_string(),
            ));
        }

        if content.record_file.trim().is_empty() {
            return Err(AppError::Config("recordFile must not be empty".to_string()));
        }

        let provider = self.embedding.provider.as_str();
        if !KNOWN_EMBEDDING_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be positive".to_string(),
            ));
        }

        let provider = self.llm.provider.as_str();
        if !KNOWN_LLM_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown LLM provider: {}. Supported: {}",
                provider,
                KNOWN_LLM_PROVIDERS.join(", ")
            )));
        }

        Ok(())
    }
}
