// MindHarbor - Grounded support chat with a classical retrieval core
// License: Apache-2.0

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("home directory not found")]
    NoHomeDir,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

// ---------------------------------------------------------------------------
// Knowledge (ingest + index + retrieval)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_documents_dir")]
    pub documents_dir: String,
    /// Where a built index is persisted by `mindharbor index --save`.
    #[serde(default)]
    pub index_path: Option<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            index_path: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            min_score: default_min_score(),
        }
    }
}

fn default_documents_dir() -> String {
    "~/.mindharbor/documents".to_string()
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_top_k() -> usize {
    3
}
fn default_min_score() -> f64 {
    0.1
}

// ---------------------------------------------------------------------------
// Chat sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Session files live here; `None` keeps sessions in memory only.
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: Option<String>,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_prompt_window")]
    pub prompt_window: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_session_title")]
    pub session_title: String,
    #[serde(default = "default_session_retry_attempts")]
    pub session_retry_attempts: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            sessions_dir: default_sessions_dir(),
            max_messages: default_max_messages(),
            max_message_chars: default_max_message_chars(),
            history_window: default_history_window(),
            prompt_window: default_prompt_window(),
            history_limit: default_history_limit(),
            session_title: default_session_title(),
            session_retry_attempts: default_session_retry_attempts(),
        }
    }
}

fn default_sessions_dir() -> Option<String> {
    Some("~/.mindharbor/sessions".to_string())
}
fn default_max_messages() -> usize {
    50
}
fn default_max_message_chars() -> usize {
    1000
}
fn default_history_window() -> usize {
    10
}
fn default_prompt_window() -> usize {
    3
}
fn default_history_limit() -> usize {
    10
}
fn default_session_title() -> String {
    "Mental Health Chat".to_string()
}
fn default_session_retry_attempts() -> usize {
    3
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub append_disclaimer: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            append_disclaimer: true,
        }
    }
}

fn default_model() -> String {
    "llama3-8b-8192".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> usize {
    500
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> usize {
    2
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    5000
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a JSON file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (prefix: MINDHARBOR_)
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MINDHARBOR_KNOWLEDGE_DOCUMENTS_DIR") {
            self.knowledge.documents_dir = v;
        }
        if let Ok(v) = std::env::var("MINDHARBOR_CHAT_SESSIONS_DIR") {
            self.chat.sessions_dir = if v.is_empty() { None } else { Some(v) };
        }
        if let Ok(v) = std::env::var("MINDHARBOR_GENERATOR_MODEL") {
            self.generator.model = v;
        }
        if let Ok(v) = std::env::var("MINDHARBOR_GENERATOR_API_BASE") {
            self.generator.api_base = v;
        }
        if let Ok(v) = std::env::var("MINDHARBOR_GENERATOR_API_KEY") {
            self.generator.api_key = v;
        }
        // Conventional key name for the default Groq backend
        if self.generator.api_key.is_empty() {
            if let Ok(v) = std::env::var("GROQ_API_KEY") {
                self.generator.api_key = v;
            }
        }
        if let Ok(v) = std::env::var("MINDHARBOR_SERVER_PORT") {
            if let Ok(n) = v.parse() {
                self.server.port = n;
            }
        }
    }

    /// Resolve the documents directory, expanding `~` to home directory.
    pub fn documents_path(&self) -> Result<PathBuf, ConfigError> {
        expand_home(&self.knowledge.documents_dir)
    }

    /// Resolve the sessions directory, if sessions are persisted.
    pub fn sessions_path(&self) -> Result<Option<PathBuf>, ConfigError> {
        self.chat.sessions_dir.as_deref().map(expand_home).transpose()
    }

    /// Resolve the persisted index location, if configured.
    pub fn index_path(&self) -> Result<Option<PathBuf>, ConfigError> {
        self.knowledge.index_path.as_deref().map(expand_home).transpose()
    }

    /// Get the default config file path: ~/.mindharbor/config.json
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".mindharbor").join("config.json"))
    }

    /// Whether a generator backend is configured at all.
    pub fn has_generator(&self) -> bool {
        !self.generator.api_key.is_empty()
    }

    /// Validate configuration for basic correctness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let k = &self.knowledge;
        if k.chunk_size == 0 {
            return Err(ConfigError::Invalid("knowledge.chunk_size must be > 0".into()));
        }
        if k.chunk_overlap >= k.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "knowledge.chunk_overlap ({}) must be smaller than chunk_size ({})",
                k.chunk_overlap, k.chunk_size
            )));
        }
        if k.top_k == 0 {
            return Err(ConfigError::Invalid("knowledge.top_k must be > 0".into()));
        }
        if self.generator.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "generator.timeout_secs must be > 0".into(),
            ));
        }
        if self.chat.max_messages == 0 {
            return Err(ConfigError::Invalid("chat.max_messages must be > 0".into()));
        }
        if self.chat.max_message_chars == 0 {
            return Err(ConfigError::Invalid(
                "chat.max_message_chars must be > 0".into(),
            ));
        }

        if !self.has_generator() {
            tracing::warn!("No generator API key configured; responses will use the fallback responder");
        }

        Ok(())
    }
}

fn expand_home(path: &str) -> Result<PathBuf, ConfigError> {
    if let Some(stripped) = path.strip_prefix('~') {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(path.strip_prefix("~/").unwrap_or(stripped)))
    } else {
        Ok(PathBuf::from(path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.knowledge.chunk_size, 1000);
        assert_eq!(cfg.knowledge.chunk_overlap, 200);
        assert_eq!(cfg.knowledge.top_k, 3);
        assert_eq!(cfg.chat.max_messages, 50);
        assert_eq!(cfg.chat.history_window, 10);
        assert_eq!(cfg.chat.prompt_window, 3);
        assert_eq!(cfg.generator.model, "llama3-8b-8192");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_json() {
        let json = r#"{"generator": {"model": "llama-3.1-8b-instant"}}"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.generator.model, "llama-3.1-8b-instant");
        assert_eq!(cfg.generator.max_tokens, 500);
        assert_eq!(cfg.knowledge.documents_dir, "~/.mindharbor/documents");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "knowledge": {"documents_dir": "/srv/docs", "chunk_size": 400, "chunk_overlap": 50},
            "chat": {"sessions_dir": null, "max_messages": 20},
            "generator": {"api_key": "gsk_test", "timeout_secs": 5},
            "server": {"port": 8080}
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.knowledge.documents_dir, "/srv/docs");
        assert_eq!(cfg.knowledge.chunk_size, 400);
        assert!(cfg.chat.sessions_dir.is_none());
        assert_eq!(cfg.chat.max_messages, 20);
        assert!(cfg.has_generator());
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.sessions_path().unwrap().is_none());
    }

    #[test]
    fn test_documents_path_tilde() {
        let cfg = Config::default();
        let path = cfg.documents_path().unwrap();
        assert!(path.to_str().unwrap().contains("mindharbor"));
        assert!(!path.to_str().unwrap().starts_with('~'));
    }

    #[test]
    fn test_validate_rejects_overlap_not_smaller_than_size() {
        let mut cfg = Config::default();
        cfg.knowledge.chunk_overlap = cfg.knowledge.chunk_size;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut cfg = Config::default();
        cfg.knowledge.top_k = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut cfg = Config::default();
        cfg.generator.timeout_secs = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(msg)) if msg.contains("timeout_secs")));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = Config::load(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(cfg.knowledge.top_k, 3);
    }
}
