use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MCP_URL: &str = "http://127.0.0.1:3000/mcp";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings for `serve`. CLI flags override these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub log_level: String,
    pub json_response: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT, log_level: "INFO".into(), json_response: false }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(d.port);
        let log_level = std::env::var("LOG_LEVEL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(d.log_level);
        let json_response = std::env::var("JSON_RESPONSE")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(d.json_response);
        Self { port, log_level, json_response }
    }
}

/// Limits for the reasoning loop and the MCP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_steps: usize,
    pub max_tool_calls_per_step: usize,
    pub tool_retries: u32,
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_steps: 10, max_tool_calls_per_step: 8, tool_retries: 2, request_timeout_secs: 30 }
    }
}

impl LimitsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.into(),
            model: DEFAULT_LLM_MODEL.into(),
            api_key: None,
            system_prompt: None,
        }
    }
}

/// Settings for `ask`/`tools`/`health`, read from an optional TOML file:
///
/// ```toml
/// mcp_url = "http://127.0.0.1:3000/mcp"
///
/// [llm]
/// base_url = "http://localhost:11434/v1"
/// model = "llama3.1"
///
/// [limits]
/// max_steps = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub mcp_url: String,
    pub llm: LlmConfig,
    pub limits: LimitsConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { mcp_url: DEFAULT_MCP_URL.into(), llm: LlmConfig::default(), limits: LimitsConfig::default() }
    }
}

impl ClientConfig {
    /// File (if given) first, then `MCP_URL`, `LLM_BASE_URL`, `LLM_MODEL`, `OPENAI_API_KEY`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let shown = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: shown.clone(), source })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: shown, source })
    }

    fn apply_env(&mut self) {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        if let Some(v) = var("MCP_URL") {
            self.mcp_url = v;
        }
        if let Some(v) = var("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = var("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = var("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
    }
}
