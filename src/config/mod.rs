//! Configuration management for the forum assistant
//!
//! Layering, lowest precedence first: built-in defaults, `config.toml` in the
//! platform config dir, the `.env` file (loaded into the process environment
//! by `main`), environment variables, then CLI flags applied by the caller.
//! API keys and the wallet key are only ever read from the environment.

pub mod env_file;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::llm::{DEFAULT_CLAUDE_MODEL, DEFAULT_OPENAI_MODEL};

/// Hosted forum tool server
pub const DEFAULT_MCP_SERVER_URL: &str = "https://mcp.moreright.xyz/sse";

/// Smallest window that still holds a tool request next to its results
pub const MIN_HISTORY_TURNS: usize = 2;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub mcp: McpConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `claude`, `openai`, or `auto` (whichever API key is present)
    pub default_provider: String,
    pub claude: ClaudeConfig,
    pub openai: OpenAiConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: "auto".to_string(),
            claude: ClaudeConfig::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeConfig {
    pub model: String,
    pub max_tokens: usize,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CLAUDE_MODEL.to_string(),
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub model: String,
    pub max_tokens: usize,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_OPENAI_MODEL.to_string(),
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// SSE endpoint of the forum tool server
    pub server_url: String,
    /// Spawn a local stdio server instead of connecting to `server_url`
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Extra environment for the stdio server; values may reference `${VAR}`
    pub env: HashMap<String, String>,
    pub request_timeout_secs: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_MCP_SERVER_URL.to_string(),
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Conversation window cap; older turns are summarized
    pub max_history_turns: usize,
    /// Tool rounds allowed per user turn
    pub max_tool_rounds: usize,
    /// Tool output kept per result before truncation
    pub max_tool_result_chars: usize,
    /// Echo tool results to the terminal
    pub debug: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_history_turns: 10,
            max_tool_rounds: 25,
            max_tool_result_chars: 500,
            debug: false,
        }
    }
}

impl AgentConfig {
    /// Raise a too-small window cap to the minimum
    pub fn normalize(&mut self) {
        if self.max_history_turns < MIN_HISTORY_TURNS {
            tracing::warn!(
                requested = self.max_history_turns,
                min = MIN_HISTORY_TURNS,
                "max_history_turns too small; using minimum"
            );
            self.max_history_turns = MIN_HISTORY_TURNS;
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    /// Load from an explicit file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.agent.normalize();
        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("xyz", "moreright", "moreright")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// File config with process environment overrides applied
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply the `.env`-style overrides using `lookup` as the environment
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(provider) = get("LLM_PROVIDER") {
            self.llm.default_provider = provider;
        }
        if let Some(url) = get("MCP_SERVER_URL") {
            self.mcp.server_url = url;
        }
        if let Some(model) = get("CLAUDE_MODEL") {
            self.llm.claude.model = model;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.llm.openai.model = model;
        }
        if let Some(max_tokens) = parse_number::<usize>("MAX_TOKENS", get("MAX_TOKENS")) {
            self.llm.claude.max_tokens = max_tokens;
            self.llm.openai.max_tokens = max_tokens;
        }
        if let Some(turns) = parse_number::<usize>("MAX_HISTORY_TURNS", get("MAX_HISTORY_TURNS")) {
            self.agent.max_history_turns = turns;
            self.agent.normalize();
        }
        if let Some(rounds) = parse_number::<usize>("MAX_TOOL_ROUNDS", get("MAX_TOOL_ROUNDS")) {
            self.agent.max_tool_rounds = rounds;
        }
        if let Some(debug) = get("DEBUG") {
            self.agent.debug = parse_flag(&debug);
        }
    }
}

/// `true`, `1` and `yes` (any case) enable a flag
pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_number<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(key, value = %value, "Ignoring non-numeric setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm.default_provider, "auto");
        assert_eq!(config.llm.claude.model, "claude-3-5-sonnet-20241022");
        assert_eq!(config.llm.openai.model, "gpt-4-turbo");
        assert_eq!(config.mcp.server_url, "https://mcp.moreright.xyz/sse");
        assert_eq!(config.agent.max_history_turns, 10);
        assert_eq!(config.agent.max_tool_rounds, 25);
        assert_eq!(config.agent.max_tool_result_chars, 500);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [agent]
            max_tool_rounds = 5

            [mcp]
            command = "forum-mcp"
            args = ["--stdio"]
            "#,
        )
        .unwrap();

        assert_eq!(config.agent.max_tool_rounds, 5);
        assert_eq!(config.agent.max_history_turns, 10);
        assert_eq!(config.mcp.command.as_deref(), Some("forum-mcp"));
        assert_eq!(config.mcp.server_url, DEFAULT_MCP_SERVER_URL);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides_from(env(&[
            ("MCP_SERVER_URL", "http://localhost:8000/sse"),
            ("CLAUDE_MODEL", "claude-3-opus-20240229"),
            ("MAX_TOKENS", "2048"),
            ("MAX_TOOL_ROUNDS", "8"),
            ("DEBUG", "Yes"),
        ]));

        assert_eq!(config.mcp.server_url, "http://localhost:8000/sse");
        assert_eq!(config.llm.claude.model, "claude-3-opus-20240229");
        assert_eq!(config.llm.claude.max_tokens, 2048);
        assert_eq!(config.llm.openai.max_tokens, 2048);
        assert_eq!(config.agent.max_tool_rounds, 8);
        assert!(config.agent.debug);
    }

    #[test]
    fn test_invalid_numbers_and_blank_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides_from(env(&[
            ("MAX_TOKENS", "lots"),
            ("MCP_SERVER_URL", "   "),
        ]));

        assert_eq!(config.llm.claude.max_tokens, 4096);
        assert_eq!(config.mcp.server_url, DEFAULT_MCP_SERVER_URL);
    }

    #[test]
    fn test_load_from_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.agent.max_history_turns, 10);
    }

    #[test]
    fn test_history_cap_has_a_floor() {
        let mut config = Config::default();
        config.apply_env_overrides_from(env(&[("MAX_HISTORY_TURNS", "1")]));
        assert_eq!(config.agent.max_history_turns, MIN_HISTORY_TURNS);

        config.apply_env_overrides_from(env(&[("MAX_HISTORY_TURNS", "4")]));
        assert_eq!(config.agent.max_history_turns, 4);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nmax_history_turns = 0\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.agent.max_history_turns, MIN_HISTORY_TURNS);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("off"));
    }
}
