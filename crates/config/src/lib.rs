//! Configuration loading, validation, and management for Ancient.
//!
//! Loads configuration from `~/.ancient/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use ancient_core::agent::AutonomyLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ancient/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the LLM endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider name; picks the default base URL
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Explicit endpoint, overrides the provider's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Stream responses (false = one aggregate response per request)
    #[serde(default = "default_true")]
    pub stream: bool,

    /// HTTP request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry policy for failed request attempts
    #[serde(default)]
    pub retry: RetryConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "mistralai/devstral-2512:free".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("stream", &self.stream)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .field("agent", &self.agent)
            .finish()
    }
}

/// Retry settings. The wait before retry `n` (0-based) after a rate-limit
/// failure is `base_delay_ms * 2^n`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum request/tool rounds per user message
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    #[serde(default)]
    pub autonomy: AutonomyLevel,

    /// Replace the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_tool_iterations() -> u32 {
    25
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            autonomy: AutonomyLevel::default(),
            system_prompt: None,
        }
    }
}

impl AppConfig {
    /// Load from `path`, apply environment overrides, then `overrides`
    /// (command-line flags), and validate the result once.
    pub fn load_layered(
        path: &Path,
        overrides: impl FnOnce(&mut Self),
    ) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Read a file without validating it; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// API key sources, first found wins when the file set none:
    /// `ANCIENT_API_KEY`, `LLM_API_KEY`, `OPENROUTER_API_KEY`, `OPENAI_API_KEY`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = ["ANCIENT_API_KEY", "LLM_API_KEY", "OPENROUTER_API_KEY", "OPENAI_API_KEY"]
                .iter()
                .find_map(|key| lookup(key).filter(|v| !v.is_empty()));
        }

        if let Some(provider) = lookup("ANCIENT_PROVIDER") {
            self.provider = provider;
        }

        if let Some(model) = lookup("ANCIENT_MODEL") {
            self.model = model;
        }

        if let Some(url) = lookup("ANCIENT_BASE_URL") {
            self.base_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ancient")
    }

    /// Endpoint to talk to: explicit `base_url`, else the provider's default.
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| default_base_url(&self.provider))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retry.max_retries > 10 {
            return Err(ConfigError::ValidationError(
                "retry.max_retries must be at most 10".into(),
            ));
        }

        if self.agent.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_iterations must be at least 1".into(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            base_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: true,
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
            agent: AgentSettings::default(),
        }
    }
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "https://openrouter.ai/api/v1".into(),
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "openrouter");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert!(config.stream);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider, config.provider);
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.agent.autonomy, config.agent.autonomy);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn excessive_retries_rejected() {
        let mut config = AppConfig::default();
        config.retry.max_retries = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_tool_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.provider, "openrouter");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
model = "gpt-4o"
stream = false

[retry]
max_retries = 5

[agent]
autonomy = "read_only"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert!(!config.stream);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.agent.autonomy, AutonomyLevel::ReadOnly);
        assert_eq!(config.agent.max_tool_iterations, 25);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn overrides_can_fix_file_values_before_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "temperature = 5.0\n").unwrap();

        let raw = AppConfig::load_from(&path).unwrap();
        assert_eq!(raw.temperature, 5.0);

        let config = AppConfig::load_layered(&path, |c| c.temperature = 0.2).unwrap();
        assert_eq!(config.temperature, 0.2);

        assert!(matches!(
            AppConfig::load_layered(&path, |_| {}),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn env_overrides_apply_in_priority_order() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LLM_API_KEY", "sk-llm"),
            ("OPENAI_API_KEY", "sk-openai"),
            ("ANCIENT_MODEL", "qwen/qwen3-coder:free"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("sk-llm"));
        assert_eq!(config.model, "qwen/qwen3-coder:free");
        assert_eq!(config.provider, "openrouter");
    }

    #[test]
    fn file_api_key_wins_over_env() {
        let mut config = AppConfig {
            api_key: Some("sk-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(|_| Some("sk-env".into()));
        assert_eq!(config.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn base_url_resolution() {
        let mut config = AppConfig::default();
        assert!(config.resolved_base_url().contains("openrouter.ai"));
        config.provider = "ollama".into();
        assert!(config.resolved_base_url().contains("localhost:11434"));
        config.base_url = Some("http://proxy.local/v1".into());
        assert_eq!(config.resolved_base_url(), "http://proxy.local/v1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter"));
        assert!(toml_str.contains("max_retries"));
    }
}
