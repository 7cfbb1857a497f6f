//! Configuration loading.
//!
//! Every field has a default, so a missing config file is not an error unless
//! the path was given explicitly.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const FINNHUB_KEY_ENV: &str = "FINNHUB_API_KEY";

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5:7b".to_string(),
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Execute/replan cycles allowed per run
    pub max_iterations: usize,
    /// Tool invocations allowed while executing a single step
    pub max_tool_calls_per_step: usize,
    pub tool_timeout_secs: u64,
    pub persona: String,
    pub user_profile: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_tool_calls_per_step: 5,
            tool_timeout_secs: 60,
            persona: "You are Falcon, a professional expert investment trader who can make \
                      investment recommendations and analysis."
                .to_string(),
            user_profile: "The user is a day trader with a high risk tolerance. The trading \
                           time horizon is usually 1-2 months. The investment goal is to \
                           maximise returns within that horizon."
                .to_string(),
        }
    }
}

impl AgentConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub finnhub_api_key: Option<String>,
    pub finnhub_base_url: String,
    pub portfolio_db: Option<PathBuf>,
    pub portfolio_max_rows: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            finnhub_api_key: None,
            finnhub_base_url: "https://finnhub.io/api/v1".to_string(),
            portfolio_db: None,
            portfolio_max_rows: 200,
        }
    }
}

impl ToolsConfig {
    pub fn portfolio_db_path(&self) -> PathBuf {
        self.portfolio_db.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("falcon")
                .join("portfolio.db")
        })
    }
}

/// Default config location: `<config dir>/falcon/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("falcon").join("config.toml"))
}

/// Load configuration. An explicit path must exist; the default path may not.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => match default_config_path() {
            Some(path) if path.exists() => parse_config(&fs::read_to_string(path)?)?,
            _ => Config::default(),
        },
    };

    if let Ok(key) = std::env::var(FINNHUB_KEY_ENV) {
        if !key.trim().is_empty() {
            config.tools.finnhub_api_key = Some(key);
        }
    }

    validate_config(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.llm.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "llm.base_url must not be empty".to_string(),
        ));
    }
    if config.llm.model.trim().is_empty() {
        return Err(ConfigError::Invalid("llm.model must not be empty".to_string()));
    }
    if config.agent.max_iterations == 0 {
        return Err(ConfigError::Invalid(
            "agent.max_iterations must be > 0".to_string(),
        ));
    }
    if config.agent.max_tool_calls_per_step == 0 {
        return Err(ConfigError::Invalid(
            "agent.max_tool_calls_per_step must be > 0".to_string(),
        ));
    }
    if config.agent.tool_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "agent.tool_timeout_secs must be > 0".to_string(),
        ));
    }
    if config.tools.portfolio_max_rows == 0 {
        return Err(ConfigError::Invalid(
            "tools.portfolio_max_rows must be > 0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.agent.max_iterations, 50);
        assert_eq!(config.agent.max_tool_calls_per_step, 5);
        assert_eq!(config.llm.base_url, "http://localhost:11434");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_partial_config_overrides() {
        let config = parse_config(
            r#"
            [agent]
            max_iterations = 7

            [tools]
            portfolio_db = "/tmp/holdings.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.agent.max_iterations, 7);
        assert_eq!(config.agent.max_tool_calls_per_step, 5);
        assert_eq!(
            config.tools.portfolio_db_path(),
            PathBuf::from("/tmp/holdings.db")
        );
    }

    #[test]
    fn test_zero_iteration_cap_rejected() {
        let config = parse_config("[agent]\nmax_iterations = 0\n").unwrap();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = load_config(Some(Path::new("/nonexistent/falcon/config.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
