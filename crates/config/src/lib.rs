//! Configuration loading, validation, and management for PitchPal.
//!
//! Loads configuration from `~/.pitchpal/config.toml` with environment
//! variable overrides. Validates all settings at startup. The context
//! core consumes these values as opaque numeric inputs; it never reads
//! files or environment variables itself.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.pitchpal/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model and generation settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Context window budget settings
    #[serde(default)]
    pub context: ContextConfig,
}

/// Which model to load and how to generate with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name: a preset alias ("tinyllama", "smollm:360m") or a
    /// path to a local GGUF file.
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Maximum tokens the model may generate per response.
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,

    /// Sampling temperature (0.0 = deterministic).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model_name() -> String {
    "tinyllama".into()
}
fn default_max_response_tokens() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            max_response_tokens: default_max_response_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Context window budgeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Total context window budget in tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Headroom subtracted from the budget for the model's own response.
    #[serde(default = "default_reserved_tokens")]
    pub reserved_tokens: usize,

    /// How many recent conversational turns are always kept in the
    /// prompt window regardless of relevance score.
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    /// Age in hours after which ordinary messages are cleaned up.
    /// Instructions and personas survive this cleanup.
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,
}

fn default_max_tokens() -> usize {
    4000
}
fn default_reserved_tokens() -> usize {
    500
}
fn default_max_history_turns() -> usize {
    15
}
fn default_cache_ttl_hours() -> u64 {
    24
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            reserved_tokens: default_reserved_tokens(),
            max_history_turns: default_max_history_turns(),
            cache_ttl_hours: default_cache_ttl_hours(),
        }
    }
}

impl ContextConfig {
    /// The budget actually available for the prompt window:
    /// `max_tokens` minus the response headroom.
    pub fn prompt_budget(&self) -> usize {
        self.max_tokens.saturating_sub(self.reserved_tokens)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.pitchpal/config.toml).
    ///
    /// Environment variable overrides (highest priority):
    /// - `PITCHPAL_MODEL` — model name/alias
    /// - `PITCHPAL_MAX_TOKENS` — context window budget
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(model) = std::env::var("PITCHPAL_MODEL") {
            config.model.name = model;
        }

        if let Ok(max_tokens) = std::env::var("PITCHPAL_MAX_TOKENS") {
            config.context.max_tokens = max_tokens.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "PITCHPAL_MAX_TOKENS must be an integer, got '{max_tokens}'"
                ))
            })?;
            config.validate()?;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
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

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".pitchpal")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "context.max_tokens must be > 0".into(),
            ));
        }

        if self.context.reserved_tokens >= self.context.max_tokens {
            return Err(ConfigError::ValidationError(format!(
                "context.reserved_tokens ({}) must be smaller than context.max_tokens ({})",
                self.context.reserved_tokens, self.context.max_tokens
            )));
        }

        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for first-run setup).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            context: ContextConfig::default(),
        }
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

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.context.max_tokens, 4000);
        assert_eq!(config.context.reserved_tokens, 500);
        assert_eq!(config.context.max_history_turns, 15);
        assert_eq!(config.context.cache_ttl_hours, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn prompt_budget_subtracts_headroom() {
        let config = AppConfig::default();
        assert_eq!(config.context.prompt_budget(), 3500);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.name, config.model.name);
        assert_eq!(parsed.context.max_tokens, config.context.max_tokens);
    }

    #[test]
    fn reserved_exceeding_total_rejected() {
        let config = AppConfig {
            context: ContextConfig {
                max_tokens: 400,
                reserved_tokens: 500,
                ..ContextConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            model: ModelConfig {
                temperature: 5.0,
                ..ModelConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().model.name, "tinyllama");
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("tinyllama"));
        assert!(toml_str.contains("4000"));
    }
}
