//! Configuration management for autoheal
//!
//! TOML-based configuration with defaults and validation.
//! Location: ~/.autoheal/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::RecoveryError;

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Reasoning oracle connection and sampling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub model: String,
    /// Per-call timeout
    pub timeout_ms: u64,
    pub classification_temperature: f32,
    pub strategy_temperature: f32,
    pub max_tokens: u32,
}

/// Classifier, cache and trend-detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub cache_entries_per_key: usize,
    /// Distinct pattern keys kept before the stalest is dropped
    pub cache_max_keys: usize,
    pub message_prefix_len: usize,
    pub history_capacity: usize,
    pub pattern_min_occurrences: usize,
    pub trend_window_hours: i64,
    pub trend_threshold: f64,
    pub recoverability_confidence: f64,
}

/// Strategy ranking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub historical_weight: f64,
    pub oracle_weight: f64,
    pub context_adjustment_limit: f64,
    pub max_strategies: usize,
    pub max_fallback_depth: usize,
    pub min_probability: f64,
    pub max_probability: f64,
    pub default_estimate: f64,
}

/// Execution monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Switch when completion falls below this share of the expected progress
    pub slow_progress_ratio: f64,
    /// Extend timeouts once this share of the time estimate has elapsed
    pub timeout_extension_threshold: f64,
    pub timeout_multiplier: f64,
    /// Multiplier applied to delays when progress lags
    pub delay_reduction: f64,
    /// Elapsed share of the estimate before the switch rule is evaluated
    pub min_elapsed_fraction: f64,
}

/// Effectiveness ledger settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub learning_rate: f64,
    pub stats_window_days: i64,
    pub history_capacity: usize,
    pub max_confidence_bias: f64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 11434,
            model: "qwen2.5:7b-instruct".to_string(),
            timeout_ms: 15_000,
            classification_temperature: 0.1,
            strategy_temperature: 0.3,
            max_tokens: 800,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            cache_entries_per_key: 10,
            cache_max_keys: 1000,
            message_prefix_len: 50,
            history_capacity: 5000,
            pattern_min_occurrences: 3,
            trend_window_hours: 24,
            trend_threshold: 0.2,
            recoverability_confidence: 0.6,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            historical_weight: 0.6,
            oracle_weight: 0.4,
            context_adjustment_limit: 0.3,
            max_strategies: 3,
            max_fallback_depth: 3,
            min_probability: 0.1,
            max_probability: 0.95,
            default_estimate: 0.5,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            slow_progress_ratio: 0.5,
            timeout_extension_threshold: 0.8,
            timeout_multiplier: 1.5,
            delay_reduction: 0.5,
            min_elapsed_fraction: 0.25,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            stats_window_days: 30,
            history_capacity: 10_000,
            max_confidence_bias: 0.2,
        }
    }
}

impl OracleConfig {
    /// Base URL of the Ollama server
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Config::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, toml_string).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;

        Ok(home.join(".autoheal").join("config.toml"))
    }

    /// Reject values that would break the clamping invariants
    pub fn validate(&self) -> std::result::Result<(), RecoveryError> {
        let unit_fields = [
            ("strategy.historical_weight", self.strategy.historical_weight),
            ("strategy.oracle_weight", self.strategy.oracle_weight),
            ("strategy.default_estimate", self.strategy.default_estimate),
            ("strategy.min_probability", self.strategy.min_probability),
            ("strategy.max_probability", self.strategy.max_probability),
            ("ledger.learning_rate", self.ledger.learning_rate),
            ("classifier.recoverability_confidence", self.classifier.recoverability_confidence),
            ("orchestrator.slow_progress_ratio", self.orchestrator.slow_progress_ratio),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(RecoveryError::ConfigError(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.strategy.min_probability > self.strategy.max_probability {
            return Err(RecoveryError::ConfigError(
                "strategy.min_probability exceeds strategy.max_probability".to_string(),
            ));
        }

        if self.classifier.cache_entries_per_key == 0
            || self.classifier.cache_max_keys == 0
            || self.classifier.history_capacity == 0
            || self.ledger.history_capacity == 0
            || self.strategy.max_strategies == 0
        {
            return Err(RecoveryError::ConfigError(
                "capacities and strategy counts must be non-zero".to_string(),
            ));
        }

        if self.orchestrator.timeout_multiplier < 1.0 {
            return Err(RecoveryError::ConfigError(
                "orchestrator.timeout_multiplier must be at least 1.0".to_string(),
            ));
        }

        Ok(())
    }
}
