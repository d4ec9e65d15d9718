//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.bankability.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Scoring and remediation settings.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Session cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "bankability_report.md".to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Default model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Run offline with the deterministic heuristic capability.
    #[serde(default)]
    pub offline: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            offline: false,
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    300
}

/// Scoring and remediation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Remediation target every factor is measured against.
    #[serde(default = "default_target")]
    pub target: f64,

    /// Industry tag used to select calibration hints.
    #[serde(default = "default_industry")]
    pub industry: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            industry: default_industry(),
        }
    }
}

fn default_target() -> f64 {
    75.0
}

fn default_industry() -> String {
    "general".to_string()
}

/// Session cache settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Base URL of the cache service; in-process fallback only when unset.
    #[serde(default)]
    pub url: Option<String>,
}

/// Calibration hints folded into every task's evidence bundle, keyed by
/// the configured industry tag.
pub fn calibration_hints(industry: &str) -> Vec<String> {
    let hints: &[&str] = match industry {
        "saas" => &[
            "Recurring-revenue business: weight churn and net revenue retention heavily.",
            "Gross margins below 70% are unusual for software and deserve scrutiny.",
        ],
        "ecommerce" => &[
            "Thin-margin volume business: focus on inventory turns and cash conversion.",
            "Seasonal revenue swings are normal; compare year over year, not month over month.",
        ],
        "services" => &[
            "Project-based revenue: concentration in a few clients is the dominant risk.",
            "Utilization and billable-rate trends proxy for margin durability.",
        ],
        _ => &["No industry-specific calibration; apply general underwriting judgment."],
    };

    hints.iter().map(|h| h.to_string()).collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".bankability.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        // Model settings - always override since they have defaults in CLI
        self.model.name = args.model.clone();
        self.model.ollama_url = args.ollama_url.clone();
        self.model.temperature = args.temperature;

        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if args.offline {
            self.model.offline = true;
        }

        // Optional settings - only override if provided
        if let Some(target) = args.target {
            self.scoring.target = target;
        }
        if let Some(ref industry) = args.industry {
            self.scoring.industry = industry.clone();
        }
        if let Some(ref cache_url) = args.cache_url {
            self.cache.url = Some(cache_url.clone());
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
