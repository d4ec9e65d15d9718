//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// Bankability - LLM-powered bankability scoring for companies
///
/// Score a company's creditworthiness from parsed documents and
/// payment/banking snapshots, and get a prioritized remediation plan.
/// Markdown/JSON reports. Built in Rust.
///
/// Examples:
///   bankability --subject acme-gmbh --documents docs.json
///   bankability --subject acme-gmbh --documents docs.json --payments stripe.json --offline
///   bankability --subject acme-gmbh --documents docs.json --format json --output report.json
///   bankability --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Identifier of the company being scored
    ///
    /// Not required when using --init-config.
    #[arg(short, long, value_name = "ID", required_unless_present = "init_config")]
    pub subject: Option<String>,

    /// Path to the parsed-documents JSON file
    #[arg(short, long, value_name = "FILE")]
    pub documents: Option<PathBuf>,

    /// Path to the payment-processor snapshot JSON file
    #[arg(long, value_name = "FILE")]
    pub payments: Option<PathBuf>,

    /// Path to the banking snapshot JSON file
    #[arg(long, value_name = "FILE")]
    pub banking: Option<PathBuf>,

    /// Ollama model to use for analysis
    ///
    /// Can also be set via BANKABILITY_MODEL env var or .bankability.toml config.
    #[arg(short, long, default_value = "llama3.2:latest", env = "BANKABILITY_MODEL")]
    pub model: String,

    /// Output file path for the report
    #[arg(short, long, default_value = "bankability_report.md", value_name = "FILE")]
    pub output: PathBuf,

    /// Ollama API endpoint URL
    #[arg(long, default_value = "http://localhost:11434", env = "OLLAMA_URL")]
    pub ollama_url: String,

    /// Path to configuration file
    ///
    /// If not specified, looks for .bankability.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Temperature for LLM responses (0.0 - 1.0)
    ///
    /// Lower values produce more consistent/deterministic output
    #[arg(long, default_value = "0.1")]
    pub temperature: f32,

    /// Request timeout in seconds
    ///
    /// How long to wait for the LLM to respond. Default: from config or 300s.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Run offline with deterministic heuristics instead of an LLM
    ///
    /// No Ollama required; useful for CI and smoke tests.
    #[arg(long)]
    pub offline: bool,

    /// Industry tag for calibration hints (saas, ecommerce, services)
    #[arg(long, value_name = "TAG")]
    pub industry: Option<String>,

    /// Remediation target score each risk factor is measured against
    #[arg(long, value_name = "SCORE")]
    pub target: Option<f64>,

    /// Base URL of the session cache service
    ///
    /// Sessions fall back to in-process storage when unset or unreachable.
    #[arg(long, value_name = "URL", env = "BANKABILITY_CACHE_URL")]
    pub cache_url: Option<String>,

    /// Fail if the final score lands below this value
    ///
    /// Useful for CI pipelines. Exit code 2 when the score is lower.
    #[arg(long, value_name = "SCORE")]
    pub fail_below: Option<u32>,

    /// Generate a default .bankability.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the subject id, empty if not set (validated beforehand).
    pub fn subject_id(&self) -> &str {
        self.subject.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Some evidence source must be named, even if the files turn out
        // empty (the pre-filter then scores the degenerate case).
        if self.documents.is_none() && self.payments.is_none() && self.banking.is_none() {
            return Err(
                "Provide at least one of --documents, --payments, or --banking".to_string(),
            );
        }

        // Validate Ollama URL format (not needed offline)
        if !self.offline
            && !self.ollama_url.starts_with("http://")
            && !self.ollama_url.starts_with("https://")
        {
            return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
        }

        // Validate temperature range
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err("Temperature must be between 0.0 and 1.0".to_string());
        }

        if let Some(target) = self.target {
            if !(0.0..=100.0).contains(&target) {
                return Err("Target must be between 0 and 100".to_string());
            }
        }

        if let Some(fail_below) = self.fail_below {
            if fail_below > 100 {
                return Err("--fail-below must be between 0 and 100".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        // Validate evidence paths if provided
        for (flag, path) in [
            ("--documents", &self.documents),
            ("--payments", &self.payments),
            ("--banking", &self.banking),
        ] {
            if let Some(path) = path {
                if !path.exists() {
                    return Err(format!("{} file does not exist: {}", flag, path.display()));
                }
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            subject: Some("acme".to_string()),
            documents: None,
            payments: None,
            banking: None,
            model: "test".to_string(),
            output: PathBuf::from("report.md"),
            ollama_url: "http://localhost:11434".to_string(),
            config: None,
            verbose: false,
            quiet: false,
            format: OutputFormat::Markdown,
            temperature: 0.1,
            timeout: None,
            offline: true,
            industry: None,
            target: None,
            cache_url: None,
            fail_below: None,
            init_config: false,
        }
    }

    #[test]
    fn test_validation_requires_some_evidence() {
        let args = make_args();
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_ollama_url() {
        let mut args = make_args();
        args.documents = Some(std::env::temp_dir());
        args.offline = false;
        args.ollama_url = "localhost:11434".to_string();
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.documents = Some(std::env::temp_dir());
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_temperature_range() {
        let mut args = make_args();
        args.documents = Some(std::env::temp_dir());
        args.temperature = 1.5;
        assert!(args.validate().is_err());

        args.temperature = 0.3;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_evidence_file() {
        let mut args = make_args();
        args.documents = Some(PathBuf::from("/nonexistent/docs.json"));
        let err = args.validate().unwrap_err();
        assert!(err.contains("--documents"));
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
