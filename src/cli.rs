//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// LedgerScope - analysis reports for transaction exports
///
/// Runs a fixed battery of analyses over a payments, refunds, customers,
/// sales or ledger CSV export and writes one Markdown (or JSON) report.
///
/// Examples:
///   ledgerscope
///   ledgerscope --config reports.toml --report payments --report refunds
///   ledgerscope --module ledger --csv ledger.csv --output out/ledger.md
///   ledgerscope --list
///   ledgerscope --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for ledgerscope.toml in the current directory
    #[arg(short, long, value_name = "FILE", env = "LEDGERSCOPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only generate the named report entries (repeatable)
    #[arg(short, long = "report", value_name = "NAME")]
    pub reports: Vec<String>,

    /// Output format (markdown, json)
    ///
    /// Overrides the `format` setting of the config file.
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Number of analyses run in parallel per report
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Per-analysis timeout in seconds
    ///
    /// An analysis exceeding it is recorded as failed; the rest of the
    /// report is still produced.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the registered analyses of every domain and exit
    #[arg(long)]
    pub list: bool,

    /// Generate a default ledgerscope.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    // === Ad-hoc single report ===

    /// Domain to analyze (payments, refunds, customers, sales, ledger)
    #[arg(short, long, value_name = "DOMAIN")]
    pub module: Option<String>,

    /// Input CSV for an ad-hoc run
    #[arg(long, value_name = "FILE", requires = "module")]
    pub csv: Option<PathBuf>,

    /// Output file for an ad-hoc run
    #[arg(short, long, value_name = "FILE", requires = "module")]
    pub output: Option<PathBuf>,

    /// Report title for an ad-hoc run
    #[arg(short, long, value_name = "TITLE", requires = "module")]
    pub title: Option<String>,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
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

    /// True when a single report is described on the command line.
    pub fn is_ad_hoc(&self) -> bool {
        self.module.is_some()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config and --list
        if self.init_config || self.list {
            return Ok(());
        }

        if self.module.is_some() && (self.csv.is_none() || self.output.is_none()) {
            return Err("--module requires both --csv and --output".to_string());
        }
        if self.module.is_none() && (self.csv.is_some() || self.output.is_some()) {
            return Err("--csv and --output are only valid together with --module".to_string());
        }

        if self.is_ad_hoc() && !self.reports.is_empty() {
            return Err("Cannot combine --report with an ad-hoc --module run".to_string());
        }

        if let Some(ref csv) = self.csv {
            if !csv.exists() {
                return Err(format!("Input file does not exist: {}", csv.display()));
            }
        }

        // Validate concurrency
        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        // Validate timeout if provided
        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
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
