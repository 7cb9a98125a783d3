//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `ledgerscope.toml` files.

use crate::cli::{Args, OutputFormat};
use crate::report::Presentation;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "ledgerscope.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Cell presentation settings.
    #[serde(default)]
    pub report: Presentation,

    /// Named report entries, generated in name order.
    #[serde(default)]
    pub reports: BTreeMap<String, ReportEntry>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Number of analyses run in parallel per report.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-analysis timeout in seconds. Unset means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_timeout_seconds: Option<u64>,

    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            analysis_timeout_seconds: None,
            format: OutputFormat::default(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// One report to generate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Domain name (`payments`, `refunds`, `customers`, `sales`, `ledger`).
    pub module: String,

    /// Input CSV.
    pub csv: PathBuf,

    /// Report title. Defaults to the entry name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Destination file.
    pub output: PathBuf,
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
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(format) = args.format {
            self.general.format = format;
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if let Some(timeout) = args.timeout {
            self.general.analysis_timeout_seconds = Some(timeout);
        }
    }

    /// Report entries to run, in name order, restricted to `filter` when it
    /// is non-empty. Unknown names in the filter are an error.
    pub fn selected_reports(&self, filter: &[String]) -> Result<Vec<(&str, &ReportEntry)>> {
        if let Some(unknown) = filter.iter().find(|name| !self.reports.contains_key(*name)) {
            anyhow::bail!("No report named '{}' in the configuration", unknown);
        }

        Ok(self
            .reports
            .iter()
            .filter(|(name, _)| filter.is_empty() || filter.contains(name))
            .map(|(name, entry)| (name.as_str(), entry))
            .collect())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let mut config = Config::default();
        config.reports.insert(
            "payments".to_string(),
            ReportEntry {
                module: "payments".to_string(),
                csv: PathBuf::from("data/payments.csv"),
                title: Some("Payments Report".to_string()),
                output: PathBuf::from("reports/payments.md"),
            },
        );
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

impl ReportEntry {
    /// Title to print, falling back to the entry name.
    pub fn title_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.title.as_deref().unwrap_or(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.concurrency, 4);
        assert_eq!(config.general.analysis_timeout_seconds, None);
        assert_eq!(config.general.format, OutputFormat::Markdown);
        assert!(config.report.thousands_separator);
        assert!(config.reports.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
concurrency = 2
analysis_timeout_seconds = 30
format = "json"

[report]
currency_symbol = "₹"

[reports.refunds]
module = "refunds"
csv = "data/refunds.csv"
output = "out/refunds.md"

[reports.account]
module = "account_summary"
csv = "data/ledger.csv"
title = "Account Summary"
output = "out/account.md"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.concurrency, 2);
        assert_eq!(config.general.analysis_timeout_seconds, Some(30));
        assert_eq!(config.general.format, OutputFormat::Json);
        assert_eq!(config.report.currency_symbol, "₹");
        assert!(config.report.thousands_separator);

        let names: Vec<&str> = config.reports.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["account", "refunds"]);
        assert_eq!(config.reports["refunds"].title_or("refunds"), "refunds");
        assert_eq!(config.reports["account"].title_or("account"), "Account Summary");
    }

    #[test]
    fn test_report_entry_requires_module() {
        let toml_content = r#"
[reports.broken]
csv = "x.csv"
output = "x.md"
"#;
        assert!(toml::from_str::<Config>(toml_content).is_err());
    }

    #[test]
    fn test_merge_with_args() {
        let mut config = Config::default();
        let args = Args::try_parse_from([
            "ledgerscope",
            "--format",
            "json",
            "--timeout",
            "10",
        ])
        .unwrap();
        config.merge_with_args(&args);

        assert_eq!(config.general.format, OutputFormat::Json);
        assert_eq!(config.general.analysis_timeout_seconds, Some(10));
        // Not given on the command line: unchanged.
        assert_eq!(config.general.concurrency, 4);
    }

    #[test]
    fn test_selected_reports() {
        let config: Config = toml::from_str(&Config::default_toml()).unwrap();

        let all = config.selected_reports(&[]).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "payments");

        let filtered = config.selected_reports(&["payments".to_string()]).unwrap();
        assert_eq!(filtered.len(), 1);

        assert!(config.selected_reports(&["nope".to_string()]).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[general]\nconcurrency = 1\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.general.concurrency, 1);
        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[report]"));
        assert!(toml_str.contains("module = \"payments\""));
    }
}
