//! Markdown report generation.
//!
//! This module renders a [`Report`] into a single Markdown document (or its
//! JSON equivalent) and persists it.

use super::format::{escape_cell, Presentation};
use crate::cli::OutputFormat;
use crate::error::LedgerError;
use crate::models::{AnalysisResult, Metric, Report, ReportMetadata, ReportSection, Table, Value};
use anyhow::Result;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Marker written for an analysis that produced nothing.
pub const NO_DATA: &str = "*No data available for this analysis*";

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, presentation: &Presentation) -> String {
    let mut output = String::new();

    output.push_str(&generate_header_section(&report.metadata));

    for section in &report.sections {
        output.push_str(&generate_section(section, presentation));
    }

    output.push_str(&generate_footer(report));

    output
}

/// Title, generation time and dataset size.
fn generate_header_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str(&format!("# {}\n\n", metadata.title));
    section.push_str(&format!(
        "Generated: {} UTC\n\n",
        metadata.generated_at.format("%Y-%m-%dT%H:%M:%S")
    ));
    section.push_str(&format!(
        "**Dataset Summary:** {} transactions analyzed\n\n",
        metadata.row_count
    ));

    section
}

/// Generate one analysis section.
fn generate_section(section: &ReportSection, presentation: &Presentation) -> String {
    let mut block = String::new();

    block.push_str(&format!("## {}\n\n", section.title));
    if !section.description.is_empty() {
        block.push_str(&format!("{}\n\n", section.description));
    }

    match &section.result {
        AnalysisResult::Error { message, .. } => {
            block.push_str(&format!("*Error during analysis: {}*\n", message));
        }
        result if result.is_empty() => {
            block.push_str(NO_DATA);
            block.push('\n');
        }
        AnalysisResult::Table(table) => {
            block.push_str(&generate_table(table, presentation));
        }
        AnalysisResult::Metrics { metrics } => {
            block.push_str(&generate_metrics_table(metrics, presentation));
        }
    }
    block.push('\n');

    block
}

/// Render a pipe table; columns holding only numbers are right-aligned.
fn generate_table(table: &Table, presentation: &Presentation) -> String {
    let mut out = String::new();

    let header: Vec<String> = table.columns.iter().map(|c| escape_cell(c)).collect();
    out.push_str(&format!("| {} |\n", header.join(" | ")));

    let alignment: Vec<&str> = (0..table.columns.len())
        .map(|col| {
            if is_numeric_column(table, col) {
                "---:"
            } else {
                ":---"
            }
        })
        .collect();
    out.push_str(&format!("|{}|\n", alignment.join("|")));

    for row in &table.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|v| escape_cell(&presentation.format_value(v)))
            .collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }

    out
}

fn is_numeric_column(table: &Table, col: usize) -> bool {
    let mut cells = table.rows.iter().filter_map(|r| r.get(col)).peekable();
    cells.peek().is_some()
        && cells.all(|v| v.is_numeric() || matches!(v, Value::Empty))
}

/// Render a metric list as a two-column table.
fn generate_metrics_table(metrics: &[Metric], presentation: &Presentation) -> String {
    let mut out = String::new();

    out.push_str("| Metric | Value |\n");
    out.push_str("|:---|---:|\n");
    for metric in metrics {
        out.push_str(&format!(
            "| {} | {} |\n",
            escape_cell(&metric.name),
            escape_cell(&presentation.format_value(&metric.value))
        ));
    }

    out
}

/// Generate the report footer.
fn generate_footer(report: &Report) -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    let failed = report.failed_sections();
    if failed > 0 {
        footer.push_str(&format!(
            "*{} of {} analyses failed. See the sections above for details.*\n\n",
            failed,
            report.sections.len()
        ));
    }
    footer.push_str(&format!(
        "*Report generated by LedgerScope v{} in {:.2}s*\n",
        env!("CARGO_PKG_VERSION"),
        report.metadata.duration_seconds
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Render in the requested format.
pub fn render(report: &Report, format: OutputFormat, presentation: &Presentation) -> Result<String> {
    match format {
        OutputFormat::Markdown => Ok(generate_markdown_report(report, presentation)),
        OutputFormat::Json => generate_json_report(report),
    }
}

/// Write rendered content, creating parent directories as needed. Returns
/// the canonical location of the written file.
pub fn write_report(content: &str, path: &Path) -> Result<PathBuf, LedgerError> {
    let fail = |source: std::io::Error| LedgerError::OutputWriteFailure {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(fail)?;
    }

    let mut file = std::fs::File::create(path).map_err(fail)?;
    file.write_all(content.as_bytes()).map_err(fail)?;

    path.canonicalize().map_err(fail)
}
