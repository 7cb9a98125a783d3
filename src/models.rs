//! Data models for analysis results and reports.
//!
//! This module contains the structures that flow from the analyses to the
//! report assembler: typed cell values, tabular and metric results, report
//! sections and the report itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places kept for every non-integer value placed in a result.
pub const PRECISION: i32 = 2;

/// Round to [`PRECISION`] decimal places.
pub fn round_value(x: f64) -> f64 {
    let factor = 10f64.powi(PRECISION);
    let rounded = (x * factor).round() / factor;
    // Avoid rendering "-0.00".
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// A typed result cell. Presentation is left to the report layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// Whole count.
    Int(i64),
    /// Plain number.
    Number(f64),
    /// Currency amount.
    Amount(f64),
    /// Percentage already scaled to 0-100.
    Percent(f64),
    /// Free text.
    Text(String),
    /// Absent value.
    Empty,
}

impl Value {
    pub fn count(n: usize) -> Self {
        Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }

    pub fn number(x: f64) -> Self {
        Value::Number(round_value(x))
    }

    pub fn amount(x: f64) -> Self {
        Value::Amount(round_value(x))
    }

    pub fn percent(x: f64) -> Self {
        Value::Percent(round_value(x))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Numeric view of the cell, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Number(x) | Value::Amount(x) | Value::Percent(x) => Some(*x),
            Value::Text(_) | Value::Empty => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Number(x) | Value::Amount(x) => write!(f, "{:.2}", x),
            Value::Percent(x) => write!(f, "{:.2}%", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Empty => Ok(()),
        }
    }
}

/// Tabular result with ordered, named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given column names.
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width mismatch");
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of one column, top to bottom.
    #[allow(dead_code)] // Used by tests
    pub fn column_values(&self, name: &str) -> Vec<&Value> {
        match self.column_index(name) {
            Some(i) => self.rows.iter().filter_map(|r| r.get(i)).collect(),
            None => Vec::new(),
        }
    }

    /// Cell lookup by row index and column name.
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col)
    }
}

/// A single named metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: Value,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Outcome of one analysis operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisResult {
    /// Rows and columns.
    Table(Table),
    /// Short name/value list.
    Metrics { metrics: Vec<Metric> },
    /// The operation failed; produced by fault isolation.
    Error { id: String, message: String },
}

impl AnalysisResult {
    pub fn metrics(metrics: Vec<Metric>) -> Self {
        AnalysisResult::Metrics { metrics }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        AnalysisResult::Error {
            id: id.into(),
            message: message.into(),
        }
    }

    /// True when there is nothing to show (and the result is not an error).
    pub fn is_empty(&self) -> bool {
        match self {
            AnalysisResult::Table(t) => t.is_empty(),
            AnalysisResult::Metrics { metrics } => metrics.is_empty(),
            AnalysisResult::Error { .. } => false,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AnalysisResult::Error { .. })
    }

    #[allow(dead_code)] // Used by tests
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            AnalysisResult::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Look up a metric value by name.
    #[allow(dead_code)] // Used by tests
    pub fn metric(&self, name: &str) -> Option<&Value> {
        match self {
            AnalysisResult::Metrics { metrics } => {
                metrics.iter().find(|m| m.name == name).map(|m| &m.value)
            }
            _ => None,
        }
    }
}

impl From<Table> for AnalysisResult {
    fn from(table: Table) -> Self {
        AnalysisResult::Table(table)
    }
}

/// One block of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    /// Identifier of the operation that produced this section.
    pub id: String,
    pub title: String,
    pub description: String,
    pub result: AnalysisResult,
}

/// Report header data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Report title.
    pub title: String,
    /// Domain module the report was produced by.
    pub domain: String,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
    /// Rows in the prepared dataset.
    pub row_count: usize,
    /// Wall-clock time spent dispatching analyses, in seconds.
    pub duration_seconds: f64,
}

/// The complete analytical report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub sections: Vec<ReportSection>,
}

impl Report {
    /// Number of sections whose analysis failed.
    pub fn failed_sections(&self) -> usize {
        self.sections.iter().filter(|s| s.result.is_error()).count()
    }
}
