//! Typed, schema-validated in-memory tables.
//!
//! A [`Dataset`] is built once from raw string rows according to a
//! per-domain [`Schema`]. After preparation it is shared read-only with every
//! analysis; there is no public API for adding or changing columns, so an
//! analysis cannot leak working columns into another.

pub mod coerce;

use crate::error::LedgerError;
use chrono::NaiveDateTime;
use coerce::{parse_amount, parse_flag, parse_timestamp, Normalize};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Kind of data a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Currency or other numeric amount; never null.
    Amount,
    /// Boolean flag.
    Flag,
    /// Point in time; null when unparseable.
    Timestamp,
    /// Categorical string used for grouping.
    Category,
    /// Identifier string; absent when the cell is empty.
    Identifier,
}

impl ColumnKind {
    fn name(self) -> &'static str {
        match self {
            ColumnKind::Amount => "amount",
            ColumnKind::Flag => "flag",
            ColumnKind::Timestamp => "timestamp",
            ColumnKind::Category => "category",
            ColumnKind::Identifier => "identifier",
        }
    }
}

/// Column storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Amount(Vec<f64>),
    Flag(Vec<bool>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    Category(Vec<String>),
    Identifier(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Amount(v) => v.len(),
            Column::Flag(v) => v.len(),
            Column::Timestamp(v) => v.len(),
            Column::Category(v) => v.len(),
            Column::Identifier(v) => v.len(),
        }
    }
}

/// Declaration of one expected input column.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
    pub normalize: Normalize,
}

impl ColumnSpec {
    fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            normalize: Normalize::Keep,
        }
    }

    pub fn amount(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Amount)
    }

    pub fn flag(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Flag)
    }

    pub fn timestamp(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Timestamp)
    }

    pub fn category(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Category)
    }

    pub fn identifier(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Identifier)
    }

    /// The column may be absent from the input.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn trimmed(mut self) -> Self {
        self.normalize = Normalize::Trim;
        self
    }

    pub fn lowercased(mut self) -> Self {
        self.normalize = Normalize::TrimLower;
        self
    }
}

/// Ordered set of expected columns for one domain.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub columns: Vec<ColumnSpec>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }
}

/// Untyped rows as read from a CSV file or handed over by a caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Read a CSV file with a header row.
    pub fn from_csv_path(path: &Path) -> Result<Self, LedgerError> {
        let file = std::fs::File::open(path).map_err(|e| LedgerError::InputRead {
            path: path.to_path_buf(),
            source: csv::Error::from(e),
        })?;
        Self::from_reader(file).map_err(|source| LedgerError::InputRead {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read CSV data with a header row from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .from_reader(reader);

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(String::from).collect());
        }

        Ok(Self { headers, rows })
    }

    fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Where a dataset comes from. Exactly one source is expected; when both are
/// set the in-memory table takes precedence.
#[derive(Debug, Clone, Default)]
pub struct Input {
    pub csv_path: Option<PathBuf>,
    pub table: Option<RawTable>,
}

impl Input {
    pub fn csv(path: impl Into<PathBuf>) -> Self {
        Self {
            csv_path: Some(path.into()),
            table: None,
        }
    }

    pub fn table(table: RawTable) -> Self {
        Self {
            csv_path: None,
            table: Some(table),
        }
    }

    fn into_raw(self) -> Result<RawTable, LedgerError> {
        match (self.table, self.csv_path) {
            (Some(table), _) => Ok(table),
            (None, Some(path)) => RawTable::from_csv_path(&path),
            (None, None) => Err(LedgerError::MissingInput),
        }
    }
}

/// Prepared, typed table.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<(String, Column)>,
    rows: usize,
}

impl Dataset {
    /// Load an input and coerce it against a schema.
    pub fn load(input: Input, schema: &Schema) -> Result<Self, LedgerError> {
        let raw = input.into_raw()?;
        Self::from_raw(&raw, schema)
    }

    /// Coerce raw rows against a schema. Missing required columns fail fast.
    pub fn from_raw(raw: &RawTable, schema: &Schema) -> Result<Self, LedgerError> {
        let index: HashMap<&str, usize> = raw
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect();

        let rows = raw.rows.len();
        let mut columns = Vec::with_capacity(schema.columns.len());

        for spec in &schema.columns {
            let Some(&col) = index.get(spec.name) else {
                if spec.required {
                    return Err(LedgerError::missing_column(spec.name));
                }
                debug!("Optional column '{}' not present", spec.name);
                continue;
            };

            let (column, recovered) = coerce_column(raw, col, spec);
            if recovered > 0 {
                debug!(
                    "Column '{}': {} unparseable cell(s) replaced with fallback",
                    spec.name, recovered
                );
            }
            columns.push((spec.name.to_string(), column));
        }

        let extra: Vec<&str> = raw
            .headers
            .iter()
            .map(String::as_str)
            .filter(|h| !schema.columns.iter().any(|s| s.name == *h))
            .collect();
        if !extra.is_empty() {
            debug!("Ignoring undeclared columns: {}", extra.join(", "));
        }

        Ok(Self { columns, rows })
    }

    /// Add a derived column. Only preparation code holds a mutable dataset.
    pub(crate) fn insert_derived(&mut self, name: &str, column: Column) {
        debug_assert_eq!(column.len(), self.rows);
        if let Some(slot) = self.columns.iter_mut().find(|(n, _)| n == name) {
            slot.1 = column;
        } else {
            self.columns.push((name.to_string(), column));
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    fn column(&self, name: &str) -> Result<&Column, LedgerError> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| LedgerError::missing_column(name))
    }

    pub fn amounts(&self, name: &str) -> Result<&[f64], LedgerError> {
        match self.column(name)? {
            Column::Amount(v) => Ok(v),
            _ => Err(kind_error(name, ColumnKind::Amount)),
        }
    }

    pub fn flags(&self, name: &str) -> Result<&[bool], LedgerError> {
        match self.column(name)? {
            Column::Flag(v) => Ok(v),
            _ => Err(kind_error(name, ColumnKind::Flag)),
        }
    }

    pub fn timestamps(&self, name: &str) -> Result<&[Option<NaiveDateTime>], LedgerError> {
        match self.column(name)? {
            Column::Timestamp(v) => Ok(v),
            _ => Err(kind_error(name, ColumnKind::Timestamp)),
        }
    }

    pub fn categories(&self, name: &str) -> Result<&[String], LedgerError> {
        match self.column(name)? {
            Column::Category(v) => Ok(v),
            _ => Err(kind_error(name, ColumnKind::Category)),
        }
    }

    pub fn identifiers(&self, name: &str) -> Result<&[Option<String>], LedgerError> {
        match self.column(name)? {
            Column::Identifier(v) => Ok(v),
            _ => Err(kind_error(name, ColumnKind::Identifier)),
        }
    }
}

fn kind_error(name: &str, expected: ColumnKind) -> LedgerError {
    LedgerError::ColumnKind {
        column: name.to_string(),
        expected: expected.name(),
    }
}

/// Coerce one raw column; returns the column and the number of recovered cells.
fn coerce_column(raw: &RawTable, col: usize, spec: &ColumnSpec) -> (Column, usize) {
    let cells = (0..raw.rows.len()).map(|r| raw.cell(r, col));
    let mut recovered = 0;

    let column = match spec.kind {
        ColumnKind::Amount => Column::Amount(
            cells
                .map(|c| {
                    parse_amount(c).unwrap_or_else(|| {
                        recovered += 1;
                        0.0
                    })
                })
                .collect(),
        ),
        ColumnKind::Flag => Column::Flag(cells.map(parse_flag).collect()),
        ColumnKind::Timestamp => Column::Timestamp(
            cells
                .map(|c| {
                    let ts = parse_timestamp(c);
                    if ts.is_none() && !c.trim().is_empty() {
                        recovered += 1;
                    }
                    ts
                })
                .collect(),
        ),
        ColumnKind::Category => {
            Column::Category(cells.map(|c| spec.normalize.apply(c)).collect())
        }
        ColumnKind::Identifier => Column::Identifier(
            cells
                .map(|c| {
                    let value = spec.normalize.apply(c);
                    if value.trim().is_empty() {
                        None
                    } else {
                        Some(value)
                    }
                })
                .collect(),
        ),
    };

    (column, recovered)
}
