//! Cell coercion with local recovery.
//!
//! Every function here is total: a cell that cannot be read as the target
//! type yields the documented fallback instead of an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Naive layouts tried after RFC 3339, most specific first.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];

/// Trim/case handling applied to text columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalize {
    /// Keep the cell exactly as read.
    #[default]
    Keep,
    /// Strip surrounding whitespace.
    Trim,
    /// Strip surrounding whitespace and lowercase.
    TrimLower,
}

impl Normalize {
    pub fn apply(self, raw: &str) -> String {
        match self {
            Normalize::Keep => raw.to_string(),
            Normalize::Trim => raw.trim().to_string(),
            Normalize::TrimLower => raw.trim().to_lowercase(),
        }
    }
}

/// Parse a numeric cell. An empty cell reads as `0.0`; a non-empty cell that
/// is unreadable or non-finite gives `None` so callers can count recoveries.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => None,
    }
}

/// Boolean coercion: anything that is not a recognised truthy token is `false`.
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "t" | "1" | "yes" | "y" | "1.0"
    )
}

/// Timestamp coercion. Offsets are converted to UTC; unreadable cells are `None`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }

    // Trailing "UTC"/"Z" markers carry no offset information beyond UTC itself.
    let bare = trimmed
        .strip_suffix(" UTC")
        .or_else(|| trimmed.strip_suffix('Z'))
        .unwrap_or(trimmed);

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(bare, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(bare, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    None
}
