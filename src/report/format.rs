//! Cell presentation for the Markdown renderer.

use crate::models::Value;
use serde::{Deserialize, Serialize};

/// How numeric cells are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    /// Prefix for amount cells, e.g. `₹` or `$`.
    #[serde(default)]
    pub currency_symbol: String,

    /// Group the integer part of amounts and numbers in thousands.
    #[serde(default = "default_thousands_separator")]
    pub thousands_separator: bool,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            currency_symbol: String::new(),
            thousands_separator: default_thousands_separator(),
        }
    }
}

fn default_thousands_separator() -> bool {
    true
}

impl Presentation {
    /// Render one cell.
    pub fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Amount(x) => {
                let digits = self.decimal(*x);
                match digits.strip_prefix('-') {
                    Some(rest) => format!("-{}{}", self.currency_symbol, rest),
                    None => format!("{}{}", self.currency_symbol, digits),
                }
            }
            Value::Number(x) => self.decimal(*x),
            other => other.to_string(),
        }
    }

    fn decimal(&self, x: f64) -> String {
        let plain = format!("{:.2}", x);
        if self.thousands_separator {
            group_thousands(&plain)
        } else {
            plain
        }
    }
}

/// Insert `,` between groups of three digits in the integer part of a
/// formatted number.
pub fn group_thousands(formatted: &str) -> String {
    let (sign, unsigned) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (int_part, frac_part) = match unsigned.find('.') {
        Some(dot) => unsigned.split_at(dot),
        None => (unsigned, ""),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}{}{}", sign, grouped, frac_part)
}

/// Escape characters that would break a pipe-table cell.
pub fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands("1234567.89"), "1,234,567.89");
        assert_eq!(group_thousands("-1000.00"), "-1,000.00");
        assert_eq!(group_thousands("999.50"), "999.50");
        assert_eq!(group_thousands("12"), "12");
    }

    #[test]
    fn test_format_amount_with_symbol() {
        let p = Presentation {
            currency_symbol: "₹".to_string(),
            thousands_separator: true,
        };
        assert_eq!(p.format_value(&Value::Amount(15000.5)), "₹15,000.50");
        assert_eq!(p.format_value(&Value::Amount(-30.0)), "-₹30.00");
        assert_eq!(p.format_value(&Value::Percent(12.5)), "12.50%");
        assert_eq!(p.format_value(&Value::Int(12000)), "12000");
    }

    #[test]
    fn test_format_without_grouping() {
        let p = Presentation {
            currency_symbol: String::new(),
            thousands_separator: false,
        };
        assert_eq!(p.format_value(&Value::Amount(1234.0)), "1234.00");
        assert_eq!(p.format_value(&Value::Number(1234.5)), "1234.50");
        assert_eq!(p.format_value(&Value::Empty), "");
    }

    #[test]
    fn test_escape_cell() {
        assert_eq!(escape_cell("a|b"), "a\\|b");
        assert_eq!(escape_cell("line\nbreak"), "line break");
    }
}
