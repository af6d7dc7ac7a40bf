use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref LEADING_NUMBER: Regex =
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").expect("valid number pattern");
}

/// A single stored cell value
///
/// Uploaded sheets only ever produce numbers, text or nothing. The enum is
/// untagged so stored rows serialize as plain JSON scalars.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Null,
}

/// One ingested row, keyed by header in header order
pub type Record = IndexMap<String, CellValue>;

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn empty() -> Self {
        CellValue::Text(String::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// True for empty (or whitespace-only) text
    pub fn is_blank_text(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.trim().is_empty())
    }

    /// Null, empty text, zero and NaN
    pub fn is_falsy(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Number(n) => *n == 0.0 || n.is_nan(),
        }
    }

    /// Strict numeric reading: the whole value has to be a finite number.
    pub fn as_finite_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Lenient numeric reading used for chart values.
    ///
    /// Reads the longest numeric prefix after leading whitespace, so `"12kg"`
    /// is 12. Anything unreadable or non-finite is 0.
    pub fn leading_number_or_zero(&self) -> f64 {
        let parsed = match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => parse_leading_number(s),
            CellValue::Null => None,
        };
        parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
    }

    /// Interpret a raw text field the way a CSV sheet is read: blank is
    /// nothing, numeric text becomes a number.
    pub fn from_field(field: &str) -> Self {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            return CellValue::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() && looks_numeric(trimmed) => CellValue::Number(n),
            _ => CellValue::Text(field.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Null => f.write_str("null"),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

fn parse_leading_number(s: &str) -> Option<f64> {
    LEADING_NUMBER
        .find(s.trim_start())
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

// Rust's float parser also accepts "inf", "nan" and "infinity"; sheets don't.
fn looks_numeric(s: &str) -> bool {
    LEADING_NUMBER
        .find(s)
        .is_some_and(|m| m.end() == s.len())
}
