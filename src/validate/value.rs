//! Typed field values and the coercions from raw extracted text

use crate::config::ValueTypeConfig;
use crate::url::resolve_link;
use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use std::fmt;
use url::Url;

/// Scalar type a field is coerced to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Url,
}

impl From<ValueTypeConfig> for ValueType {
    fn from(config: ValueTypeConfig) -> Self {
        match config {
            ValueTypeConfig::Text => Self::Text,
            ValueTypeConfig::Integer => Self::Integer,
            ValueTypeConfig::Float => Self::Float,
            ValueTypeConfig::Boolean => Self::Boolean,
            ValueTypeConfig::Date => Self::Date,
            ValueTypeConfig::Url => Self::Url,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Url => "url",
        };
        f.write_str(name)
    }
}

/// A typed field value in a validated record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    Url(Url),
    List(Vec<Value>),
}

impl Value {
    /// Stable textual form used when building deduplication keys
    pub fn canonical(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Url(u) => u.to_string(),
            // each item is length-prefixed; distinct lists never share a form
            Self::List(items) => items
                .iter()
                .map(|item| {
                    let text = item.canonical();
                    format!("{}:{}", text.len(), text)
                })
                .collect(),
        }
    }

    /// Number used by range constraints: the value for numbers, the
    /// character count for text. Other types are not range checked.
    pub(crate) fn range_measure(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => Some(s.chars().count() as f64),
            _ => None,
        }
    }
}

/// Collapses runs of whitespace and trims both ends
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Coerces trimmed, non-empty raw text into a value of the given type
///
/// Returns None when the text cannot represent that type. `base` resolves
/// relative URLs against the page the value was extracted from.
pub fn coerce(raw: &str, value_type: ValueType, base: &Url) -> Option<Value> {
    match value_type {
        ValueType::Text => Some(Value::Text(collapse_whitespace(raw))),
        ValueType::Integer => strip_separators(raw).parse::<i64>().ok().map(Value::Integer),
        ValueType::Float => strip_separators(raw)
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::Float),
        ValueType::Boolean => parse_bool(raw).map(Value::Boolean),
        ValueType::Date => parse_date(raw).map(Value::Date),
        ValueType::Url => resolve_link(raw, base).map(Value::Url),
    }
}

/// Drops thousands separators, as statistics pages print "1,234,567"
fn strip_separators(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ',' | '_' | '\u{a0}') && !c.is_whitespace())
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "on" => Some(true),
        "false" | "no" | "n" | "0" | "off" => Some(false),
        _ => None,
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%d %B %Y", "%Y/%m/%d"];

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = collapse_whitespace(raw);

    if let Ok(datetime) = DateTime::parse_from_rfc3339(&raw) {
        return Some(datetime.date_naive());
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&raw, format).ok())
}
