//! Core value types shared by every tier of the engine
//!
//! - [`FieldValue`]: typed catalog cell value, including the explicit
//!   `NullValid` placeholder
//! - [`Provenance`]: why a field holds its value
//! - [`Scope`]: configuration layer identity and precedence rank
//! - [`Severity`]: four-level classification for validation and log events
//! - [`FieldKind`]: schema-declared kind used for coercion and format checks

use crate::strategies::pricing::format_amount;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Date formats accepted from collaborators, ISO first
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

/// Configuration layer scope
///
/// Precedence: imprint > publisher > global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Publisher,
    Imprint,
}

impl Scope {
    /// Scopes in resolution order (highest precedence first)
    pub const PRECEDENCE: [Scope; 3] = [Scope::Imprint, Scope::Publisher, Scope::Global];

    /// Precedence rank; 0 is reserved for values not set by an override
    pub fn rank(self) -> u8 {
        match self {
            Scope::Global => 1,
            Scope::Publisher => 2,
            Scope::Imprint => 3,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::Global => "global",
            Scope::Publisher => "publisher",
            Scope::Imprint => "imprint",
        };
        f.write_str(name)
    }
}

/// Recorded reason a field holds its current value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Explicit,
    Override,
    Computed,
    LlmCompleted,
    Default,
    Fallback,
}

impl Provenance {
    pub const ALL: [Provenance; 6] = [
        Provenance::Explicit,
        Provenance::Override,
        Provenance::Computed,
        Provenance::LlmCompleted,
        Provenance::Default,
        Provenance::Fallback,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Explicit => "explicit",
            Provenance::Override => "override",
            Provenance::Computed => "computed",
            Provenance::LlmCompleted => "llm-completed",
            Provenance::Default => "default",
            Provenance::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of validation results and log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema-declared field kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Integer,
    Decimal,
    Price,
    Date,
    Isbn,
    Code,
    Path,
}

/// Typed field value
///
/// `NullValid` is the explicit "intentionally empty" marker: a field holding
/// it is populated, unlike an absent field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Price { amount: Decimal, currency: String },
    Date(NaiveDate),
    NullValid,
}

impl FieldValue {
    /// Empty text counts as absent; `NullValid` does not
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }

    pub fn is_null_valid(&self) -> bool {
        matches!(self, FieldValue::NullValid)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Integer(i) => Some(Decimal::from(*i)),
            FieldValue::Decimal(d) => Some(*d),
            FieldValue::Price { amount, .. } => Some(*amount),
            FieldValue::Text(s) => parse_decimal(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            FieldValue::Text(s) => parse_date(s),
            _ => None,
        }
    }

    /// Catalog cell text
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Decimal(d) => d.normalize().to_string(),
            FieldValue::Price { amount, currency } => format_amount(*amount, currency),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::NullValid => String::new(),
        }
    }

    /// Convert into the field's declared kind where the conversion is lossless
    ///
    /// Values that cannot be converted are returned unchanged; the validator
    /// reports them.
    pub fn coerce(self, kind: FieldKind, currency: &str) -> FieldValue {
        match (kind, self) {
            (_, FieldValue::NullValid) => FieldValue::NullValid,
            (FieldKind::Integer, value) => match value.as_integer() {
                Some(i) => FieldValue::Integer(i),
                None => value,
            },
            (FieldKind::Decimal, FieldValue::Price { amount, .. }) => FieldValue::Decimal(amount),
            (FieldKind::Decimal, value) => match value.as_decimal() {
                Some(d) => FieldValue::Decimal(d),
                None => value,
            },
            (FieldKind::Price, value @ FieldValue::Price { .. }) => value,
            (FieldKind::Price, value) => match value.as_decimal() {
                Some(amount) => FieldValue::Price {
                    amount,
                    currency: currency.to_string(),
                },
                None => value,
            },
            (FieldKind::Date, value) => match value.as_date() {
                Some(d) => FieldValue::Date(d),
                None => value,
            },
            (_, FieldValue::Text(s)) => FieldValue::Text(s.trim().to_string()),
            (_, value) => FieldValue::Text(value.render()),
        }
    }

    /// Convert a collaborator-supplied JSON value
    ///
    /// Arrays of scalars join with "; " (keyword lists); nulls, objects and
    /// nested arrays are not values.
    pub fn from_json(value: &serde_json::Value) -> Option<FieldValue> {
        match value {
            serde_json::Value::String(s) => Some(FieldValue::Text(s.clone())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(FieldValue::Integer(i))
                } else {
                    Decimal::from_str(&n.to_string()).ok().map(FieldValue::Decimal)
                }
            }
            serde_json::Value::Bool(b) => Some(FieldValue::Text(b.to_string())),
            serde_json::Value::Array(items) => {
                let parts: Option<Vec<String>> = items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
                        scalar => FieldValue::from_json(scalar).map(|v| v.render()),
                    })
                    .collect();
                parts.map(|p| FieldValue::Text(p.join("; ")))
            }
            serde_json::Value::Null | serde_json::Value::Object(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::NullValid => f.write_str("<null-valid>"),
            other => f.write_str(&other.render()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Integer(i64::from(i))
    }
}

impl From<Decimal> for FieldValue {
    fn from(d: Decimal) -> Self {
        FieldValue::Decimal(d)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        FieldValue::Date(d)
    }
}

/// Parse a decimal, tolerating a leading currency symbol and thousands separators
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .trim()
        .trim_start_matches(['$', '£', '€', '¥'])
        .chars()
        .filter(|c| *c != ',')
        .collect();
    Decimal::from_str(cleaned.trim()).ok()
}

/// Parse a calendar date in one of the accepted formats
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Decimal from a configuration float, via its shortest round-trip text
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    Decimal::from_str(&value.to_string()).ok()
}
