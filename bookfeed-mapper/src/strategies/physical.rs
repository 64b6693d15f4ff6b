//! Physical specification formulas
//!
//! - spine width (in) = page count × page thickness, 3 dp
//! - weight (lb) = page count × trim area × paper weight per sq in per page, 2 dp

use super::{prerequisite_positive_integer, prerequisite_text, ComputationError};
use crate::layers::ComputationSettings;
use crate::record::MetadataRecord;
use crate::types::FieldValue;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use std::sync::OnceLock;

/// Trim width × height in inches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimSize {
    pub width: Decimal,
    pub height: Decimal,
}

impl TrimSize {
    /// Square inches, `None` when out of range
    pub fn area(&self) -> Option<Decimal> {
        self.width.checked_mul(self.height)
    }
}

fn trim_regex() -> Option<&'static Regex> {
    static TRIM: OnceLock<Option<Regex>> = OnceLock::new();
    TRIM.get_or_init(|| {
        Regex::new(
            r#"^\s*(\d+(?:\.\d+)?)\s*(?:in(?:ches)?|")?\s*[xX×]\s*(\d+(?:\.\d+)?)\s*(?:in(?:ches)?|")?\s*$"#,
        )
        .ok()
    })
    .as_ref()
}

/// Parse trim text such as `6x9`, `6 x 9 in` or `5.5X8.5`
pub fn parse_trim(text: &str) -> Option<TrimSize> {
    let caps = trim_regex()?.captures(text)?;
    let width = Decimal::from_str(caps.get(1)?.as_str()).ok()?;
    let height = Decimal::from_str(caps.get(2)?.as_str()).ok()?;
    if width.is_zero() || height.is_zero() {
        return None;
    }
    Some(TrimSize { width, height })
}

pub fn spine_width(
    record: &MetadataRecord,
    settings: &ComputationSettings,
) -> Result<FieldValue, ComputationError> {
    let pages = prerequisite_positive_integer(record, "page_count")?;
    let width = Decimal::from(pages)
        .checked_mul(settings.page_thickness_in)
        .ok_or_else(|| out_of_range("page_count", pages))?
        .round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero);
    Ok(FieldValue::Decimal(width))
}

pub fn weight(
    record: &MetadataRecord,
    settings: &ComputationSettings,
) -> Result<FieldValue, ComputationError> {
    let pages = prerequisite_positive_integer(record, "page_count")?;
    let trim_text = prerequisite_text(record, "trim_size")?;
    let trim = parse_trim(&trim_text).ok_or_else(|| ComputationError::InvalidPrerequisite {
        field: "trim_size".to_string(),
        reason: format!("cannot parse '{}'", trim_text),
    })?;

    let area = trim
        .area()
        .ok_or_else(|| out_of_range("trim_size", &trim_text))?;
    let pounds = Decimal::from(pages)
        .checked_mul(area)
        .and_then(|d| d.checked_mul(settings.paper_weight_lb_per_sq_in))
        .ok_or_else(|| out_of_range("page_count", pages))?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    Ok(FieldValue::Decimal(pounds))
}

fn out_of_range(field: &str, value: impl std::fmt::Display) -> ComputationError {
    ComputationError::InvalidPrerequisite {
        field: field.to_string(),
        reason: format!("'{}' is out of range", value),
    }
}
