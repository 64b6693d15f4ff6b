//! Per-field rules
//!
//! Derived from the field's schema entry:
//! 1. **Completeness**: hard-required fields must not be null-valid
//! 2. **Kind**: ISBN checksum, integer, decimal, positive price, calendar date
//! 3. **Pattern**: the schema regex
//! 4. **Vocabulary**: membership in the controlled code set
//! 5. **Length**: `max_length` in characters
//!
//! A failed rule on a hard-required field is critical; elsewhere it is an
//! error. Suggestions are offered where an unambiguous repair exists.

use super::ValidationResult;
use crate::schema::{FieldSchema, FieldSpec, Vocabulary};
use crate::strategies::identifiers::{
    is_valid_isbn10, is_valid_isbn13, isbn10_to_isbn13, isbn13_check_digit, normalize_isbn,
};
use crate::types::{FieldKind, FieldValue, Severity};
use bookfeed_common::config::ValidationConfig;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Date spellings accepted as suggestions, never as valid values
const ALTERNATE_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y"];

pub fn check_field(
    spec: &FieldSpec,
    value: Option<&FieldValue>,
    schema: &FieldSchema,
    config: &ValidationConfig,
) -> Vec<ValidationResult> {
    let failure = failure_severity(spec);
    let field = spec.name.as_str();

    let value = match value {
        None => {
            return vec![ValidationResult::fail(
                field,
                "completeness",
                failure,
                "Field is absent from the record",
            )]
        }
        Some(FieldValue::NullValid) if spec.hard_required => {
            return vec![ValidationResult::fail(
                field,
                "completeness",
                Severity::Critical,
                "Required field has no value",
            )]
        }
        Some(FieldValue::NullValid) => {
            return vec![ValidationResult::pass(field, "completeness")
                .with_message("Optional field intentionally empty")]
        }
        Some(value) => value,
    };

    let mut results = vec![ValidationResult::pass(field, "completeness")];
    if let Some(result) = check_kind(spec, value, failure) {
        results.push(result);
    }

    let text = value.render();
    if let Some(pattern) = schema.pattern(field) {
        results.push(if pattern.is_match(&text) {
            ValidationResult::pass(field, "pattern")
        } else {
            let repaired = text.trim().to_uppercase();
            let result = ValidationResult::fail(
                field,
                "pattern",
                failure,
                format!("'{}' does not match the required format {}", text, pattern.as_str()),
            );
            if repaired != text && pattern.is_match(&repaired) {
                result.with_suggestion(FieldValue::Text(repaired))
            } else {
                result
            }
        });
    }

    if let Some(vocabulary) = schema.field_vocabulary(field) {
        results.push(if vocabulary.contains(&text) {
            ValidationResult::pass(field, "vocabulary")
        } else {
            let result = ValidationResult::fail(
                field,
                "vocabulary",
                failure,
                format!(
                    "'{}' is not in the {} vocabulary",
                    text,
                    spec.vocabulary.as_deref().unwrap_or(field)
                ),
            );
            match nearest_code(&text, vocabulary, config.suggestion_threshold) {
                Some(code) => result.with_suggestion(FieldValue::Text(code)),
                None => result,
            }
        });
    }

    if let Some(max) = spec.max_length {
        let length = text.chars().count();
        results.push(if length <= max {
            ValidationResult::pass(field, "max_length")
        } else {
            ValidationResult::fail(
                field,
                "max_length",
                failure,
                format!("{} characters exceeds the limit of {}", length, max),
            )
            .with_suggestion(FieldValue::Text(truncate_at_word(&text, max)))
        });
    }

    results
}

fn failure_severity(spec: &FieldSpec) -> Severity {
    if spec.hard_required {
        Severity::Critical
    } else {
        Severity::Error
    }
}

fn check_kind(spec: &FieldSpec, value: &FieldValue, failure: Severity) -> Option<ValidationResult> {
    let field = spec.name.as_str();
    let result = match spec.kind {
        FieldKind::Isbn => check_isbn(field, &value.render(), failure),
        FieldKind::Integer => match value.as_integer() {
            Some(_) => ValidationResult::pass(field, "integer"),
            None => ValidationResult::fail(
                field,
                "integer",
                failure,
                format!("'{}' is not a whole number", value.render()),
            ),
        },
        FieldKind::Decimal => match value.as_decimal() {
            Some(_) => ValidationResult::pass(field, "decimal"),
            None => ValidationResult::fail(
                field,
                "decimal",
                failure,
                format!("'{}' is not a number", value.render()),
            ),
        },
        FieldKind::Price => match value.as_decimal() {
            Some(amount) if amount > Decimal::ZERO => ValidationResult::pass(field, "price"),
            Some(_) => ValidationResult::fail(field, "price", failure, "Price must be positive"),
            None => ValidationResult::fail(
                field,
                "price",
                failure,
                format!("'{}' is not a price", value.render()),
            ),
        },
        FieldKind::Date => match value.as_date() {
            Some(_) => ValidationResult::pass(field, "date"),
            None => {
                let text = value.render();
                let result = ValidationResult::fail(
                    field,
                    "date",
                    failure,
                    format!("'{}' is not a YYYY-MM-DD calendar date", text),
                );
                match parse_alternate_date(&text) {
                    Some(date) => result.with_suggestion(FieldValue::Date(date)),
                    None => result,
                }
            }
        },
        FieldKind::Text | FieldKind::Code | FieldKind::Path => return None,
    };
    Some(result)
}

fn check_isbn(field: &str, raw: &str, failure: Severity) -> ValidationResult {
    let isbn = normalize_isbn(raw);
    if is_valid_isbn13(&isbn) {
        return ValidationResult::pass(field, "isbn_checksum");
    }

    let result = ValidationResult::fail(
        field,
        "isbn_checksum",
        failure,
        format!("'{}' is not a valid ISBN-13", raw),
    );
    if is_valid_isbn10(&isbn) {
        return match isbn10_to_isbn13(&isbn) {
            Some(converted) => result
                .with_message(format!("'{}' is an ISBN-10; the catalog requires ISBN-13", raw))
                .with_suggestion(FieldValue::Text(converted)),
            None => result,
        };
    }
    if isbn.len() == 13 && isbn.is_ascii() {
        if let Some(check) = isbn13_check_digit(&isbn[..12]) {
            return result
                .with_message(format!("'{}' has a wrong check digit (expected {})", raw, check))
                .with_suggestion(FieldValue::Text(format!("{}{}", &isbn[..12], check)));
        }
    }
    result
}

fn parse_alternate_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    ALTERNATE_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Closest vocabulary code to a value
///
/// Case-insensitive code or label matches win outright; otherwise the most
/// similar code or label at or above the threshold.
pub fn nearest_code(value: &str, vocabulary: &Vocabulary, threshold: f64) -> Option<String> {
    let needle = value.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    if let Some((code, _)) = vocabulary
        .entries()
        .find(|(code, label)| code.to_lowercase() == needle || label.to_lowercase() == needle)
    {
        return Some(code.to_string());
    }

    let mut best: Option<(&str, f64)> = None;
    for (code, label) in vocabulary.entries() {
        let score = strsim::normalized_levenshtein(&needle, &code.to_lowercase())
            .max(strsim::normalized_levenshtein(&needle, &label.to_lowercase()));
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((code, score));
        }
    }
    best.filter(|(_, score)| *score >= threshold)
        .map(|(code, _)| code.to_string())
}

/// Cut text to at most `max` characters, ending on a word boundary
pub fn truncate_at_word(text: &str, max: usize) -> String {
    let cut: String = text.chars().take(max).collect();
    let at_boundary = text
        .chars()
        .nth(max)
        .map_or(true, char::is_whitespace);
    let kept = if at_boundary {
        cut.as_str()
    } else {
        match cut.rfind(char::is_whitespace) {
            Some(idx) if idx > 0 => &cut[..idx],
            _ => cut.as_str(),
        }
    };
    kept.trim_end_matches(|c: char| c.is_whitespace() || ",;:-".contains(c))
        .to_string()
}
