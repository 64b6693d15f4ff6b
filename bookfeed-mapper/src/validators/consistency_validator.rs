//! Cross-field consistency checks
//!
//! # Consistency Checks
//! 1. **Price ratio**: each territorial price is positive and within
//!    `[price_ratio_min, price_ratio_max]` × (base price × exchange rate)
//! 2. **Date order**: street date is not before the publication date
//! 3. **Page count**: positive
//! 4. **Spine width**: within 0.05 in of page count × page thickness
//! 5. **ISBN pair**: the ISBN-10 is the 978-prefixed ISBN-13's counterpart
//!
//! Every check is skipped when a field it reads is absent or null-valid.
//! Failures are warnings; they never block export.

use super::ValidationResult;
use crate::layers::ComputationSettings;
use crate::record::MetadataRecord;
use crate::strategies::identifiers::{isbn13_to_isbn10, normalize_isbn};
use crate::strategies::pricing::BASE_PRICE_FIELD;
use crate::types::{decimal_from_f64, FieldValue, Severity};
use bookfeed_common::config::ValidationConfig;
use rust_decimal::{Decimal, RoundingStrategy};

/// Allowed spine width deviation in inches
const SPINE_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

pub struct ConsistencyValidator<'a> {
    settings: &'a ComputationSettings,
    config: &'a ValidationConfig,
}

impl<'a> ConsistencyValidator<'a> {
    pub fn new(settings: &'a ComputationSettings, config: &'a ValidationConfig) -> Self {
        Self { settings, config }
    }

    pub fn check(&self, record: &MetadataRecord) -> Vec<ValidationResult> {
        let mut results = Vec::new();
        self.check_prices(record, &mut results);
        check_date_order(record, &mut results);
        check_page_count(record, &mut results);
        self.check_spine(record, &mut results);
        check_isbn_pair(record, &mut results);
        results
    }

    fn check_prices(&self, record: &MetadataRecord, results: &mut Vec<ValidationResult>) {
        let Some(base) = present(record, BASE_PRICE_FIELD).and_then(FieldValue::as_decimal) else {
            return;
        };
        if base <= Decimal::ZERO {
            return;
        }
        let (Some(min), Some(max)) = (
            decimal_from_f64(self.config.price_ratio_min),
            decimal_from_f64(self.config.price_ratio_max),
        ) else {
            return;
        };

        for (territory, rate) in &self.settings.territories {
            let field = ComputationSettings::price_field(territory);
            let Some(amount) = present(record, &field).and_then(FieldValue::as_decimal) else {
                continue;
            };

            let Some(expected) = base.checked_mul(rate.rate).filter(|e| !e.is_zero()) else {
                results.push(ValidationResult::fail(
                    &field,
                    "price_ratio",
                    Severity::Warning,
                    format!(
                        "Cannot convert base price {} at rate {}; ratio not checked",
                        base, rate.rate
                    ),
                ));
                continue;
            };
            let suggestion = FieldValue::Price {
                amount: expected.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
                currency: rate.currency.clone(),
            };

            if amount <= Decimal::ZERO {
                results.push(
                    ValidationResult::fail(
                        &field,
                        "price_ratio",
                        Severity::Warning,
                        "Territorial price must be positive",
                    )
                    .with_suggestion(suggestion),
                );
                continue;
            }

            let ratio = amount.checked_div(expected);
            results.push(if ratio.is_some_and(|r| r >= min && r <= max) {
                ValidationResult::pass(&field, "price_ratio")
            } else {
                ValidationResult::fail(
                    &field,
                    "price_ratio",
                    Severity::Warning,
                    format!(
                        "{} is {}× the converted base price {}; expected between {}× and {}×",
                        amount,
                        ratio
                            .map(|r| r.round_dp(2).to_string())
                            .unwrap_or_else(|| "out of range".to_string()),
                        suggestion.render(),
                        min,
                        max
                    ),
                )
                .with_suggestion(suggestion)
            });
        }
    }

    fn check_spine(&self, record: &MetadataRecord, results: &mut Vec<ValidationResult>) {
        let (Some(spine), Some(pages)) = (
            present(record, "spine_width").and_then(FieldValue::as_decimal),
            present(record, "page_count").and_then(FieldValue::as_integer),
        ) else {
            return;
        };
        if pages <= 0 {
            return;
        }

        let Some(expected) = Decimal::from(pages)
            .checked_mul(self.settings.page_thickness_in)
            .map(|d| d.round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero))
        else {
            results.push(ValidationResult::fail(
                "spine_width",
                "spine_consistency",
                Severity::Warning,
                format!("Page count {} is out of range for a spine check", pages),
            ));
            return;
        };
        let within = spine
            .checked_sub(expected)
            .is_some_and(|d| d.abs() <= SPINE_TOLERANCE);
        results.push(if within {
            ValidationResult::pass("spine_width", "spine_consistency")
        } else {
            ValidationResult::fail(
                "spine_width",
                "spine_consistency",
                Severity::Warning,
                format!(
                    "Spine width {} in does not fit {} pages (expected about {} in)",
                    spine, pages, expected
                ),
            )
            .with_suggestion(FieldValue::Decimal(expected))
        });
    }
}

/// Value that is set and not null-valid
fn present<'r>(record: &'r MetadataRecord, field: &str) -> Option<&'r FieldValue> {
    record
        .value(field)
        .filter(|v| !v.is_empty() && !v.is_null_valid())
}

fn check_date_order(record: &MetadataRecord, results: &mut Vec<ValidationResult>) {
    let (Some(publication), Some(street)) = (
        present(record, "publication_date").and_then(FieldValue::as_date),
        present(record, "street_date").and_then(FieldValue::as_date),
    ) else {
        return;
    };

    results.push(if street >= publication {
        ValidationResult::pass("street_date", "date_order")
    } else {
        ValidationResult::fail(
            "street_date",
            "date_order",
            Severity::Warning,
            format!(
                "Street date {} is before publication date {}",
                street, publication
            ),
        )
        .with_suggestion(FieldValue::Date(publication))
    });
}

fn check_page_count(record: &MetadataRecord, results: &mut Vec<ValidationResult>) {
    let Some(pages) = present(record, "page_count").and_then(FieldValue::as_integer) else {
        return;
    };
    results.push(if pages > 0 {
        ValidationResult::pass("page_count", "page_count_positive")
    } else {
        ValidationResult::fail(
            "page_count",
            "page_count_positive",
            Severity::Warning,
            format!("Page count {} must be positive", pages),
        )
    });
}

fn check_isbn_pair(record: &MetadataRecord, results: &mut Vec<ValidationResult>) {
    let (Some(isbn), Some(isbn_10)) = (present(record, "isbn"), present(record, "isbn_10")) else {
        return;
    };
    let Some(expected) = isbn13_to_isbn10(&normalize_isbn(&isbn.render())) else {
        return;
    };

    results.push(if normalize_isbn(&isbn_10.render()) == expected {
        ValidationResult::pass("isbn_10", "isbn_pair")
    } else {
        ValidationResult::fail(
            "isbn_10",
            "isbn_pair",
            Severity::Warning,
            format!("ISBN-10 does not correspond to ISBN {}", isbn.render()),
        )
        .with_suggestion(FieldValue::Text(expected))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn check(record: &MetadataRecord) -> Vec<ValidationResult> {
        let settings = ComputationSettings::default();
        let config = ValidationConfig::default();
        ConsistencyValidator::new(&settings, &config).check(record)
    }

    fn price(amount: Decimal, currency: &str) -> FieldValue {
        FieldValue::Price {
            amount,
            currency: currency.into(),
        }
    }

    #[test]
    fn test_price_within_ratio_passes() {
        let record = MetadataRecord::new()
            .with_field("list_price", price(Decimal::new(1999, 2), "USD"))
            .with_field("uk_list_price", price(Decimal::new(1499, 2), "GBP"));
        let results = check(&record);
        let uk = results.iter().find(|r| r.field == "uk_list_price").unwrap();
        assert!(uk.is_valid);
    }

    #[test]
    fn test_price_out_of_ratio_warns_with_computed_suggestion() {
        let record = MetadataRecord::new()
            .with_field("list_price", price(Decimal::new(1999, 2), "USD"))
            .with_field("jp_list_price", price(Decimal::new(500, 0), "JPY"));
        let results = check(&record);
        let jp = results.iter().find(|r| r.field == "jp_list_price").unwrap();
        assert!(!jp.is_valid);
        assert_eq!(jp.severity, Severity::Warning);
        // 19.99 × 151 = 3018.49
        assert_eq!(jp.suggested_value.as_ref().unwrap().render(), "3018");
    }

    #[test]
    fn test_unconvertible_base_price_warns() {
        let huge = Decimal::from_str_exact("70000000000000000000000000000").unwrap();
        let record = MetadataRecord::new()
            .with_field("list_price", price(huge, "USD"))
            .with_field("jp_list_price", price(Decimal::new(500, 0), "JPY"));
        let results = check(&record);
        let jp = results.iter().find(|r| r.field == "jp_list_price").unwrap();
        assert!(!jp.is_valid);
        assert_eq!(jp.severity, Severity::Warning);
        assert!(jp.suggested_value.is_none());
    }

    #[test]
    fn test_extreme_spine_width_fails_without_panicking() {
        let record = MetadataRecord::new()
            .with_field("page_count", 320)
            .with_field("spine_width", Decimal::MIN);
        let results = check(&record);
        let spine = results.iter().find(|r| r.rule == "spine_consistency").unwrap();
        assert!(!spine.is_valid);
        assert_eq!(spine.severity, Severity::Warning);
    }

    #[test]
    fn test_street_before_publication() {
        let record = MetadataRecord::new()
            .with_field("publication_date", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
            .with_field("street_date", NaiveDate::from_ymd_opt(2025, 5, 1).unwrap());
        let results = check(&record);
        let order = results.iter().find(|r| r.rule == "date_order").unwrap();
        assert!(!order.is_valid);
        assert_eq!(
            order.suggested_value,
            Some(FieldValue::Date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()))
        );
    }

    #[test]
    fn test_spine_mismatch() {
        let record = MetadataRecord::new()
            .with_field("page_count", 320)
            .with_field("spine_width", Decimal::new(15, 1));
        let results = check(&record);
        let spine = results.iter().find(|r| r.rule == "spine_consistency").unwrap();
        assert!(!spine.is_valid);
        assert_eq!(spine.suggested_value, Some(FieldValue::Decimal(Decimal::new(721, 3))));
    }

    #[test]
    fn test_isbn_pair_mismatch() {
        let record = MetadataRecord::new()
            .with_field("isbn", "9780306406157")
            .with_field("isbn_10", "0306406150");
        let results = check(&record);
        let pair = results.iter().find(|r| r.rule == "isbn_pair").unwrap();
        assert_eq!(pair.suggested_value, Some(FieldValue::Text("0306406152".into())));
    }

    #[test]
    fn test_null_valid_fields_skipped() {
        let mut record = MetadataRecord::new().with_field("page_count", 0);
        record
            .assign("street_date", FieldValue::NullValid, crate::types::Provenance::Fallback, None)
            .unwrap();
        let results = check(&record);
        assert!(results.iter().all(|r| r.rule != "date_order"));
        assert!(results
            .iter()
            .any(|r| r.rule == "page_count_positive" && !r.is_valid));
    }
}
