//! Mapping strategies
//!
//! [`MappingStrategy`] names the six ways a field can be resolved, in the
//! registry's fixed order. [`ComputedRule`] holds the deterministic
//! derivations: each is a pure function of the record and the run's
//! computation settings, and declares the fields it needs first.
//!
//! A [`ComputationError`] is a routing signal, not a failure: the registry
//! falls through to the next strategy.

pub mod dates;
pub mod fallback;
pub mod identifiers;
pub mod paths;
pub mod physical;
pub mod pricing;

use crate::layers::ComputationSettings;
use crate::record::MetadataRecord;
use crate::types::{FieldValue, Provenance, Scope};
use paths::AssetKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a computed rule could not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComputationError {
    #[error("missing prerequisite field '{0}'")]
    MissingPrerequisite(String),

    #[error("prerequisite '{field}' unusable: {reason}")]
    InvalidPrerequisite { field: String, reason: String },

    #[error("no exchange rate configured for territory '{0}'")]
    UnknownTerritory(String),
}

/// Strategy that resolved a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MappingStrategy {
    Passthrough,
    Override { scope: Scope },
    Computed { rule: ComputedRule },
    Generative,
    Default { scope: Scope },
    Fallback,
}

impl MappingStrategy {
    /// Provenance recorded for values this strategy sets
    ///
    /// Passthrough keeps the value's existing provenance.
    pub fn provenance(&self) -> Option<Provenance> {
        match self {
            MappingStrategy::Passthrough => None,
            MappingStrategy::Override { .. } => Some(Provenance::Override),
            MappingStrategy::Computed { .. } => Some(Provenance::Computed),
            MappingStrategy::Generative => Some(Provenance::LlmCompleted),
            MappingStrategy::Default { .. } => Some(Provenance::Default),
            MappingStrategy::Fallback => Some(Provenance::Fallback),
        }
    }

    pub fn scope(&self) -> Option<Scope> {
        match self {
            MappingStrategy::Override { scope } | MappingStrategy::Default { scope } => {
                Some(*scope)
            }
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MappingStrategy::Passthrough => "passthrough",
            MappingStrategy::Override { .. } => "override",
            MappingStrategy::Computed { .. } => "computed",
            MappingStrategy::Generative => "generative",
            MappingStrategy::Default { .. } => "default",
            MappingStrategy::Fallback => "fallback",
        }
    }
}

/// Deterministic derivation of one field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ComputedRule {
    TerritorialPrice { territory: String },
    SpineWidth,
    Weight,
    PublicationDate,
    StreetDate,
    CopyrightYear,
    AssetPath { asset: AssetKind },
    Isbn10,
}

impl ComputedRule {
    /// Fields that must resolve before this rule runs
    pub fn prerequisites(&self) -> &'static [&'static str] {
        match self {
            ComputedRule::TerritorialPrice { .. } => &["list_price"],
            ComputedRule::SpineWidth => &["page_count"],
            ComputedRule::Weight => &["page_count", "trim_size"],
            ComputedRule::PublicationDate => &["intake_date"],
            ComputedRule::StreetDate | ComputedRule::CopyrightYear => &["publication_date"],
            ComputedRule::AssetPath { .. } | ComputedRule::Isbn10 => &["isbn"],
        }
    }

    pub fn compute(
        &self,
        record: &MetadataRecord,
        settings: &ComputationSettings,
    ) -> Result<FieldValue, ComputationError> {
        match self {
            ComputedRule::TerritorialPrice { territory } => {
                pricing::territorial_price(record, settings, territory)
            }
            ComputedRule::SpineWidth => physical::spine_width(record, settings),
            ComputedRule::Weight => physical::weight(record, settings),
            ComputedRule::PublicationDate => dates::publication_date(record, settings),
            ComputedRule::StreetDate => dates::street_date(record, settings),
            ComputedRule::CopyrightYear => dates::copyright_year(record),
            ComputedRule::AssetPath { asset } => paths::asset_path(record, settings, *asset),
            ComputedRule::Isbn10 => identifiers::isbn_10(record),
        }
    }
}

impl fmt::Display for ComputedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputedRule::TerritorialPrice { territory } => {
                write!(f, "territorial_price({})", territory)
            }
            ComputedRule::SpineWidth => f.write_str("spine_width"),
            ComputedRule::Weight => f.write_str("weight"),
            ComputedRule::PublicationDate => f.write_str("publication_date"),
            ComputedRule::StreetDate => f.write_str("street_date"),
            ComputedRule::CopyrightYear => f.write_str("copyright_year"),
            ComputedRule::AssetPath { asset } => write!(f, "asset_path({})", asset),
            ComputedRule::Isbn10 => f.write_str("isbn_10"),
        }
    }
}

/// Built-in rule table: field name → rule
///
/// Territorial price fields follow the configured territories.
pub fn builtin_rules(settings: &ComputationSettings) -> Vec<(String, ComputedRule)> {
    let mut rules: Vec<(String, ComputedRule)> = settings
        .territories
        .keys()
        .map(|territory| {
            (
                ComputationSettings::price_field(territory),
                ComputedRule::TerritorialPrice {
                    territory: territory.clone(),
                },
            )
        })
        .collect();

    rules.extend([
        ("spine_width".to_string(), ComputedRule::SpineWidth),
        ("weight".to_string(), ComputedRule::Weight),
        ("publication_date".to_string(), ComputedRule::PublicationDate),
        ("street_date".to_string(), ComputedRule::StreetDate),
        ("copyright_year".to_string(), ComputedRule::CopyrightYear),
        ("isbn_10".to_string(), ComputedRule::Isbn10),
    ]);
    rules.extend(AssetKind::ALL.iter().map(|asset| {
        (
            asset.field_name().to_string(),
            ComputedRule::AssetPath { asset: *asset },
        )
    }));
    rules
}

// ============================================================================
// Prerequisite access
// ============================================================================

fn prerequisite<'a>(
    record: &'a MetadataRecord,
    field: &str,
) -> Result<&'a FieldValue, ComputationError> {
    record
        .value(field)
        .filter(|v| !v.is_empty() && !v.is_null_valid())
        .ok_or_else(|| ComputationError::MissingPrerequisite(field.to_string()))
}

fn invalid(field: &str, reason: impl Into<String>) -> ComputationError {
    ComputationError::InvalidPrerequisite {
        field: field.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn prerequisite_decimal(
    record: &MetadataRecord,
    field: &str,
) -> Result<Decimal, ComputationError> {
    let value = prerequisite(record, field)?;
    value
        .as_decimal()
        .ok_or_else(|| invalid(field, format!("'{}' is not a number", value.render())))
}

pub(crate) fn prerequisite_positive_integer(
    record: &MetadataRecord,
    field: &str,
) -> Result<i64, ComputationError> {
    let value = prerequisite(record, field)?;
    match value.as_integer() {
        Some(i) if i > 0 => Ok(i),
        _ => Err(invalid(
            field,
            format!("'{}' is not a positive whole number", value.render()),
        )),
    }
}

pub(crate) fn prerequisite_date(
    record: &MetadataRecord,
    field: &str,
) -> Result<chrono::NaiveDate, ComputationError> {
    let value = prerequisite(record, field)?;
    value
        .as_date()
        .ok_or_else(|| invalid(field, format!("'{}' is not a calendar date", value.render())))
}

pub(crate) fn prerequisite_text(
    record: &MetadataRecord,
    field: &str,
) -> Result<String, ComputationError> {
    prerequisite(record, field).map(FieldValue::render)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules_cover_territories_and_assets() {
        let settings = ComputationSettings::default();
        let rules = builtin_rules(&settings);
        let names: Vec<&str> = rules.iter().map(|(n, _)| n.as_str()).collect();
        for expected in [
            "us_list_price",
            "jp_list_price",
            "spine_width",
            "weight",
            "publication_date",
            "street_date",
            "cover_path",
            "interior_path",
            "jacket_path",
            "isbn_10",
        ] {
            assert!(names.contains(&expected), "{}", expected);
        }
    }

    #[test]
    fn test_missing_prerequisite_is_routing_signal() {
        let record = MetadataRecord::new();
        let err = ComputedRule::SpineWidth
            .compute(&record, &ComputationSettings::default())
            .unwrap_err();
        assert_eq!(err, ComputationError::MissingPrerequisite("page_count".into()));
    }

    #[test]
    fn test_null_valid_prerequisite_counts_as_missing() {
        let mut record = MetadataRecord::new();
        record
            .assign("page_count", FieldValue::NullValid, Provenance::Fallback, None)
            .unwrap();
        let err = ComputedRule::SpineWidth
            .compute(&record, &ComputationSettings::default())
            .unwrap_err();
        assert!(matches!(err, ComputationError::MissingPrerequisite(_)));
    }

    #[test]
    fn test_strategy_provenance() {
        assert_eq!(MappingStrategy::Passthrough.provenance(), None);
        assert_eq!(
            MappingStrategy::Override {
                scope: Scope::Imprint
            }
            .provenance(),
            Some(Provenance::Override)
        );
        assert_eq!(
            MappingStrategy::Generative.provenance(),
            Some(Provenance::LlmCompleted)
        );
        assert_eq!(
            MappingStrategy::Default {
                scope: Scope::Global
            }
            .scope(),
            Some(Scope::Global)
        );
    }

    #[test]
    fn test_rule_display() {
        let rule = ComputedRule::TerritorialPrice {
            territory: "uk".into(),
        };
        assert_eq!(rule.to_string(), "territorial_price(uk)");
    }
}
