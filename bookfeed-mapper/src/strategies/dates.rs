//! Date computation
//!
//! Calendar dates only; offsets are whole days.

use super::{prerequisite_date, ComputationError};
use crate::layers::ComputationSettings;
use crate::record::MetadataRecord;
use crate::types::FieldValue;
use chrono::{Datelike, Duration, NaiveDate};

/// Manuscript intake date supplied by the intake tooling
pub const INTAKE_DATE_FIELD: &str = "intake_date";

fn offset(field: &str, date: NaiveDate, days: i64) -> Result<NaiveDate, ComputationError> {
    Duration::try_days(days)
        .and_then(|d| date.checked_add_signed(d))
        .ok_or_else(|| ComputationError::InvalidPrerequisite {
            field: field.to_string(),
            reason: format!("{} + {} days is out of range", date, days),
        })
}

pub fn publication_date(
    record: &MetadataRecord,
    settings: &ComputationSettings,
) -> Result<FieldValue, ComputationError> {
    let intake = prerequisite_date(record, INTAKE_DATE_FIELD)?;
    offset(INTAKE_DATE_FIELD, intake, settings.publication_offset_days).map(FieldValue::Date)
}

pub fn street_date(
    record: &MetadataRecord,
    settings: &ComputationSettings,
) -> Result<FieldValue, ComputationError> {
    let publication = prerequisite_date(record, "publication_date")?;
    offset("publication_date", publication, settings.street_date_offset_days).map(FieldValue::Date)
}

pub fn copyright_year(record: &MetadataRecord) -> Result<FieldValue, ComputationError> {
    let publication = prerequisite_date(record, "publication_date")?;
    Ok(FieldValue::Integer(i64::from(publication.year())))
}
