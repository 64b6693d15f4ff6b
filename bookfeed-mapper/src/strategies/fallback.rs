//! Deterministic fallback values
//!
//! The last strategy in the chain; it never fails. A field's schema template
//! is rendered over the record's current values, and a template that cannot
//! render (or a field without one) yields an explicit `NullValid`. The same
//! record and schema always produce the same value.

use crate::record::MetadataRecord;
use crate::schema::{FieldSchema, FieldSpec};
use crate::template;
use crate::types::FieldValue;

/// Placeholder suffix selecting a coded value's vocabulary label
const LABEL_SUFFIX: &str = ":label";

/// Look up a template placeholder against the record
///
/// `{field}` renders the field's value; `{field:label}` renders the label of
/// a coded value from the field's vocabulary.
pub fn record_lookup(record: &MetadataRecord, schema: &FieldSchema, name: &str) -> Option<String> {
    match name.strip_suffix(LABEL_SUFFIX) {
        Some(field) => {
            let code = record.text(field)?;
            let label = schema
                .field_vocabulary(field)
                .and_then(|vocab| vocab.label(&code))
                .map(str::to_string);
            label.or(Some(code))
        }
        None => record.text(name),
    }
}

pub fn fallback_value(spec: &FieldSpec, record: &MetadataRecord, schema: &FieldSchema) -> FieldValue {
    let Some(template_text) = spec.fallback.as_deref() else {
        return FieldValue::NullValid;
    };

    let rendered = template::render(template_text, |name| record_lookup(record, schema, name));
    match rendered {
        Some(text) => {
            let tidy = tidy_whitespace(&text);
            if tidy.is_empty() {
                FieldValue::NullValid
            } else {
                let currency = spec.currency.as_deref().unwrap_or("USD");
                FieldValue::Text(truncate_chars(&tidy, spec.max_length)).coerce(spec.kind, currency)
            }
        }
        None => FieldValue::NullValid,
    }
}

fn tidy_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: Option<usize>) -> String {
    match max {
        Some(max) if text.chars().count() > max => text.chars().take(max).collect(),
        _ => text.to_string(),
    }
}
