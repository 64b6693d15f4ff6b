//! Metadata record
//!
//! One book's catalog metadata: a typed value and provenance per canonical
//! field, the append-only generative completion history per subjective
//! field, and the sealed flag set on export.

use crate::completion::CompletionAttempt;
use crate::error::{MapperError, MapperResult};
use crate::normalizer::FieldNameNormalizer;
use crate::schema::FieldSchema;
use crate::types::{FieldValue, Provenance, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// A field's value together with why it holds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub value: FieldValue,
    pub provenance: Provenance,
    /// Layer that supplied an override or default
    pub scope: Option<Scope>,
    pub set_at: DateTime<Utc>,
    /// Value replaced by a validator suggestion
    #[serde(default)]
    pub auto_corrected: bool,
}

impl FieldEntry {
    pub fn new(value: FieldValue, provenance: Provenance, scope: Option<Scope>) -> Self {
        Self {
            value,
            provenance,
            scope,
            set_at: Utc::now(),
            auto_corrected: false,
        }
    }

    /// Precedence an override must exceed to replace this value
    ///
    /// Anything not set by an override ranks 0.
    pub fn override_rank(&self) -> u8 {
        match (self.provenance, self.scope) {
            (Provenance::Override, Some(scope)) => scope.rank(),
            _ => 0,
        }
    }
}

/// Book metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    id: Uuid,
    fields: BTreeMap<String, FieldEntry>,
    #[serde(default)]
    completions: BTreeMap<String, Vec<CompletionAttempt>>,
    #[serde(default)]
    sealed: bool,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
            completions: BTreeMap::new(),
            sealed: false,
        }
    }

    /// Builder: add a collaborator-supplied value
    ///
    /// Empty text is treated as absent and not stored.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set_explicit(name, value);
        self
    }

    /// Store a collaborator-supplied value with `explicit` provenance
    pub fn set_explicit(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        self.fields
            .insert(name.into(), FieldEntry::new(value, Provenance::Explicit, None));
    }

    /// Build from a JSON object of field name → value
    pub fn from_json(value: &serde_json::Value) -> MapperResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            MapperError::InvalidInput("Metadata record must be a JSON object".to_string())
        })?;

        let mut record = Self::new();
        for (name, raw) in object {
            match FieldValue::from_json(raw) {
                Some(v) => record.set_explicit(name.clone(), v),
                None if raw.is_null() => {}
                None => warn!(field = %name, "Ignoring non-scalar field value"),
            }
        }
        Ok(record)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn entry(&self, field: &str) -> Option<&FieldEntry> {
        self.fields.get(field)
    }

    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).map(|e| &e.value)
    }

    pub fn provenance(&self, field: &str) -> Option<Provenance> {
        self.fields.get(field).map(|e| e.provenance)
    }

    /// Present and not empty; `NullValid` counts as present
    pub fn has_value(&self, field: &str) -> bool {
        self.value(field).is_some_and(|v| !v.is_empty())
    }

    /// Rendered non-empty text of a field
    pub fn text(&self, field: &str) -> Option<String> {
        self.value(field)
            .filter(|v| !v.is_empty() && !v.is_null_valid())
            .map(FieldValue::render)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldEntry)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set a field resolved by the mapping registry
    ///
    /// An existing non-empty value is only replaced by an override of
    /// strictly higher precedence than the one that set it. Returns whether
    /// the value was stored.
    pub fn assign(
        &mut self,
        field: &str,
        value: FieldValue,
        provenance: Provenance,
        scope: Option<Scope>,
    ) -> MapperResult<bool> {
        self.ensure_mutable()?;

        if let Some(existing) = self.fields.get(field) {
            if !existing.value.is_empty() {
                let incoming_rank = match (provenance, scope) {
                    (Provenance::Override, Some(s)) => s.rank(),
                    _ => 0,
                };
                if incoming_rank <= existing.override_rank() {
                    debug!(field, %provenance, "Existing value kept");
                    return Ok(false);
                }
            }
        }

        self.fields
            .insert(field.to_string(), FieldEntry::new(value, provenance, scope));
        Ok(true)
    }

    /// Replace a value with a validator suggestion, keeping its provenance
    pub fn apply_correction(&mut self, field: &str, value: FieldValue) -> MapperResult<()> {
        self.ensure_mutable()?;
        let entry = self.fields.get_mut(field).ok_or_else(|| {
            MapperError::InvalidInput(format!("Cannot correct absent field '{}'", field))
        })?;
        entry.value = value;
        entry.auto_corrected = true;
        entry.set_at = Utc::now();
        Ok(())
    }

    /// Store the kind-coerced form of an existing value
    ///
    /// Provenance, scope and the auto-correction flag are untouched.
    pub fn retype(&mut self, field: &str, value: FieldValue) -> MapperResult<()> {
        self.ensure_mutable()?;
        if let Some(entry) = self.fields.get_mut(field) {
            entry.value = value;
        }
        Ok(())
    }

    /// Append generative attempts to a field's history
    pub fn append_attempts(
        &mut self,
        field: &str,
        attempts: Vec<CompletionAttempt>,
    ) -> MapperResult<()> {
        self.ensure_mutable()?;
        if attempts.is_empty() {
            return Ok(());
        }
        self.completions
            .entry(field.to_string())
            .or_default()
            .extend(attempts);
        Ok(())
    }

    pub fn completion_history(&self, field: &str) -> &[CompletionAttempt] {
        self.completions
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn completion_histories(&self) -> impl Iterator<Item = (&str, &[CompletionAttempt])> {
        self.completions
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Re-key fields by canonical name
    ///
    /// When two input names collapse to one key the first non-empty value in
    /// key order wins; the discarded names are returned.
    pub fn canonicalize(&mut self, normalizer: &FieldNameNormalizer) -> MapperResult<Vec<String>> {
        self.ensure_mutable()?;
        let mut canonical: BTreeMap<String, FieldEntry> = BTreeMap::new();
        let mut discarded = Vec::new();

        for (name, entry) in std::mem::take(&mut self.fields) {
            let key = normalizer.normalize(&name);
            match canonical.get(&key) {
                Some(existing) if !existing.value.is_empty() => {
                    warn!(field = %key, input = %name, "Duplicate input field ignored");
                    discarded.push(name);
                }
                _ => {
                    canonical.insert(key, entry);
                }
            }
        }

        self.fields = canonical;
        Ok(discarded)
    }

    /// Export as one catalog row in schema column order and seal the record
    pub fn export_row(&mut self, schema: &FieldSchema) -> MapperResult<Vec<String>> {
        self.ensure_mutable()?;
        let row = schema
            .fields()
            .iter()
            .map(|spec| self.value(&spec.name).map(FieldValue::render).unwrap_or_default())
            .collect();
        self.sealed = true;
        debug!(record_id = %self.id, "Record exported and sealed");
        Ok(row)
    }

    fn ensure_mutable(&self) -> MapperResult<()> {
        if self.sealed {
            Err(MapperError::RecordSealed(self.id))
        } else {
            Ok(())
        }
    }
}

impl Default for MetadataRecord {
    fn default() -> Self {
        Self::new()
    }
}
