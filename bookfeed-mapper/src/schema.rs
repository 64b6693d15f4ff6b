//! Distributor field schema
//!
//! The external catalog owns column order, field kinds, which fields are
//! hard-required, and the controlled vocabularies. The engine reads it from
//! a TOML document; the full 119-column catalog schema is built in.
//!
//! # Document format
//! ```toml
//! [[field]]
//! name = "subject_code"
//! column = "BISAC Category"
//! kind = "code"
//! vocabulary = "bisac"
//! hard_required = true
//! subjective = true
//! fallback = "NON000000"
//!
//! [vocabularies]
//! yes_no = ["Yes", "No"]
//!
//! [vocabularies.bisac]
//! FIC000000 = "Fiction / General"
//! ```

use crate::error::{MapperError, MapperResult};
use crate::types::FieldKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

const BUILTIN_SCHEMA: &str = include_str!("../schema/catalog_fields.toml");

/// One catalog column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    /// Canonical key (lowercase snake case)
    pub name: String,
    /// Export column header; defaults to the name
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub hard_required: bool,
    /// No deterministic derivation; eligible for generative completion
    #[serde(default)]
    pub subjective: bool,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub vocabulary: Option<String>,
    /// Deterministic fallback template
    #[serde(default)]
    pub fallback: Option<String>,
    /// Currency for price fields
    #[serde(default)]
    pub currency: Option<String>,
}

impl FieldSpec {
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }

    /// Readable label used in prompts
    pub fn label(&self) -> String {
        self.column_name().to_lowercase()
    }
}

/// Controlled vocabulary: code → display label
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Vocabulary {
    entries: BTreeMap<String, String>,
}

impl Vocabulary {
    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn label(&self, code: &str) -> Option<&str> {
        self.entries.get(code).map(String::as_str)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VocabularyEntry {
    Codes(Vec<String>),
    Labeled(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDocument {
    #[serde(default, rename = "field")]
    fields: Vec<FieldSpec>,
    #[serde(default)]
    vocabularies: BTreeMap<String, VocabularyEntry>,
}

/// Loaded distributor schema
#[derive(Debug, Clone)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
    vocabularies: BTreeMap<String, Vocabulary>,
    patterns: HashMap<String, Regex>,
}

impl FieldSchema {
    /// Built-in 119-column catalog schema
    pub fn builtin() -> MapperResult<Self> {
        Self::from_toml_str(BUILTIN_SCHEMA)
    }

    /// Load a schema document from disk
    pub fn load(path: &Path) -> MapperResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MapperError::ConfigurationLoad(format!("Read schema {} failed: {}", path.display(), e))
        })?;
        let schema = Self::from_toml_str(&content).map_err(|e| match e {
            MapperError::ConfigurationLoad(msg) => {
                MapperError::ConfigurationLoad(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        info!(
            "Loaded field schema from {} ({} fields)",
            path.display(),
            schema.len()
        );
        Ok(schema)
    }

    /// Parse and check a schema document
    pub fn from_toml_str(content: &str) -> MapperResult<Self> {
        let document: SchemaDocument = toml::from_str(content)
            .map_err(|e| MapperError::ConfigurationLoad(format!("Invalid schema: {}", e)))?;

        let vocabularies: BTreeMap<String, Vocabulary> = document
            .vocabularies
            .into_iter()
            .map(|(name, entry)| {
                let entries = match entry {
                    VocabularyEntry::Codes(codes) => {
                        codes.into_iter().map(|c| (c.clone(), c)).collect()
                    }
                    VocabularyEntry::Labeled(map) => map,
                };
                (name, Vocabulary { entries })
            })
            .collect();

        let mut index = HashMap::new();
        let mut patterns = HashMap::new();
        for (i, spec) in document.fields.iter().enumerate() {
            if !is_canonical_name(&spec.name) {
                return Err(MapperError::ConfigurationLoad(format!(
                    "Field name '{}' must be lowercase snake case",
                    spec.name
                )));
            }
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(MapperError::ConfigurationLoad(format!(
                    "Duplicate schema field '{}'",
                    spec.name
                )));
            }
            if let Some(vocab) = &spec.vocabulary {
                if !vocabularies.contains_key(vocab) {
                    return Err(MapperError::ConfigurationLoad(format!(
                        "Field '{}' references unknown vocabulary '{}'",
                        spec.name, vocab
                    )));
                }
            }
            if let Some(pattern) = &spec.pattern {
                let regex = Regex::new(pattern).map_err(|e| {
                    MapperError::ConfigurationLoad(format!(
                        "Field '{}' has invalid pattern: {}",
                        spec.name, e
                    ))
                })?;
                patterns.insert(spec.name.clone(), regex);
            }
        }

        if document.fields.is_empty() {
            return Err(MapperError::ConfigurationLoad(
                "Schema defines no fields".to_string(),
            ));
        }

        Ok(Self {
            fields: document.fields,
            index,
            vocabularies,
            patterns,
        })
    }

    /// Fields in export column order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(FieldSpec::column_name).collect()
    }

    pub fn vocabulary(&self, name: &str) -> Option<&Vocabulary> {
        self.vocabularies.get(name)
    }

    /// Vocabulary attached to a field
    pub fn field_vocabulary(&self, field: &str) -> Option<&Vocabulary> {
        self.get(field)
            .and_then(|spec| spec.vocabulary.as_deref())
            .and_then(|name| self.vocabularies.get(name))
    }

    pub fn pattern(&self, field: &str) -> Option<&Regex> {
        self.patterns.get(field)
    }

    pub fn subjective_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.subjective)
    }
}

fn is_canonical_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
