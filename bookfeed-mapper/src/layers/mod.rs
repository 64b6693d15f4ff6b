//! Multi-level configuration layers
//!
//! Three TOML documents (global, publisher, imprint) each carry `[defaults]`
//! and `[overrides]` maps plus optional `[prompts]` and `[computation]`
//! sections. The global document may also extend the field-name normalizer.
//!
//! # Loading rules
//! - The global layer is required
//! - A publisher or imprint path that does not exist is skipped (info log)
//! - An unreadable or structurally invalid document is fatal
//!   ([`MapperError::ConfigurationLoad`])
//!
//! The loaded [`LayerSet`] is immutable and shared by every record in a run.
//!
//! # Example
//! ```toml
//! [defaults]
//! language = "eng"
//! wholesale_discount = 40
//!
//! [overrides]
//! "Contributor One BIO" = "N/A"
//!
//! [prompts]
//! contributor_bio = ["Write a short biography of {contributor_one}."]
//!
//! [computation]
//! publication_offset_days = 120
//! ```

pub mod computation;
pub mod resolver;

pub use computation::{ComputationOverrides, ComputationSettings, TerritoryRate};
pub use resolver::{ConfigResolver, Resolution, ResolutionKind};

use crate::error::{MapperError, MapperResult};
use crate::normalizer::{FieldNameNormalizer, NormalizerBuilder};
use crate::types::{decimal_from_f64, parse_date, FieldValue, Scope};
use bookfeed_common::config::LayerPaths;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Raw layer document as written on disk
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerDocument {
    pub defaults: toml::Table,
    pub overrides: toml::Table,
    pub prompts: BTreeMap<String, PromptEntry>,
    pub computation: ComputationOverrides,
    pub normalizer: Option<NormalizerSection>,
}

/// One prompt template or an ordered list of variants
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PromptEntry {
    Single(String),
    Variants(Vec<String>),
}

impl PromptEntry {
    fn into_variants(self) -> Vec<String> {
        match self {
            PromptEntry::Single(s) => vec![s],
            PromptEntry::Variants(v) => v,
        }
    }
}

/// `[normalizer]` section (global layer only)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizerSection {
    pub stop_words: Vec<String>,
    pub synonyms: BTreeMap<String, String>,
}

impl LayerDocument {
    /// Read and parse a layer file
    pub fn read(path: &Path) -> MapperResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MapperError::ConfigurationLoad(format!("Read layer {} failed: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| MapperError::ConfigurationLoad(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Add this document's normalizer extensions to a builder
    pub fn extend_normalizer(&self, mut builder: NormalizerBuilder) -> NormalizerBuilder {
        if let Some(section) = &self.normalizer {
            for word in &section.stop_words {
                builder = builder.stop_word(word.clone());
            }
            for (variant, canonical) in &section.synonyms {
                builder = builder.synonym(variant.clone(), canonical.clone());
            }
        }
        builder
    }
}

/// One configuration layer with canonical field keys
#[derive(Debug, Clone)]
pub struct ConfigurationLayer {
    scope: Scope,
    source: Option<PathBuf>,
    defaults: BTreeMap<String, FieldValue>,
    overrides: BTreeMap<String, FieldValue>,
    prompts: BTreeMap<String, Vec<String>>,
    computation: ComputationOverrides,
}

impl ConfigurationLayer {
    /// Empty layer
    pub fn empty(scope: Scope) -> Self {
        Self {
            scope,
            source: None,
            defaults: BTreeMap::new(),
            overrides: BTreeMap::new(),
            prompts: BTreeMap::new(),
            computation: ComputationOverrides::default(),
        }
    }

    /// Build a layer from a parsed document, normalizing field keys
    pub fn from_document(
        scope: Scope,
        document: LayerDocument,
        normalizer: &FieldNameNormalizer,
    ) -> Result<Self, String> {
        if scope != Scope::Global && document.normalizer.is_some() {
            return Err("[normalizer] is only allowed in the global layer".to_string());
        }

        let defaults = scalar_map(&document.defaults, normalizer, "defaults")?;
        let overrides = scalar_map(&document.overrides, normalizer, "overrides")?;

        let mut prompts = BTreeMap::new();
        for (field, entry) in document.prompts {
            let variants = entry.into_variants();
            if variants.is_empty() || variants.iter().any(|v| v.trim().is_empty()) {
                return Err(format!("prompts.{} has an empty template", field));
            }
            prompts.insert(normalizer.normalize(&field), variants);
        }

        Ok(Self {
            scope,
            source: None,
            defaults,
            overrides,
            prompts,
            computation: document.computation,
        })
    }

    /// Parse a layer from TOML text
    pub fn from_toml_str(
        scope: Scope,
        content: &str,
        normalizer: &FieldNameNormalizer,
    ) -> MapperResult<Self> {
        LayerDocument::parse(content)
            .and_then(|doc| Self::from_document(scope, doc, normalizer))
            .map_err(|e| MapperError::ConfigurationLoad(format!("{} layer: {}", scope, e)))
    }

    pub fn with_default(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.defaults.insert(field.into(), value.into());
        self
    }

    pub fn with_override(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.overrides.insert(field.into(), value.into());
        self
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn default_value(&self, field: &str) -> Option<&FieldValue> {
        self.defaults.get(field)
    }

    pub fn override_value(&self, field: &str) -> Option<&FieldValue> {
        self.overrides.get(field)
    }

    pub fn prompt_variants(&self, field: &str) -> Option<&[String]> {
        self.prompts.get(field).map(Vec::as_slice)
    }

    pub fn computation(&self) -> &ComputationOverrides {
        &self.computation
    }

    /// Readable name for reports: the layer's imprint/publisher value or file stem
    pub fn label(&self) -> Option<String> {
        let key = match self.scope {
            Scope::Imprint => "imprint",
            Scope::Publisher => "publisher",
            Scope::Global => return None,
        };
        self.overrides
            .get(key)
            .or_else(|| self.defaults.get(key))
            .map(FieldValue::render)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                self.source
                    .as_ref()
                    .and_then(|p| p.file_stem())
                    .map(|s| s.to_string_lossy().to_string())
            })
    }
}

/// Immutable set of loaded layers for one run
#[derive(Debug, Clone)]
pub struct LayerSet {
    /// Highest precedence first
    layers: Vec<ConfigurationLayer>,
    computation: ComputationSettings,
}

impl LayerSet {
    /// Assemble loaded layers; at most one layer per scope
    pub fn new(mut layers: Vec<ConfigurationLayer>) -> MapperResult<Self> {
        layers.sort_by(|a, b| b.scope.rank().cmp(&a.scope.rank()));
        if layers.windows(2).any(|w| w[0].scope == w[1].scope) {
            return Err(MapperError::ConfigurationLoad(
                "Duplicate configuration layer scope".to_string(),
            ));
        }

        let computation = ComputationSettings::merged(layers.iter().rev().map(|l| &l.computation))
            .map_err(|e| MapperError::ConfigurationLoad(format!("[computation] {}", e)))?;

        Ok(Self {
            layers,
            computation,
        })
    }

    /// No configuration at all (compiled computation defaults only)
    pub fn empty() -> Self {
        Self {
            layers: Vec::new(),
            computation: ComputationSettings::default(),
        }
    }

    /// Layers in resolution order
    pub fn layers(&self) -> &[ConfigurationLayer] {
        &self.layers
    }

    pub fn layer(&self, scope: Scope) -> Option<&ConfigurationLayer> {
        self.layers.iter().find(|l| l.scope == scope)
    }

    pub fn computation(&self) -> &ComputationSettings {
        &self.computation
    }

    pub fn resolver(&self) -> ConfigResolver<'_> {
        ConfigResolver::new(self)
    }

    /// Prompt variants from the highest-precedence layer defining them
    pub fn prompt_overrides(&self) -> BTreeMap<String, Vec<String>> {
        let mut merged = BTreeMap::new();
        for layer in self.layers.iter().rev() {
            for (field, variants) in &layer.prompts {
                merged.insert(field.clone(), variants.clone());
            }
        }
        merged
    }

    /// Label of the most specific layer, for report recommendations
    pub fn most_specific_label(&self) -> Option<String> {
        self.layers.iter().find_map(ConfigurationLayer::label)
    }
}

/// Load the configured layers and build the run's field-name normalizer
///
/// The normalizer is built from the global layer's `[normalizer]` section
/// and the schema's canonical names before any layer keys are normalized.
pub fn load_configuration<'a, I>(
    paths: &LayerPaths,
    canonical_names: I,
) -> MapperResult<(LayerSet, FieldNameNormalizer)>
where
    I: IntoIterator<Item = &'a str>,
{
    let global_path = paths.global.as_deref().ok_or_else(|| {
        MapperError::ConfigurationLoad("No global configuration layer configured".to_string())
    })?;
    let global = LayerDocument::read(global_path)?;

    let mut documents = vec![(Scope::Global, global_path.to_path_buf(), global)];
    for (scope, path) in [
        (Scope::Publisher, paths.publisher.as_deref()),
        (Scope::Imprint, paths.imprint.as_deref()),
    ] {
        let Some(path) = path else { continue };
        if !path.exists() {
            info!(
                "No {} configuration layer at {}, skipping",
                scope,
                path.display()
            );
            continue;
        }
        documents.push((scope, path.to_path_buf(), LayerDocument::read(path)?));
    }

    let builder = documents[0]
        .2
        .extend_normalizer(FieldNameNormalizer::builder())
        .canonical_names(canonical_names);
    let normalizer = builder.build();

    let mut layers = Vec::with_capacity(documents.len());
    for (scope, path, document) in documents {
        let mut layer = ConfigurationLayer::from_document(scope, document, &normalizer)
            .map_err(|e| MapperError::ConfigurationLoad(format!("{}: {}", path.display(), e)))?;
        debug!(
            scope = %scope,
            defaults = layer.defaults.len(),
            overrides = layer.overrides.len(),
            "Configuration layer loaded"
        );
        layer.source = Some(path);
        layers.push(layer);
    }

    info!("Loaded {} configuration layer(s)", layers.len());
    Ok((LayerSet::new(layers)?, normalizer))
}

fn scalar_map(
    table: &toml::Table,
    normalizer: &FieldNameNormalizer,
    section: &str,
) -> Result<BTreeMap<String, FieldValue>, String> {
    let mut values = BTreeMap::new();
    for (key, raw) in table {
        let value = scalar_value(raw)
            .ok_or_else(|| format!("{}.{} must be a scalar value", section, key))?;
        let canonical = normalizer.normalize(key);
        if values.insert(canonical.clone(), value).is_some() {
            return Err(format!(
                "{} defines '{}' more than once (as '{}')",
                section, canonical, key
            ));
        }
    }
    Ok(values)
}

fn scalar_value(raw: &toml::Value) -> Option<FieldValue> {
    match raw {
        toml::Value::String(s) if s.is_empty() => Some(FieldValue::NullValid),
        toml::Value::String(s) => Some(FieldValue::Text(s.clone())),
        toml::Value::Integer(i) => Some(FieldValue::Integer(*i)),
        toml::Value::Float(f) => decimal_from_f64(*f).map(FieldValue::Decimal),
        toml::Value::Boolean(b) => Some(FieldValue::Text(b.to_string())),
        toml::Value::Datetime(dt) => {
            let text = dt.to_string();
            Some(
                parse_date(&text)
                    .map(FieldValue::Date)
                    .unwrap_or(FieldValue::Text(text)),
            )
        }
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}
