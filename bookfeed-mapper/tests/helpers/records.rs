//! Record, layer and engine builders

use bookfeed_common::config::EngineSettings;
use bookfeed_mapper::completion::{CompletionProvider, RetryPolicy};
use bookfeed_mapper::layers::{ConfigurationLayer, LayerSet};
use bookfeed_mapper::{Engine, MetadataRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sparse record: title, author, ISBN and physical basics only
pub fn atlas_of_rain() -> MetadataRecord {
    MetadataRecord::new()
        .with_field("Title", "Atlas of Rain")
        .with_field("Author Name", "Mara Quell")
        .with_field("ISBN", "9780306406157")
        .with_field("Page Count", 320)
        .with_field("Trim", "6x9")
}

/// Every hard-required field supplied with a valid value
pub fn complete_record() -> MetadataRecord {
    MetadataRecord::new()
        .with_field("isbn", "9780306406157")
        .with_field("title", "Atlas of Rain")
        .with_field("contributor_one", "Mara Quell")
        .with_field("contributor_one_role", "A01")
        .with_field("publisher", "Quell House")
        .with_field("imprint", "Rainfall Books")
        .with_field("language", "eng")
        .with_field("territorial_rights", "World")
        .with_field("audience", "General/Trade")
        .with_field("page_count", 320)
        .with_field("trim_size", "6x9")
        .with_field("binding_type", "Paperback")
        .with_field("interior_color", "Black & White")
        .with_field("paper_color", "White")
        .with_field("list_price", "19.99")
        .with_field("publication_date", "2025-06-01")
        .with_field("subject_code", "SCI042000")
        .with_field("annotation", "A field guide to the weather of imagined coastlines.")
        .with_field("contributor_bio", "Mara Quell studies coastal storms.")
        .with_field("keywords", "weather; rain; atlas")
        .with_field("short_description", "A field guide to imagined weather.")
        .with_field("table_of_contents", "1. Drizzle 2. Downpour")
        .with_field("subject_code_2", "FIC019000")
        .with_field("subject_code_3", "NON000000")
}

pub fn settings_without_completion() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.completion.enabled = false;
    settings
}

pub fn layers_with(layers: Vec<ConfigurationLayer>) -> LayerSet {
    LayerSet::new(layers).unwrap()
}

/// Engine over in-memory layers; no provider means no generative step
pub fn engine_with(layers: LayerSet, provider: Option<Arc<dyn CompletionProvider>>) -> Engine {
    engine_with_settings(EngineSettings::default(), layers, provider)
}

pub fn engine_with_settings(
    settings: EngineSettings,
    layers: LayerSet,
    provider: Option<Arc<dyn CompletionProvider>>,
) -> Engine {
    let builder = Engine::builder(settings)
        .layers(layers)
        .retry_policy(RetryPolicy::immediate(3));
    match provider {
        Some(provider) => builder.provider(provider),
        None => builder.without_completion(),
    }
    .build()
    .unwrap()
}

/// Write a layer TOML file into a test directory
pub fn write_layer(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
