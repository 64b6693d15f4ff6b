//! Mapping invariants
//!
//! Completeness, precedence, idempotence, audit completeness and fallback
//! determinism, checked over sparse and complete records.

mod helpers;

use bookfeed_mapper::completion::{CompletionProvider, ProviderError};
use bookfeed_mapper::layers::{ConfigurationLayer, LayerSet};
use bookfeed_mapper::reporting::EventLog;
use bookfeed_mapper::{MetadataRecord, Provenance, Scope};
use helpers::*;
use std::sync::Arc;

fn precedence_layers() -> LayerSet {
    layers_with(vec![
        ConfigurationLayer::empty(Scope::Global)
            .with_default("publisher", "Global Default House")
            .with_default("binding_type", "Paperback")
            .with_override("audience", "General/Trade"),
        ConfigurationLayer::empty(Scope::Publisher)
            .with_override("imprint", "Quell House Classics")
            .with_override("contributor_bio", "Publisher biography.")
            .with_default("binding_type", "Hardcover Case Laminate"),
        ConfigurationLayer::empty(Scope::Imprint)
            .with_override("imprint", "Rainfall Books")
            .with_override("contributor_bio", "Imprint biography."),
    ])
}

#[tokio::test]
async fn test_every_schema_field_present_after_mapping() {
    let engine = engine_with(LayerSet::empty(), None);

    for input in [MetadataRecord::new(), atlas_of_rain(), complete_record()] {
        let processed = engine.process_record(input, None).await.unwrap();
        for spec in engine.schema().fields() {
            let entry = processed
                .record
                .entry(&spec.name)
                .unwrap_or_else(|| panic!("{} absent after mapping", spec.name));
            assert!(
                !entry.value.is_empty(),
                "{} holds an empty value instead of a typed value or null-valid",
                spec.name
            );
        }
    }
}

#[tokio::test]
async fn test_empty_record_is_flagged_not_failed() {
    let engine = engine_with(LayerSet::empty(), None);

    let processed = engine.process_record(MetadataRecord::new(), None).await.unwrap();

    assert!(processed.is_completed());
    assert!(!processed.is_export_ready());
    let validation = processed.validation.as_ref().unwrap();
    assert!(validation.blocking().iter().any(|r| r.field == "title"));
}

#[tokio::test]
async fn test_imprint_override_beats_publisher() {
    let engine = engine_with(precedence_layers(), None);

    let processed = engine.process_record(atlas_of_rain(), None).await.unwrap();
    let record = &processed.record;

    assert_eq!(record.text("imprint").as_deref(), Some("Rainfall Books"));
    assert_eq!(record.entry("imprint").unwrap().scope, Some(Scope::Imprint));
    assert_eq!(record.text("contributor_bio").as_deref(), Some("Imprint biography."));
    // Publisher default beats global default
    assert_eq!(record.text("binding_type").as_deref(), Some("Hardcover Case Laminate"));
    assert_eq!(record.provenance("binding_type"), Some(Provenance::Default));
    assert_eq!(record.entry("binding_type").unwrap().scope, Some(Scope::Publisher));
    // Only the global layer sets these
    assert_eq!(record.text("publisher").as_deref(), Some("Global Default House"));
    assert_eq!(record.provenance("audience"), Some(Provenance::Override));
}

#[tokio::test]
async fn test_override_replaces_explicit_value() {
    let engine = engine_with(precedence_layers(), None);
    let record = atlas_of_rain().with_field("Imprint", "Self Published");

    let processed = engine.process_record(record, None).await.unwrap();

    assert_eq!(processed.record.text("imprint").as_deref(), Some("Rainfall Books"));
    assert_eq!(processed.record.provenance("imprint"), Some(Provenance::Override));
}

#[tokio::test]
async fn test_second_mapping_pass_changes_nothing() {
    let provider = Arc::new(
        FieldScriptedProvider::new().script("keywords", vec![unavailable(), unavailable(), unavailable()]),
    );
    let engine = engine_with(precedence_layers(), Some(provider.clone() as Arc<dyn CompletionProvider>));

    let processed = engine.process_record(atlas_of_rain(), None).await.unwrap();
    let first = processed.record.clone();
    let calls_after_first = provider.total_calls();

    let mut second = processed.record;
    let events = EventLog::new(second.id());
    let summary = engine
        .registry()
        .map_record(&mut second, None, &events)
        .await
        .unwrap();

    assert_eq!(provider.total_calls(), calls_after_first);
    assert_eq!(summary.completion_calls, 0);
    for (name, entry) in first.fields() {
        let again = second.entry(name).unwrap();
        assert_eq!(again.value, entry.value, "{} value changed", name);
        assert_eq!(again.provenance, entry.provenance, "{} provenance changed", name);
        assert_eq!(again.scope, entry.scope, "{} scope changed", name);
    }
    assert_eq!(first.len(), second.len());
}

#[tokio::test]
async fn test_attempt_history_matches_provider_calls() {
    let provider = Arc::new(
        FieldScriptedProvider::new()
            .script("contributor_bio", vec![rate_limited(), Ok("Mara Quell writes about weather.".into())])
            .script("keywords", vec![unavailable(), unavailable(), unavailable()])
            .script(
                "annotation",
                vec![Err(ProviderError::ContentFiltered("policy".into()))],
            )
            .script("short_description", vec![Ok("   ".into()), Ok("A rain atlas.".into())]),
    );
    let engine = engine_with(LayerSet::empty(), Some(provider.clone() as Arc<dyn CompletionProvider>));

    let processed = engine.process_record(atlas_of_rain(), None).await.unwrap();
    let record = &processed.record;

    for spec in engine.schema().subjective_fields() {
        assert_eq!(
            record.completion_history(&spec.name).len() as u32,
            provider.calls_for(&spec.name),
            "attempt history of {} does not match provider calls",
            spec.name
        );
    }
    assert_eq!(record.completion_history("contributor_bio").len(), 2);
    assert_eq!(record.completion_history("keywords").len(), 3);
    // Non-retryable error stops after one call
    assert_eq!(record.completion_history("annotation").len(), 1);
    // Blank response is recorded, then retried
    assert_eq!(record.completion_history("short_description").len(), 2);
    assert_eq!(
        processed.mapping.as_ref().unwrap().completion_calls,
        provider.total_calls()
    );

    let failures = &processed.report.as_ref().unwrap().generative_failures;
    assert!(failures.contains(&"keywords".to_string()));
    assert!(failures.contains(&"annotation".to_string()));
    assert!(!failures.contains(&"short_description".to_string()));
}

#[tokio::test]
async fn test_fallbacks_are_deterministic() {
    let input = atlas_of_rain();

    let first = engine_with(LayerSet::empty(), None)
        .process_record(input.clone(), None)
        .await
        .unwrap();
    let second = engine_with(LayerSet::empty(), None)
        .process_record(input, None)
        .await
        .unwrap();

    let fallbacks: Vec<&str> = first
        .record
        .fields()
        .filter(|(_, e)| e.provenance == Provenance::Fallback)
        .map(|(name, _)| name)
        .collect();
    assert!(!fallbacks.is_empty());
    for name in fallbacks {
        assert_eq!(first.record.value(name), second.record.value(name), "{} differs", name);
        assert_eq!(second.record.provenance(name), Some(Provenance::Fallback));
    }
    assert_eq!(
        first.record.text("short_description").as_deref(),
        Some("Atlas of Rain by Mara Quell.")
    );
}

#[tokio::test]
async fn test_input_spellings_normalize_to_one_field() {
    let engine = engine_with(LayerSet::empty(), None);
    let record = MetadataRecord::new()
        .with_field("Book Title", "Atlas of Rain")
        .with_field("Number of Pages", "320")
        .with_field("PAGES", "999");

    let processed = engine.process_record(record, None).await.unwrap();

    assert_eq!(processed.record.text("title").as_deref(), Some("Atlas of Rain"));
    let mapping = processed.mapping.as_ref().unwrap();
    assert_eq!(mapping.discarded_inputs.len(), 1);
    assert!(processed.record.value("page_count").and_then(|v| v.as_integer()).is_some());
}

#[tokio::test]
async fn test_out_of_range_numbers_never_fail_the_record() {
    let engine = engine_with(LayerSet::empty(), None);
    let record = atlas_of_rain()
        .with_field("List Price", "70000000000000000000000000000")
        .with_field("Page Count", 9_000_000_000_000_000_000i64)
        .with_field("Trim", "99999x99999");

    let processed = engine.process_record(record, None).await.unwrap();

    assert!(processed.is_completed());
    let record = &processed.record;
    assert_ne!(record.provenance("jp_list_price"), Some(Provenance::Computed));
    assert_ne!(record.provenance("weight"), Some(Provenance::Computed));
    assert_eq!(record.provenance("uk_list_price"), Some(Provenance::Computed));
    for spec in engine.schema().fields() {
        assert!(record.entry(&spec.name).is_some(), "{} absent", spec.name);
    }
}
