//! Event-log entries mirrored to tracing

mod helpers;

use bookfeed_mapper::completion::CompletionProvider;
use bookfeed_mapper::layers::LayerSet;
use helpers::*;
use std::sync::Arc;
use tracing::Level;

#[tokio::test]
async fn test_hard_required_fallback_logged_as_warning() {
    let capture = init_test_logging();
    let engine = engine_with(LayerSet::empty(), None);

    engine.process_record(atlas_of_rain(), None).await.unwrap();

    let warnings = capture.at_level(Level::WARN, "Fallback value 'White' used");
    assert!(
        warnings.iter().any(|r| r.field.as_deref() == Some("paper_color")),
        "no paper_color fallback warning in {:?}",
        warnings
    );
}

#[tokio::test]
async fn test_failed_attempts_logged_per_field() {
    let capture = init_test_logging();
    let provider = Arc::new(
        FieldScriptedProvider::new()
            .script("table_of_contents", vec![unavailable(), unavailable(), unavailable()]),
    );
    let engine = engine_with(LayerSet::empty(), Some(provider as Arc<dyn CompletionProvider>));

    engine.process_record(atlas_of_rain(), None).await.unwrap();

    let attempts: Vec<_> = capture
        .at_level(Level::WARN, "failed")
        .into_iter()
        .filter(|r| r.field.as_deref() == Some("table_of_contents") && r.message.starts_with("Attempt"))
        .collect();
    assert!(attempts.len() >= 3, "expected three failed attempts, got {:?}", attempts);
}

#[tokio::test]
async fn test_routine_decisions_stay_at_debug() {
    let capture = init_test_logging();
    let engine = engine_with(LayerSet::empty(), None);

    engine
        .process_record(atlas_of_rain().with_field("Subtitle", "Logbook Edition"), None)
        .await
        .unwrap();

    let kept = capture
        .records()
        .into_iter()
        .filter(|r| r.field.as_deref() == Some("subtitle") && r.message == "Existing value kept")
        .collect::<Vec<_>>();
    assert!(!kept.is_empty());
    assert!(kept.iter().all(|r| r.level == Level::DEBUG));
}
