//! Log Capture Utilities for Testing
//!
//! Captures `tracing` output so tests can assert that event-log entries are
//! mirrored at the right level.

use std::sync::{Arc, Mutex, OnceLock};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    /// `field` value of engine events, if any
    pub field: Option<String>,
}

#[derive(Clone, Default)]
pub struct LogCapture {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.records().iter().any(|r| r.message.contains(pattern))
    }

    pub fn count_matching(&self, pattern: &str) -> usize {
        self.records()
            .iter()
            .filter(|r| r.message.contains(pattern))
            .count()
    }

    /// Records at `level` mentioning `pattern`
    pub fn at_level(&self, level: Level, pattern: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level && r.message.contains(pattern))
            .collect()
    }
}

impl<S> tracing_subscriber::Layer<S> for LogCapture
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        use tracing::field::Visit;

        #[derive(Default)]
        struct Visitor {
            message: String,
            field: Option<String>,
        }

        impl Visit for Visitor {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "field" {
                    self.field = Some(value.to_string());
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                match field.name() {
                    "message" => {
                        self.message = format!("{:?}", value);
                        if self.message.starts_with('"') && self.message.ends_with('"') {
                            self.message = self.message[1..self.message.len() - 1].to_string();
                        }
                    }
                    "field" => self.field = Some(format!("{:?}", value).trim_matches('"').to_string()),
                    _ => {}
                }
            }
        }

        let mut visitor = Visitor::default();
        event.record(&mut visitor);

        self.records.lock().unwrap().push(LogRecord {
            level: *event.metadata().level(),
            message: visitor.message,
            field: visitor.field,
        });
    }
}

/// Install the capturing subscriber once per test binary
pub fn init_test_logging() -> LogCapture {
    static CAPTURE: OnceLock<LogCapture> = OnceLock::new();
    CAPTURE
        .get_or_init(|| {
            let capture = LogCapture::new();
            let _ = tracing_subscriber::registry()
                .with(tracing_subscriber::EnvFilter::new("bookfeed_mapper=debug"))
                .with(capture.clone())
                .try_init();
            capture
        })
        .clone()
}
