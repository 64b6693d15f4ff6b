//! Test Helper Utilities
//!
//! Shared utilities for bookfeed-mapper integration tests

#![allow(dead_code)]

pub mod log_capture;
pub mod providers;
pub mod records;

pub use log_capture::{init_test_logging, LogCapture};
pub use providers::{rate_limited, unavailable, FieldScriptedProvider};
pub use records::{
    atlas_of_rain, complete_record, engine_with, engine_with_settings, layers_with,
    settings_without_completion, write_layer,
};
