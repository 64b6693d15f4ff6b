//! # bookfeed Common Library
//!
//! Shared code for the bookfeed catalog-feed engine:
//! - Error types
//! - Engine settings loading (TOML) and path/API-key resolution
//! - Tracing initialisation

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
