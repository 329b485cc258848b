//! Voxsub Common Utilities
//!
//! Shared infrastructure for all Voxsub crates:
//! - Error taxonomy and result alias
//! - Language codes understood by recognizers and translators
//! - Tracing/logging initialization
//! - JSON configuration loading

pub mod config;
pub mod error;
pub mod language;
pub mod logging;

pub use config::*;
pub use error::*;
pub use language::*;
