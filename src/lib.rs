//! # Photo Dedup Engine
//!
//! Groups photos into exact and near duplicates from precomputed fingerprints.
//!
//! ## Core Philosophy
//! - **Never auto-delete** - the engine only classifies, it never touches files
//! - **Deterministic** - the same records always give the same groups and originals
//! - **The user has the last word** - manual overrides beat automatic selection
//!
//! ## Architecture
//! - `core` - Index, grouping, escalation, overrides and storage
//! - `config` - Tunable thresholds and presets
//! - `error` - Error types

pub mod config;
pub mod core;
pub mod error;

// Re-export commonly used types at the crate root
pub use error::{DedupError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point. Filtering follows `RUST_LOG`.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
