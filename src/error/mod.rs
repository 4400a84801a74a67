//! # Error Module
//!
//! Error types for the duplicate grouping engine.
//!
//! ## Design Principles
//! - **Never panic** on user data - bad hashes and missing EXIF are not errors at all
//! - **Include context** - paths, ids, what went wrong
//! - **Fatal only when the store is gone** - everything else degrades locally

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum DedupError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Cannot select an original from an empty group")]
    EmptyGroup,

    #[error("Failed to render output: {0}")]
    Output(String),
}

/// Errors raised by the feature/group/override stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Database corruption detected at {path}. Delete this file and try again.")]
    Corrupted { path: PathBuf },

    #[error("Failed to serialize stored data: {0}")]
    SerializationFailed(String),

    #[error("Group {group_id} not found")]
    GroupNotFound { group_id: i64 },

    #[error("File {file_id} is not a member of group {group_id}")]
    MemberNotFound { group_id: i64, file_id: i64 },
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        StoreError::QueryFailed(error.to_string())
    }
}

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, DedupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_error_includes_path() {
        let error = StoreError::OpenFailed {
            path: PathBuf::from("/data/photos.db"),
            reason: "disk full".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("/data/photos.db"));
        assert!(message.contains("disk full"));
    }

    #[test]
    fn corruption_error_suggests_recovery() {
        let error = StoreError::Corrupted {
            path: PathBuf::from("/data/photos.db"),
        };
        assert!(error.to_string().contains("Delete this file"));
    }

    #[test]
    fn store_error_converts_to_top_level() {
        let error: DedupError = StoreError::GroupNotFound { group_id: 42 }.into();
        let message = error.to_string();
        assert!(message.starts_with("Storage error"));
        assert!(message.contains("42"));
    }

    #[test]
    fn invalid_config_names_field() {
        let error = ConfigError::InvalidValue {
            field: "dimension_tolerance",
            reason: "must be between 0 and 1".to_string(),
        };
        assert!(error.to_string().contains("dimension_tolerance"));
    }
}
