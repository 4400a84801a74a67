//! # Store Module
//!
//! Persistence for file features, duplicate groups and manual overrides.
//!
//! ## Backends
//! - `SqliteStore` - Persistent storage using SQLite
//! - `InMemoryStore` - For testing
//!
//! Groups are never updated incrementally: each grouping pass replaces the
//! whole set inside one transaction, so a failed pass leaves the previous
//! result intact.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{DedupStore, FeatureStore, GroupStore};
