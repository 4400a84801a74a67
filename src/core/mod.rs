//! # Core Module
//!
//! The UI-agnostic grouping engine.
//!
//! ## Modules
//! - `records` - File records with precomputed features
//! - `index` - Hamming distance, BK-trees and the near-duplicate search index
//! - `grouping` - Two-tier grouping and original selection
//! - `escalation` - Promotes strictly matching duplicates to safe duplicates
//! - `overrides` - Manual original choices that survive regrouping
//! - `store` - Persistence traits with SQLite and in-memory backends

pub mod escalation;
pub mod grouping;
pub mod index;
pub mod overrides;
pub mod records;
pub mod store;

// Re-export commonly used types
pub use escalation::{EscalationCriteria, EscalationResult, SafeDuplicateEscalation};
pub use grouping::{DuplicateGroup, GroupTier, GroupingEngine, MemberRole};
pub use index::{HashKind, NearDuplicateMatch, NearDuplicateSearchIndex};
pub use overrides::ManualOverride;
pub use records::{FileFormat, FileRecord};
