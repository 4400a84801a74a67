//! # Grouping Module
//!
//! Turns file records into duplicate groups.
//!
//! ## How It Works
//! 1. **Tier 1** - files sharing size and fast hash (optionally SHA-256) are exact duplicates
//! 2. **Tier 2** - remaining files are matched through the BK-tree search index
//! 3. **Original selection** - a manual override wins, otherwise a deterministic sort
//!
//! ## Original Selection Order
//! | Key | Preference |
//! |-----|------------|
//! | Resolution | Higher first |
//! | EXIF capture time | Earlier first, missing last |
//! | File size | Larger first |
//! | Format | RAW > TIFF > PNG > JPEG > WEBP > other |
//! | Path | Lexicographic |

mod engine;
mod selection;

pub use engine::{GroupSummary, GroupingEngine, GroupingStage, GroupingStats};
pub use selection::{compare_for_original, OriginalSelection};

use serde::{Deserialize, Serialize};

/// Which grouping pass produced a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupTier {
    /// Byte-identical files
    Exact,
    /// Perceptually similar files
    Near,
}

impl GroupTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupTier::Exact => "exact",
            GroupTier::Near => "near",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(GroupTier::Exact),
            "near" => Some(GroupTier::Near),
            _ => None,
        }
    }
}

impl std::fmt::Display for GroupTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupTier::Exact => write!(f, "Exact Duplicate"),
            GroupTier::Near => write!(f, "Near Duplicate"),
        }
    }
}

/// Role of a file inside its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Original,
    Duplicate,
    /// Duplicate that also matches size, capture time and camera
    SafeDuplicate,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Original => "original",
            MemberRole::Duplicate => "duplicate",
            MemberRole::SafeDuplicate => "safe_duplicate",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "original" => Some(MemberRole::Original),
            "duplicate" => Some(MemberRole::Duplicate),
            "safe_duplicate" => Some(MemberRole::SafeDuplicate),
            _ => None,
        }
    }
}

/// Extra facts recorded about how a group was formed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupMetadata {
    /// Smallest pHash distance seen while assembling a near group
    pub min_phash_distance: Option<u32>,
    /// Smallest distance across all hash kinds
    pub min_distance: Option<u32>,
    /// Whether SHA-256 agreed for every member of an exact group
    pub sha256_confirmed: Option<bool>,
    /// The original came from a manual override
    pub override_applied: bool,
    /// A stored override could not be honoured
    pub override_conflict: Option<String>,
    /// Sum of duplicate sizes, i.e. space freed by keeping only the original
    pub reclaimable_bytes: u64,
}

/// A set of duplicate files with one original
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub id: i64,
    pub tier: GroupTier,
    pub original_id: i64,
    /// Every member except the original
    pub duplicate_ids: Vec<i64>,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub metadata: GroupMetadata,
}

impl DuplicateGroup {
    /// Original plus duplicates; always at least 2 for engine-built groups
    pub fn total_files(&self) -> usize {
        1 + self.duplicate_ids.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicate_ids.len()
    }

    /// Original first, then duplicates in stored order
    pub fn file_ids(&self) -> Vec<i64> {
        std::iter::once(self.original_id)
            .chain(self.duplicate_ids.iter().copied())
            .collect()
    }

    pub fn contains(&self, file_id: i64) -> bool {
        self.original_id == file_id || self.duplicate_ids.contains(&file_id)
    }
}

/// A persisted (file, group, role) row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: i64,
    pub file_id: i64,
    pub role: MemberRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> DuplicateGroup {
        DuplicateGroup {
            id: 1,
            tier: GroupTier::Near,
            original_id: 10,
            duplicate_ids: vec![11, 12],
            confidence: 0.8,
            metadata: GroupMetadata::default(),
        }
    }

    #[test]
    fn total_files_counts_original() {
        assert_eq!(group().total_files(), 3);
        assert_eq!(group().duplicate_count(), 2);
    }

    #[test]
    fn file_ids_start_with_original() {
        assert_eq!(group().file_ids(), vec![10, 11, 12]);
        assert!(group().contains(12));
        assert!(!group().contains(13));
    }

    #[test]
    fn role_names_round_trip() {
        for role in [MemberRole::Original, MemberRole::Duplicate, MemberRole::SafeDuplicate] {
            assert_eq!(MemberRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(GroupTier::from_str("near"), Some(GroupTier::Near));
        assert_eq!(GroupTier::from_str("fuzzy"), None);
    }

    #[test]
    fn metadata_tolerates_missing_fields() {
        let metadata: GroupMetadata =
            serde_json::from_str(r#"{ "override_applied": true }"#).unwrap();
        assert!(metadata.override_applied);
        assert_eq!(metadata.reclaimable_bytes, 0);
    }
}
