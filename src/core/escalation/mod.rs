//! # Escalation Module
//!
//! Promotes duplicates that are provably the same shot to `safe_duplicate`.
//!
//! ## Criteria (against the group's original)
//! | Check | Passes when |
//! |-------|-------------|
//! | Size | Byte sizes are equal |
//! | Capture time | Both have EXIF time and differ by at most the tolerance (inclusive) |
//! | Camera | Both models present and equal; always passes when the check is disabled |
//!
//! Escalation never demotes, so running it twice gives the same roles.

mod engine;

pub use engine::SafeDuplicateEscalation;

use crate::core::grouping::MemberRole;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Per-pair outcome of the three checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EscalationCriteria {
    pub size_match: bool,
    pub datetime_match: bool,
    pub camera_match: bool,
    /// False when the camera check was disabled and `camera_match` is vacuous
    pub camera_checked: bool,
}

impl EscalationCriteria {
    pub fn all_met(&self) -> bool {
        self.size_match && self.datetime_match && self.camera_match
    }
}

/// The raw values the criteria were computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationDetails {
    pub original_size: u64,
    pub duplicate_size: u64,
    pub original_datetime: Option<NaiveDateTime>,
    pub duplicate_datetime: Option<NaiveDateTime>,
    /// Absolute capture-time gap in seconds, when both times are known
    pub datetime_gap_secs: Option<f64>,
    pub original_camera: Option<String>,
    pub duplicate_camera: Option<String>,
}

/// One evaluated (original, duplicate) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationResult {
    pub group_id: i64,
    pub original_id: i64,
    pub duplicate_id: i64,
    pub original_role: MemberRole,
    pub new_role: MemberRole,
    /// The role changed during this pass
    pub escalated: bool,
    pub criteria: EscalationCriteria,
    pub details: EscalationDetails,
}

/// Counters for one escalation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationStats {
    pub groups_processed: usize,
    pub pairs_evaluated: usize,
    pub escalated: usize,
    pub already_safe: usize,
    pub criteria_not_met: usize,
    /// Members whose record is missing from the feature store
    pub skipped: usize,
}

/// Role counts across all stored groups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafeDuplicateStatus {
    pub originals: usize,
    pub duplicates: usize,
    pub safe_duplicates: usize,
    pub total_members: usize,
    /// Share of non-original members that are safe, 0-100
    pub safe_percentage: f64,
}

impl SafeDuplicateStatus {
    pub(crate) fn from_roles(roles: impl IntoIterator<Item = MemberRole>) -> Self {
        let mut status = Self::default();
        for role in roles {
            match role {
                MemberRole::Original => status.originals += 1,
                MemberRole::Duplicate => status.duplicates += 1,
                MemberRole::SafeDuplicate => status.safe_duplicates += 1,
            }
            status.total_members += 1;
        }

        let non_original = status.duplicates + status.safe_duplicates;
        if non_original > 0 {
            status.safe_percentage = status.safe_duplicates as f64 * 100.0 / non_original as f64;
        }
        status
    }
}
