//! Escalation pass over stored groups.

use super::{
    EscalationCriteria, EscalationDetails, EscalationResult, EscalationStats, SafeDuplicateStatus,
};
use crate::config::EscalationConfig;
use crate::core::grouping::MemberRole;
use crate::core::records::{capture_gap_secs, FileRecord};
use crate::core::store::{DedupStore, FeatureStore, GroupStore};
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reclassifies `duplicate` members as `safe_duplicate` when they match their original
pub struct SafeDuplicateEscalation {
    config: EscalationConfig,
    store: Arc<dyn DedupStore>,
}

impl SafeDuplicateEscalation {
    pub fn new(config: EscalationConfig, store: Arc<dyn DedupStore>) -> Self {
        Self { config, store }
    }

    /// Run the three checks for one pair without touching the store
    pub fn evaluate_pair(
        &self,
        original: &FileRecord,
        duplicate: &FileRecord,
    ) -> EscalationCriteria {
        let size_match = original.size == duplicate.size;

        let datetime_match = match (original.exif_datetime, duplicate.exif_datetime) {
            (Some(a), Some(b)) => capture_gap_secs(a, b) <= self.config.datetime_tolerance_secs,
            _ => false,
        };

        let camera_match = if self.config.camera_check_enabled {
            match (camera(original), camera(duplicate)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        } else {
            true
        };

        EscalationCriteria {
            size_match,
            datetime_match,
            camera_match,
            camera_checked: self.config.camera_check_enabled,
        }
    }

    /// Evaluate every non-original member of every stored group
    pub fn process_all_groups(&self) -> Result<(Vec<EscalationResult>, EscalationStats)> {
        let groups = self.store.load_groups()?;
        let mut results = Vec::new();
        let mut stats = EscalationStats::default();

        info!(groups = groups.len(), "Starting safe-duplicate escalation");

        for group in &groups {
            stats.groups_processed += 1;
            let members = self.store.load_members(group.id)?;

            let Some(original) = self.store.get_record(group.original_id)? else {
                let skipped = members.iter().filter(|m| m.role != MemberRole::Original).count();
                warn!(
                    group_id = group.id,
                    file_id = group.original_id,
                    "Original record missing, skipping group"
                );
                stats.skipped += skipped;
                continue;
            };

            for member in members.iter().filter(|m| m.role != MemberRole::Original) {
                let Some(duplicate) = self.store.get_record(member.file_id)? else {
                    warn!(
                        group_id = group.id,
                        file_id = member.file_id,
                        "Member record missing, skipping"
                    );
                    stats.skipped += 1;
                    continue;
                };

                let criteria = self.evaluate_pair(&original, &duplicate);
                stats.pairs_evaluated += 1;

                let new_role = match member.role {
                    MemberRole::SafeDuplicate => {
                        stats.already_safe += 1;
                        MemberRole::SafeDuplicate
                    }
                    _ if criteria.all_met() => {
                        self.store
                            .set_member_role(group.id, member.file_id, MemberRole::SafeDuplicate)?;
                        stats.escalated += 1;
                        debug!(
                            group_id = group.id,
                            file_id = member.file_id,
                            "Escalated to safe duplicate"
                        );
                        MemberRole::SafeDuplicate
                    }
                    role => {
                        stats.criteria_not_met += 1;
                        role
                    }
                };

                results.push(EscalationResult {
                    group_id: group.id,
                    original_id: original.id,
                    duplicate_id: duplicate.id,
                    original_role: member.role,
                    new_role,
                    escalated: member.role != new_role,
                    criteria,
                    details: details(&original, &duplicate),
                });
            }
        }

        info!(
            pairs = stats.pairs_evaluated,
            escalated = stats.escalated,
            already_safe = stats.already_safe,
            skipped = stats.skipped,
            "Escalation complete"
        );
        Ok((results, stats))
    }

    /// Role counts across all stored members
    pub fn get_safe_duplicate_status(&self) -> Result<SafeDuplicateStatus> {
        let members = self.store.all_members()?;
        Ok(SafeDuplicateStatus::from_roles(members.into_iter().map(|m| m.role)))
    }
}

fn camera(record: &FileRecord) -> Option<&str> {
    record
        .camera_model
        .as_deref()
        .map(str::trim)
        .filter(|model| !model.is_empty())
}

fn details(original: &FileRecord, duplicate: &FileRecord) -> EscalationDetails {
    EscalationDetails {
        original_size: original.size,
        duplicate_size: duplicate.size,
        original_datetime: original.exif_datetime,
        duplicate_datetime: duplicate.exif_datetime,
        datetime_gap_secs: match (original.exif_datetime, duplicate.exif_datetime) {
            (Some(a), Some(b)) => Some(capture_gap_secs(a, b)),
            _ => None,
        },
        original_camera: original.camera_model.clone(),
        duplicate_camera: duplicate.camera_model.clone(),
    }
}
