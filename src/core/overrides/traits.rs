//! Override store trait definition.

use super::ManualOverride;
use crate::error::StoreError;

/// Persistence for manual overrides
///
/// At most one override per group is active at a time.
pub trait OverrideStore: Send + Sync {
    /// The active override for a group, if any
    fn get_override_for_group(&self, group_id: i64) -> Result<Option<ManualOverride>, StoreError>;

    /// Store a new active override, deactivating any earlier one for the same group
    ///
    /// Returns the id assigned to the stored override.
    fn record_override(&self, override_: &ManualOverride) -> Result<i64, StoreError>;

    /// Deactivate the group's override
    ///
    /// Returns `true` if an active override existed.
    fn remove_override(&self, group_id: i64) -> Result<bool, StoreError>;

    /// Every active override, ordered by group id
    fn list_active_overrides(&self) -> Result<Vec<ManualOverride>, StoreError>;
}
