//! In-memory store backend for testing.

use super::{FeatureStore, GroupStore};
use crate::core::grouping::{DuplicateGroup, GroupMember, MemberRole};
use crate::core::overrides::{self, ManualOverride, OverrideChange, OverrideStore};
use crate::core::records::FileRecord;
use crate::error::StoreError;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct State {
    records: BTreeMap<i64, FileRecord>,
    groups: BTreeMap<i64, DuplicateGroup>,
    /// (group_id, file_id) -> role
    members: BTreeMap<(i64, i64), MemberRole>,
    overrides: Vec<ManualOverride>,
}

/// In-memory store backend
///
/// Useful for testing and scenarios where persistence isn't needed.
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    /// Create a store preloaded with records
    pub fn with_records(records: Vec<FileRecord>) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.write() {
            state.records = records.into_iter().map(|r| (r.id, r)).collect();
        }
        store
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state.read().map_err(|_| StoreError::Corrupted {
            path: PathBuf::from("memory"),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state.write().map_err(|_| StoreError::Corrupted {
            path: PathBuf::from("memory"),
        })
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureStore for InMemoryStore {
    fn load_records(&self) -> Result<Vec<FileRecord>, StoreError> {
        Ok(self.read()?.records.values().cloned().collect())
    }

    fn get_record(&self, file_id: i64) -> Result<Option<FileRecord>, StoreError> {
        Ok(self.read()?.records.get(&file_id).cloned())
    }

    fn upsert_record(&self, record: &FileRecord) -> Result<(), StoreError> {
        self.write()?.records.insert(record.id, record.clone());
        Ok(())
    }

    fn remove_record(&self, file_id: i64) -> Result<bool, StoreError> {
        Ok(self.write()?.records.remove(&file_id).is_some())
    }
}

impl GroupStore for InMemoryStore {
    fn replace_groups(&self, groups: &[DuplicateGroup]) -> Result<usize, StoreError> {
        let mut ids = HashSet::new();
        if let Some(group) = groups.iter().find(|g| !ids.insert(g.id)) {
            return Err(StoreError::QueryFailed(format!("duplicate group id {}", group.id)));
        }

        let mut state = self.write()?;
        state.groups.clear();
        state.members.clear();

        for change in overrides::reconcile(&state.overrides, groups) {
            match change {
                OverrideChange::Rekey {
                    override_id,
                    group_id,
                } => {
                    let stored = state.overrides.iter_mut().find(|o| o.id == Some(override_id));
                    if let Some(o) = stored {
                        o.group_id = group_id;
                    }
                }
                OverrideChange::Deactivate { override_id } => {
                    let stored = state.overrides.iter_mut().find(|o| o.id == Some(override_id));
                    if let Some(o) = stored {
                        o.active = false;
                    }
                }
            }
        }

        for group in groups {
            state.groups.insert(group.id, group.clone());
            state
                .members
                .insert((group.id, group.original_id), MemberRole::Original);
            for &file_id in &group.duplicate_ids {
                state
                    .members
                    .insert((group.id, file_id), MemberRole::Duplicate);
            }
        }

        Ok(groups.len())
    }

    fn load_groups(&self) -> Result<Vec<DuplicateGroup>, StoreError> {
        Ok(self.read()?.groups.values().cloned().collect())
    }

    fn load_members(&self, group_id: i64) -> Result<Vec<GroupMember>, StoreError> {
        let state = self.read()?;
        Ok(state
            .members
            .range((group_id, i64::MIN)..=(group_id, i64::MAX))
            .map(|(&(group_id, file_id), &role)| GroupMember {
                group_id,
                file_id,
                role,
            })
            .collect())
    }

    fn all_members(&self) -> Result<Vec<GroupMember>, StoreError> {
        Ok(self
            .read()?
            .members
            .iter()
            .map(|(&(group_id, file_id), &role)| GroupMember {
                group_id,
                file_id,
                role,
            })
            .collect())
    }

    fn set_member_role(
        &self,
        group_id: i64,
        file_id: i64,
        role: MemberRole,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.groups.contains_key(&group_id) {
            return Err(StoreError::GroupNotFound { group_id });
        }
        match state.members.get_mut(&(group_id, file_id)) {
            Some(current) => {
                *current = role;
                Ok(())
            }
            None => Err(StoreError::MemberNotFound { group_id, file_id }),
        }
    }
}

impl OverrideStore for InMemoryStore {
    fn get_override_for_group(&self, group_id: i64) -> Result<Option<ManualOverride>, StoreError> {
        Ok(self
            .read()?
            .overrides
            .iter()
            .find(|o| o.active && o.group_id == group_id)
            .cloned())
    }

    fn record_override(&self, override_: &ManualOverride) -> Result<i64, StoreError> {
        let mut state = self.write()?;
        for existing in state
            .overrides
            .iter_mut()
            .filter(|o| o.group_id == override_.group_id)
        {
            existing.active = false;
        }

        let id = state.overrides.len() as i64 + 1;
        let mut stored = override_.clone();
        stored.id = Some(id);
        stored.active = true;
        state.overrides.push(stored);
        Ok(id)
    }

    fn remove_override(&self, group_id: i64) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let mut removed = false;
        for existing in state
            .overrides
            .iter_mut()
            .filter(|o| o.active && o.group_id == group_id)
        {
            existing.active = false;
            removed = true;
        }
        Ok(removed)
    }

    fn list_active_overrides(&self) -> Result<Vec<ManualOverride>, StoreError> {
        let mut active: Vec<ManualOverride> = self
            .read()?
            .overrides
            .iter()
            .filter(|o| o.active)
            .cloned()
            .collect();
        active.sort_by_key(|o| o.group_id);
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grouping::{GroupMetadata, GroupTier};

    fn group(id: i64, original: i64, duplicates: Vec<i64>) -> DuplicateGroup {
        DuplicateGroup {
            id,
            tier: GroupTier::Exact,
            original_id: original,
            duplicate_ids: duplicates,
            confidence: 1.0,
            metadata: GroupMetadata::default(),
        }
    }

    #[test]
    fn records_round_trip() {
        let store = InMemoryStore::new();
        store.upsert_record(&FileRecord::new(2, "/b.jpg", 5, "x")).unwrap();
        store.upsert_record(&FileRecord::new(1, "/a.jpg", 5, "x")).unwrap();

        let ids: Vec<i64> = store.load_records().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(store.remove_record(1).unwrap());
        assert!(store.get_record(1).unwrap().is_none());
    }

    #[test]
    fn replace_groups_discards_previous() {
        let store = InMemoryStore::new();
        store.replace_groups(&[group(1, 10, vec![11])]).unwrap();
        store.replace_groups(&[group(2, 20, vec![21, 22])]).unwrap();

        let groups = store.load_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, 2);
        assert_eq!(store.all_members().unwrap().len(), 3);
        assert!(store.load_members(1).unwrap().is_empty());
    }

    #[test]
    fn duplicate_group_id_is_rejected_and_keeps_previous_groups() {
        let store = InMemoryStore::new();
        store.replace_groups(&[group(1, 1, vec![2])]).unwrap();

        let result = store.replace_groups(&[group(7, 3, vec![4]), group(7, 5, vec![6])]);

        assert!(matches!(result, Err(StoreError::QueryFailed(_))));
        let groups = store.load_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, 1);
        assert_eq!(store.all_members().unwrap().len(), 2);
    }

    #[test]
    fn replace_groups_reconciles_overrides() {
        let store = InMemoryStore::new();
        store.record_override(&ManualOverride::new(1, 20, None)).unwrap();
        store.record_override(&ManualOverride::new(3, 99, None)).unwrap();

        store
            .replace_groups(&[group(1, 10, vec![11]), group(2, 20, vec![21])])
            .unwrap();

        let active = store.list_active_overrides().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].group_id, 2);
        assert_eq!(active[0].original_file_id, 20);
    }

    #[test]
    fn member_roles_can_change() {
        let store = InMemoryStore::new();
        store.replace_groups(&[group(1, 10, vec![11])]).unwrap();
        store
            .set_member_role(1, 11, MemberRole::SafeDuplicate)
            .unwrap();

        let members = store.load_members(1).unwrap();
        assert_eq!(members[1].role, MemberRole::SafeDuplicate);
        assert!(matches!(
            store.set_member_role(1, 99, MemberRole::Duplicate),
            Err(StoreError::MemberNotFound { .. })
        ));
        assert!(matches!(
            store.set_member_role(7, 11, MemberRole::Duplicate),
            Err(StoreError::GroupNotFound { group_id: 7 })
        ));
    }

    #[test]
    fn one_active_override_per_group() {
        let store = InMemoryStore::new();
        store.record_override(&ManualOverride::new(1, 10, None)).unwrap();
        store.record_override(&ManualOverride::new(1, 11, None)).unwrap();

        let active = store.get_override_for_group(1).unwrap().unwrap();
        assert_eq!(active.original_file_id, 11);
        assert_eq!(store.list_active_overrides().unwrap().len(), 1);

        assert!(store.remove_override(1).unwrap());
        assert!(store.get_override_for_group(1).unwrap().is_none());
        assert!(!store.remove_override(1).unwrap());
    }
}
