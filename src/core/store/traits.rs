//! Store trait definitions.

use crate::core::grouping::{DuplicateGroup, GroupMember, MemberRole};
use crate::core::overrides::OverrideStore;
use crate::core::records::FileRecord;
use crate::error::StoreError;

/// Read/write access to per-file features
pub trait FeatureStore: Send + Sync {
    /// Every stored record, ordered by id
    fn load_records(&self) -> Result<Vec<FileRecord>, StoreError>;

    /// A single record by id
    fn get_record(&self, file_id: i64) -> Result<Option<FileRecord>, StoreError>;

    /// Insert or replace a record
    fn upsert_record(&self, record: &FileRecord) -> Result<(), StoreError>;

    /// Insert or replace many records.
    ///
    /// Backends should override this to use a single transaction.
    fn upsert_records(&self, records: &[FileRecord]) -> Result<(), StoreError> {
        for record in records {
            self.upsert_record(record)?;
        }
        Ok(())
    }

    /// Delete a record; returns `true` if it existed
    fn remove_record(&self, file_id: i64) -> Result<bool, StoreError>;
}

/// Persistence for duplicate groups and their members
pub trait GroupStore: Send + Sync {
    /// Replace every stored group wholesale, atomically
    ///
    /// Members are written with `original` / `duplicate` roles. Returns the
    /// number of groups stored.
    fn replace_groups(&self, groups: &[DuplicateGroup]) -> Result<usize, StoreError>;

    /// Every stored group, ordered by id
    fn load_groups(&self) -> Result<Vec<DuplicateGroup>, StoreError>;

    /// Members of one group, ordered by file id
    fn load_members(&self, group_id: i64) -> Result<Vec<GroupMember>, StoreError>;

    /// Every member row across all groups
    fn all_members(&self) -> Result<Vec<GroupMember>, StoreError>;

    /// Change a member's role
    fn set_member_role(
        &self,
        group_id: i64,
        file_id: i64,
        role: MemberRole,
    ) -> Result<(), StoreError>;
}

/// Everything the grouping and escalation passes read and write
pub trait DedupStore: FeatureStore + GroupStore + OverrideStore {}

impl<T: FeatureStore + GroupStore + OverrideStore> DedupStore for T {}
