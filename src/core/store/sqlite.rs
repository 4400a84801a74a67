//! SQLite store backend for persistent storage.

use super::{FeatureStore, GroupStore};
use crate::core::grouping::{DuplicateGroup, GroupMember, GroupMetadata, GroupTier, MemberRole};
use crate::core::overrides::{self, ManualOverride, OverrideChange, OverrideStore, OverrideType};
use crate::core::records::{FileFormat, FileRecord};
use crate::error::StoreError;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const EXIF_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const RECORD_COLUMNS: &str = "id, path, size, fast_hash, sha256_hash, phash, dhash, whash,
     width, height, exif_datetime, camera_model, format";

const OVERRIDE_COLUMNS: &str = "id, group_id, original_file_id, automatic_file_id,
     override_type, reason, created_at, active";

/// SQLite-backed persistent store
///
/// Uses WAL (Write-Ahead Logging) mode so the UI can read results while a
/// background pass writes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::create_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::OpenFailed {
            path: PathBuf::from(":memory:"),
            reason: e.to_string(),
        })?;
        Self::create_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    fn create_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY,
                path TEXT NOT NULL,
                size INTEGER NOT NULL,
                fast_hash TEXT NOT NULL,
                sha256_hash TEXT,
                phash TEXT,
                dhash TEXT,
                whash TEXT,
                width INTEGER,
                height INTEGER,
                exif_datetime TEXT,
                camera_model TEXT,
                format TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_size_hash ON files(size, fast_hash);

            CREATE TABLE IF NOT EXISTS duplicate_groups (
                id INTEGER PRIMARY KEY,
                tier TEXT NOT NULL,
                original_id INTEGER NOT NULL,
                confidence REAL NOT NULL,
                metadata TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS group_members (
                group_id INTEGER NOT NULL,
                file_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (group_id, file_id)
            );

            CREATE TABLE IF NOT EXISTS manual_overrides (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL,
                original_file_id INTEGER NOT NULL,
                automatic_file_id INTEGER,
                override_type TEXT NOT NULL,
                reason TEXT,
                created_at TEXT NOT NULL,
                active INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_overrides_group ON manual_overrides(group_id, active);",
        )?;
        Ok(())
    }

    /// Path of the backing database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Corrupted {
            path: self.db_path.clone(),
        })
    }

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
        let exif: Option<String> = row.get(10)?;
        let format: String = row.get(12)?;

        Ok(FileRecord {
            id: row.get(0)?,
            path: row.get(1)?,
            size: row.get::<_, i64>(2)? as u64,
            fast_hash: row.get(3)?,
            sha256_hash: row.get(4)?,
            phash: row.get(5)?,
            dhash: row.get(6)?,
            whash: row.get(7)?,
            width: row.get::<_, Option<i64>>(8)?.map(|v| v as u32),
            height: row.get::<_, Option<i64>>(9)?.map(|v| v as u32),
            exif_datetime: exif.as_deref().and_then(parse_exif),
            camera_model: row.get(11)?,
            format: FileFormat::from_name(&format),
        })
    }

    fn override_from_row(row: &Row<'_>) -> rusqlite::Result<ManualOverride> {
        let override_type: String = row.get(4)?;
        let created_at: String = row.get(6)?;

        Ok(ManualOverride {
            id: Some(row.get(0)?),
            group_id: row.get(1)?,
            original_file_id: row.get(2)?,
            automatic_file_id: row.get(3)?,
            override_type: OverrideType::from_str(&override_type)
                .unwrap_or(OverrideType::SingleGroup),
            reason: row.get(5)?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            active: row.get::<_, i64>(7)? != 0,
        })
    }

    fn insert_record(conn: &Connection, record: &FileRecord) -> Result<(), StoreError> {
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO files ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                RECORD_COLUMNS
            ),
            params![
                record.id,
                record.path,
                record.size as i64,
                record.fast_hash,
                record.sha256_hash,
                record.phash,
                record.dhash,
                record.whash,
                record.width.map(|v| v as i64),
                record.height.map(|v| v as i64),
                record
                    .exif_datetime
                    .map(|t| t.format(EXIF_FORMAT).to_string()),
                record.camera_model,
                record.format.as_str(),
            ],
        )?;
        Ok(())
    }
}

fn parse_exif(value: &str) -> Option<NaiveDateTime> {
    match NaiveDateTime::parse_from_str(value, EXIF_FORMAT) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(value, error = %e, "Ignoring unparseable EXIF timestamp");
            None
        }
    }
}

impl FeatureStore for SqliteStore {
    fn load_records(&self) -> Result<Vec<FileRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM files ORDER BY id", RECORD_COLUMNS))?;
        let records = stmt
            .query_map([], Self::record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn get_record(&self, file_id: i64) -> Result<Option<FileRecord>, StoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("SELECT {} FROM files WHERE id = ?", RECORD_COLUMNS),
                [file_id],
                Self::record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn upsert_record(&self, record: &FileRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        Self::insert_record(&conn, record)
    }

    fn upsert_records(&self, records: &[FileRecord]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for record in records {
            Self::insert_record(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove_record(&self, file_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM files WHERE id = ?", [file_id])?;
        Ok(rows > 0)
    }
}

impl GroupStore for SqliteStore {
    fn replace_groups(&self, groups: &[DuplicateGroup]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp();

        tx.execute("DELETE FROM group_members", [])?;
        tx.execute("DELETE FROM duplicate_groups", [])?;

        for group in groups {
            let metadata = serde_json::to_string(&group.metadata)
                .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;

            tx.execute(
                "INSERT INTO duplicate_groups
                 (id, tier, original_id, confidence, metadata, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    group.id,
                    group.tier.as_str(),
                    group.original_id,
                    group.confidence,
                    metadata,
                    now,
                ],
            )?;

            for (position, file_id) in group.file_ids().into_iter().enumerate() {
                let role = if position == 0 {
                    MemberRole::Original
                } else {
                    MemberRole::Duplicate
                };
                tx.execute(
                    "INSERT INTO group_members (group_id, file_id, role, position)
                     VALUES (?, ?, ?, ?)",
                    params![group.id, file_id, role.as_str(), position as i64],
                )?;
            }
        }

        let active = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM manual_overrides WHERE active = 1",
                OVERRIDE_COLUMNS
            ))?;
            let rows = stmt.query_map([], Self::override_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        for change in overrides::reconcile(&active, groups) {
            match change {
                OverrideChange::Rekey {
                    override_id,
                    group_id,
                } => tx.execute(
                    "UPDATE manual_overrides SET group_id = ? WHERE id = ?",
                    [group_id, override_id],
                )?,
                OverrideChange::Deactivate { override_id } => tx.execute(
                    "UPDATE manual_overrides SET active = 0 WHERE id = ?",
                    [override_id],
                )?,
            };
        }

        tx.commit()?;
        Ok(groups.len())
    }

    fn load_groups(&self) -> Result<Vec<DuplicateGroup>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, tier, original_id, confidence, metadata FROM duplicate_groups ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut member_stmt = conn.prepare(
            "SELECT file_id FROM group_members
             WHERE group_id = ? AND position > 0 ORDER BY position",
        )?;

        let mut groups = Vec::with_capacity(rows.len());
        for (id, tier, original_id, confidence, metadata) in rows {
            let tier = GroupTier::from_str(&tier).ok_or_else(|| StoreError::Corrupted {
                path: self.db_path.clone(),
            })?;
            let metadata: GroupMetadata = serde_json::from_str(&metadata)
                .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;
            let duplicate_ids = member_stmt
                .query_map([id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            groups.push(DuplicateGroup {
                id,
                tier,
                original_id,
                duplicate_ids,
                confidence,
                metadata,
            });
        }

        Ok(groups)
    }

    fn load_members(&self, group_id: i64) -> Result<Vec<GroupMember>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT group_id, file_id, role FROM group_members WHERE group_id = ? ORDER BY file_id",
        )?;
        let rows = stmt
            .query_map([group_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(group_id, file_id, role)| self.member(group_id, file_id, &role))
            .collect()
    }

    fn all_members(&self) -> Result<Vec<GroupMember>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT group_id, file_id, role FROM group_members ORDER BY group_id, file_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(group_id, file_id, role)| self.member(group_id, file_id, &role))
            .collect()
    }

    fn set_member_role(
        &self,
        group_id: i64,
        file_id: i64,
        role: MemberRole,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE group_members SET role = ? WHERE group_id = ? AND file_id = ?",
            params![role.as_str(), group_id, file_id],
        )?;

        if rows > 0 {
            return Ok(());
        }

        let group_exists: bool = conn
            .query_row(
                "SELECT 1 FROM duplicate_groups WHERE id = ?",
                [group_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        if group_exists {
            Err(StoreError::MemberNotFound { group_id, file_id })
        } else {
            Err(StoreError::GroupNotFound { group_id })
        }
    }
}

impl SqliteStore {
    fn member(&self, group_id: i64, file_id: i64, role: &str) -> Result<GroupMember, StoreError> {
        let role = MemberRole::from_str(role).ok_or_else(|| StoreError::Corrupted {
            path: self.db_path.clone(),
        })?;
        Ok(GroupMember {
            group_id,
            file_id,
            role,
        })
    }
}

impl OverrideStore for SqliteStore {
    fn get_override_for_group(&self, group_id: i64) -> Result<Option<ManualOverride>, StoreError> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                &format!(
                    "SELECT {} FROM manual_overrides WHERE group_id = ? AND active = 1
                     ORDER BY id DESC LIMIT 1",
                    OVERRIDE_COLUMNS
                ),
                [group_id],
                Self::override_from_row,
            )
            .optional()?;
        Ok(found)
    }

    fn record_override(&self, override_: &ManualOverride) -> Result<i64, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE manual_overrides SET active = 0 WHERE group_id = ?",
            [override_.group_id],
        )?;
        tx.execute(
            "INSERT INTO manual_overrides
             (group_id, original_file_id, automatic_file_id, override_type, reason,
              created_at, active)
             VALUES (?, ?, ?, ?, ?, ?, 1)",
            params![
                override_.group_id,
                override_.original_file_id,
                override_.automatic_file_id,
                override_.override_type.as_str(),
                override_.reason,
                override_.created_at.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(id)
    }

    fn remove_override(&self, group_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE manual_overrides SET active = 0 WHERE group_id = ? AND active = 1",
            [group_id],
        )?;
        Ok(rows > 0)
    }

    fn list_active_overrides(&self) -> Result<Vec<ManualOverride>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM manual_overrides WHERE active = 1 ORDER BY group_id",
            OVERRIDE_COLUMNS
        ))?;
        let overrides = stmt
            .query_map([], Self::override_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn taken(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn full_record(id: i64) -> FileRecord {
        FileRecord::new(id, format!("/photos/{}.cr2", id), 24_000_000, "abc123")
            .with_sha256("deadbeef")
            .with_hashes(Some("ff00ff00ff00ff00"), Some("0f0f0f0f0f0f0f0f"), None)
            .with_dimensions(6000, 4000)
            .with_exif(taken(10, 30, 15), Some("Canon EOS R5"))
            .with_format(FileFormat::Raw)
    }

    fn group(id: i64, original: i64, duplicates: Vec<i64>) -> DuplicateGroup {
        DuplicateGroup {
            id,
            tier: GroupTier::Near,
            original_id: original,
            duplicate_ids: duplicates,
            confidence: 0.75,
            metadata: GroupMetadata {
                min_phash_distance: Some(3),
                reclaimable_bytes: 1024,
                ..GroupMetadata::default()
            },
        }
    }

    #[test]
    fn sqlite_store_creates_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("photos.db");

        let store = SqliteStore::open(&db_path).unwrap();

        assert!(db_path.exists());
        assert!(store.load_records().unwrap().is_empty());
    }

    #[test]
    fn records_round_trip_all_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = full_record(1);

        store.upsert_record(&record).unwrap();

        assert_eq!(store.get_record(1).unwrap(), Some(record));
        assert!(store.get_record(2).unwrap().is_none());
    }

    #[test]
    fn batch_upsert_replaces_existing() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_records(&[full_record(1), full_record(2)]).unwrap();

        let mut changed = full_record(2);
        changed.size = 10;
        store.upsert_records(&[changed]).unwrap();

        let records = store.load_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].size, 10);
        assert!(store.remove_record(1).unwrap());
        assert!(!store.remove_record(1).unwrap());
    }

    #[test]
    fn groups_round_trip_with_member_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let stored = group(1, 30, vec![12, 5]);

        assert_eq!(store.replace_groups(&[stored.clone()]).unwrap(), 1);

        let loaded = store.load_groups().unwrap();
        assert_eq!(loaded, vec![stored]);

        let members = store.load_members(1).unwrap();
        assert_eq!(members.len(), 3);
        let original = members.iter().find(|m| m.file_id == 30).unwrap();
        assert_eq!(original.role, MemberRole::Original);
    }

    #[test]
    fn replace_groups_is_wholesale() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.replace_groups(&[group(1, 1, vec![2]), group(2, 3, vec![4])]).unwrap();
        store.replace_groups(&[group(5, 6, vec![7])]).unwrap();

        let ids: Vec<i64> = store.load_groups().unwrap().iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![5]);
        assert_eq!(store.all_members().unwrap().len(), 2);
    }

    #[test]
    fn role_updates_persist() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.replace_groups(&[group(1, 1, vec![2])]).unwrap();

        store.set_member_role(1, 2, MemberRole::SafeDuplicate).unwrap();

        let members = store.all_members().unwrap();
        assert_eq!(members[1].role, MemberRole::SafeDuplicate);
        assert!(matches!(
            store.set_member_role(1, 9, MemberRole::Duplicate),
            Err(StoreError::MemberNotFound { group_id: 1, file_id: 9 })
        ));
        assert!(matches!(
            store.set_member_role(4, 2, MemberRole::Duplicate),
            Err(StoreError::GroupNotFound { group_id: 4 })
        ));
    }

    #[test]
    fn overrides_keep_one_active_per_group() {
        let store = SqliteStore::open_in_memory().unwrap();

        let first = store
            .record_override(&ManualOverride::new(1, 10, Some(11)))
            .unwrap();
        let second = store
            .record_override(&ManualOverride::new(1, 12, Some(11)).with_reason("sharper"))
            .unwrap();
        store.record_override(&ManualOverride::new(2, 20, None)).unwrap();

        assert!(second > first);
        let active = store.get_override_for_group(1).unwrap().unwrap();
        assert_eq!(active.original_file_id, 12);
        assert_eq!(active.reason.as_deref(), Some("sharper"));
        assert_eq!(store.list_active_overrides().unwrap().len(), 2);

        assert!(store.remove_override(1).unwrap());
        assert!(store.get_override_for_group(1).unwrap().is_none());
        assert!(!store.remove_override(1).unwrap());
    }

    #[test]
    fn data_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("photos.db");

        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.upsert_record(&full_record(1)).unwrap();
            store.replace_groups(&[group(1, 1, vec![2])]).unwrap();
        }

        let store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store.load_records().unwrap().len(), 1);
        assert_eq!(store.load_groups().unwrap().len(), 1);
    }

    #[test]
    fn replace_groups_moves_and_deactivates_overrides() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.record_override(&ManualOverride::new(1, 5, None)).unwrap();
        store.record_override(&ManualOverride::new(2, 42, None)).unwrap();

        store
            .replace_groups(&[group(1, 3, vec![4]), group(2, 5, vec![6])])
            .unwrap();

        let active = store.list_active_overrides().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].group_id, 2);
        assert_eq!(active[0].original_file_id, 5);
        assert!(store.get_override_for_group(1).unwrap().is_none());
    }

    #[test]
    fn failed_replace_keeps_previous_groups() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.replace_groups(&[group(1, 1, vec![2])]).unwrap();

        // duplicate group id violates the primary key halfway through
        let result = store.replace_groups(&[group(7, 3, vec![4]), group(7, 5, vec![6])]);

        assert!(result.is_err());
        let groups = store.load_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, 1);
        assert_eq!(store.all_members().unwrap().len(), 2);
    }
}
