use super::models::*;
use super::sqlite::Database;
use super::Registry;
use crate::error::{Error, Result};
use crate::hasher::ContentHash;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Paths are stored as TEXT and must read back byte-for-byte, so a path
/// that is not UTF-8 is refused rather than lossily converted.
fn path_text(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| Error::InvalidPath {
        path: path.to_path_buf(),
    })
}

/// Insert `files` through `conn`, usually inside a transaction. A `folder_id`
/// overrides each file's own `origin_folder_id`.
fn insert_files(
    conn: &Connection,
    files: &[NewTrackedFile],
    folder_id: Option<i64>,
) -> Result<Vec<TrackedFile>> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO tracked_file (path, content_hash, is_modified, is_missing, origin_folder_id) \
         VALUES (?1, ?2, ?3, 0, ?4)",
    )?;
    let mut inserted = Vec::with_capacity(files.len());
    for file in files {
        let origin_folder_id = folder_id.or(file.origin_folder_id);
        stmt.execute(params![
            path_text(&file.path)?,
            file.content_hash.as_str(),
            file.is_modified,
            origin_folder_id
        ])?;
        inserted.push(TrackedFile {
            id: conn.last_insert_rowid(),
            path: file.path.clone(),
            content_hash: file.content_hash.clone(),
            is_modified: file.is_modified,
            is_missing: false,
            origin_folder_id,
        });
    }
    Ok(inserted)
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<TrackedFile> {
    Ok(TrackedFile {
        id: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        content_hash: ContentHash::from_hex(row.get::<_, String>(2)?),
        is_modified: row.get(3)?,
        is_missing: row.get(4)?,
        origin_folder_id: row.get(5)?,
    })
}

impl Database {
    fn delete_by_ids(&self, table: &str, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let tx = self.connection().unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached(&format!("DELETE FROM {} WHERE id = ?1", table))?;
            for id in ids {
                count += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        debug!("Removed {} rows from {}", count, table);
        Ok(count)
    }

    fn exists(&self, sql: &str, value: &str) -> Result<bool> {
        let found: Option<i64> = self
            .connection()
            .query_row(sql, params![value], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }
}

impl Registry for Database {
    // ── Tracked files ────────────────────────────────────────────

    fn list_files(&self) -> Result<Vec<TrackedFile>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, path, content_hash, is_modified, is_missing, origin_folder_id \
             FROM tracked_file ORDER BY id",
        )?;
        let files = stmt
            .query_map([], file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    fn add_file(&self, file: &NewTrackedFile) -> Result<TrackedFile> {
        let mut inserted = insert_files(self.connection(), std::slice::from_ref(file), None)?;
        Ok(inserted.remove(0))
    }

    fn remove_files(&self, ids: &[i64]) -> Result<usize> {
        self.delete_by_ids("tracked_file", ids)
    }

    fn file_exists(&self, path: &Path) -> Result<bool> {
        self.exists(
            "SELECT id FROM tracked_file WHERE path = ?1",
            path_text(path)?,
        )
    }

    fn update_file(&self, update: &FileUpdate) -> Result<()> {
        self.connection().execute(
            "UPDATE tracked_file SET content_hash = ?1, is_modified = ?2, is_missing = ?3 \
             WHERE id = ?4",
            params![
                update.content_hash.as_str(),
                update.is_modified,
                update.is_missing,
                update.id
            ],
        )?;
        Ok(())
    }

    // ── Tracked folders ──────────────────────────────────────────

    fn list_folders(&self) -> Result<Vec<TrackedFolder>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, path, monitor_all_subfolders FROM tracked_folder ORDER BY id",
        )?;
        let folders = stmt
            .query_map([], |row| {
                Ok(TrackedFolder {
                    id: row.get(0)?,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                    monitor_all_subfolders: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    fn add_folder(
        &self,
        path: &Path,
        monitor_all_subfolders: bool,
        members: &[NewTrackedFile],
    ) -> Result<(TrackedFolder, Vec<TrackedFile>)> {
        let tx = self.connection().unchecked_transaction()?;
        tx.execute(
            "INSERT INTO tracked_folder (path, monitor_all_subfolders) VALUES (?1, ?2)",
            params![path_text(path)?, monitor_all_subfolders],
        )?;
        let folder = TrackedFolder {
            id: tx.last_insert_rowid(),
            path: path.to_path_buf(),
            monitor_all_subfolders,
        };
        let inserted = insert_files(&tx, members, Some(folder.id))?;
        tx.commit()?;
        debug!(
            "Added folder {} with {} member files",
            folder.id,
            inserted.len()
        );
        Ok((folder, inserted))
    }

    /// Member files go with their folder.
    fn remove_folders(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let tx = self.connection().unchecked_transaction()?;
        let mut count = 0;
        {
            let mut members = tx.prepare_cached("DELETE FROM tracked_file WHERE origin_folder_id = ?1")?;
            let mut folder = tx.prepare_cached("DELETE FROM tracked_folder WHERE id = ?1")?;
            for id in ids {
                let removed_members = members.execute(params![id])?;
                count += folder.execute(params![id])?;
                debug!("Removed folder {} with {} member files", id, removed_members);
            }
        }
        tx.commit()?;
        Ok(count)
    }

    fn folder_exists(&self, path: &Path) -> Result<bool> {
        self.exists(
            "SELECT id FROM tracked_folder WHERE path = ?1",
            path_text(path)?,
        )
    }

    // ── Backup destinations ──────────────────────────────────────

    fn list_destinations(&self) -> Result<Vec<BackupDestination>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, path, is_selected FROM backup_destination ORDER BY id",
        )?;
        let destinations = stmt
            .query_map([], |row| {
                Ok(BackupDestination {
                    id: row.get(0)?,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                    is_selected: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(destinations)
    }

    fn add_destination(&self, path: &Path) -> Result<BackupDestination> {
        self.connection().execute(
            "INSERT INTO backup_destination (path, is_selected) VALUES (?1, 0)",
            params![path_text(path)?],
        )?;
        Ok(BackupDestination {
            id: self.connection().last_insert_rowid(),
            path: path.to_path_buf(),
            is_selected: false,
        })
    }

    fn remove_destinations(&self, ids: &[i64]) -> Result<usize> {
        self.delete_by_ids("backup_destination", ids)
    }

    fn destination_exists(&self, path: &Path) -> Result<bool> {
        self.exists(
            "SELECT id FROM backup_destination WHERE path = ?1",
            path_text(path)?,
        )
    }

    fn update_destination(&self, id: i64, is_selected: bool) -> Result<()> {
        self.connection().execute(
            "UPDATE backup_destination SET is_selected = ?1 WHERE id = ?2",
            params![is_selected, id],
        )?;
        Ok(())
    }

    // ── Ignorable names ──────────────────────────────────────────

    fn list_ignorable(&self) -> Result<Vec<IgnorableName>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT id, name FROM ignorable_name ORDER BY id")?;
        let names = stmt
            .query_map([], |row| {
                Ok(IgnorableName {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn add_ignorable(&self, name: &str) -> Result<IgnorableName> {
        self.connection().execute(
            "INSERT INTO ignorable_name (name) VALUES (?1)",
            params![name],
        )?;
        Ok(IgnorableName {
            id: self.connection().last_insert_rowid(),
            name: name.to_string(),
        })
    }

    fn remove_ignorable(&self, ids: &[i64]) -> Result<usize> {
        self.delete_by_ids("ignorable_name", ids)
    }

    fn ignorable_exists(&self, name: &str) -> Result<bool> {
        self.exists("SELECT id FROM ignorable_name WHERE name = ?1", name)
    }

    // ── Settings ─────────────────────────────────────────────────

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .connection()
            .query_row(
                "SELECT value FROM setting WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.connection().execute(
            "INSERT INTO setting (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // ── Pass persistence ─────────────────────────────────────────

    fn apply_changes(&self, changes: &ChangeSet) -> Result<Vec<TrackedFile>> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let tx = self.connection().unchecked_transaction()?;
        {
            let mut remove_stmt = tx.prepare_cached("DELETE FROM tracked_file WHERE id = ?1")?;
            for id in &changes.removed_file_ids {
                remove_stmt.execute(params![id])?;
            }

            let mut update_stmt = tx.prepare_cached(
                "UPDATE tracked_file SET content_hash = ?1, is_modified = ?2, is_missing = ?3 \
                 WHERE id = ?4",
            )?;
            for update in &changes.updated_files {
                update_stmt.execute(params![
                    update.content_hash.as_str(),
                    update.is_modified,
                    update.is_missing,
                    update.id
                ])?;
            }
        }
        let inserted = insert_files(&tx, &changes.new_files, None)?;
        tx.commit()?;
        debug!(
            "Applied change set: {} new, {} updated, {} removed",
            changes.new_files.len(),
            changes.updated_files.len(),
            changes.removed_file_ids.len()
        );
        Ok(inserted)
    }

    fn lock_file_path(&self) -> Option<PathBuf> {
        self.lock_path().map(Path::to_path_buf)
    }
}
