use std::path::{Path, PathBuf};

use filewarden_core::hasher::hash_data;
use filewarden_core::storage::models::*;
use filewarden_core::storage::{Database, Registry};
use tempfile::tempdir;

fn new_file(path: &str, content: &[u8], origin_folder_id: Option<i64>) -> NewTrackedFile {
    NewTrackedFile {
        path: PathBuf::from(path),
        content_hash: hash_data(content),
        is_modified: false,
        origin_folder_id,
    }
}

fn count_rows(db: &Database, table: &str) -> i64 {
    db.connection()
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap()
}

#[test]
fn test_add_list_and_exists() {
    let db = Database::open_in_memory().unwrap();
    let added = db.add_file(&new_file("/docs/report.txt", b"v1", None)).unwrap();
    assert!(added.id > 0);
    assert!(!added.is_missing);

    let files = db.list_files().unwrap();
    assert_eq!(files, vec![added]);
    assert!(db.file_exists(Path::new("/docs/report.txt")).unwrap());
    assert!(!db.file_exists(Path::new("/docs/other.txt")).unwrap());
}

#[test]
fn test_duplicate_path_rejected() {
    let db = Database::open_in_memory().unwrap();
    db.add_file(&new_file("/a", b"a", None)).unwrap();
    assert!(db.add_file(&new_file("/a", b"b", None)).is_err());
}

#[test]
fn test_update_file_by_id() {
    let db = Database::open_in_memory().unwrap();
    let file = db.add_file(&new_file("/a", b"a", None)).unwrap();
    db.update_file(&FileUpdate {
        id: file.id,
        content_hash: hash_data(b"b"),
        is_modified: true,
        is_missing: true,
    })
    .unwrap();

    let stored = &db.list_files().unwrap()[0];
    assert_eq!(stored.content_hash, hash_data(b"b"));
    assert!(stored.is_modified);
    assert!(stored.is_missing);
}

#[test]
fn test_add_folder_registers_members_under_new_id() {
    let db = Database::open_in_memory().unwrap();
    let (folder, members) = db
        .add_folder(
            Path::new("/docs"),
            true,
            &[new_file("/docs/a.txt", b"a", None), new_file("/docs/b.txt", b"b", Some(99))],
        )
        .unwrap();

    assert_eq!(members.len(), 2);
    assert!(members.iter().all(|m| m.origin_folder_id == Some(folder.id)));
    assert_eq!(db.list_files().unwrap(), members);
    assert_eq!(db.list_folders().unwrap(), vec![folder]);
}

#[test]
fn test_failed_add_folder_leaves_no_folder_row() {
    let db = Database::open_in_memory().unwrap();

    // The second member collides with the first, after the folder row was inserted.
    let result = db.add_folder(
        Path::new("/docs"),
        true,
        &[new_file("/docs/a.txt", b"a", None), new_file("/docs/a.txt", b"a", None)],
    );

    assert!(result.is_err());
    assert_eq!(count_rows(&db, "tracked_folder"), 0);
    assert_eq!(count_rows(&db, "tracked_file"), 0);
    assert!(db
        .add_folder(Path::new("/docs"), true, &[new_file("/docs/a.txt", b"a", None)])
        .is_ok());
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_path_is_refused() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let db = Database::open_in_memory().unwrap();
    let odd = Path::new("/docs").join(OsStr::from_bytes(b"bad\xff.txt"));
    let file = NewTrackedFile {
        path: odd.clone(),
        ..new_file("/unused", b"x", None)
    };

    assert!(matches!(
        db.add_file(&file),
        Err(filewarden_core::Error::InvalidPath { .. })
    ));
    assert!(db.file_exists(&odd).is_err());
    assert_eq!(count_rows(&db, "tracked_file"), 0);
}

#[test]
fn test_remove_folder_takes_members_but_not_individual_files() {
    let db = Database::open_in_memory().unwrap();
    let (folder, _) = db
        .add_folder(Path::new("/docs"), true, &[new_file("/docs/member.txt", b"m", None)])
        .unwrap();
    db.add_file(&new_file("/docs/own.txt", b"o", None)).unwrap();

    assert_eq!(db.remove_folders(&[folder.id]).unwrap(), 1);
    let remaining = db.list_files().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].path, PathBuf::from("/docs/own.txt"));
    assert!(!db.folder_exists(Path::new("/docs")).unwrap());
}

#[test]
fn test_apply_changes_in_one_unit() {
    let db = Database::open_in_memory().unwrap();
    let keep = db.add_file(&new_file("/keep", b"k", None)).unwrap();
    let gone = db.add_file(&new_file("/gone", b"g", None)).unwrap();

    let inserted = db
        .apply_changes(&ChangeSet {
            new_files: vec![new_file("/new", b"n", None)],
            updated_files: vec![FileUpdate {
                is_modified: true,
                ..FileUpdate::from(&keep)
            }],
            removed_file_ids: vec![gone.id],
        })
        .unwrap();

    assert_eq!(inserted.len(), 1);
    assert!(inserted[0].id > gone.id);
    let files = db.list_files().unwrap();
    let paths: Vec<&Path> = files.iter().map(|f| f.path.as_path()).collect();
    assert_eq!(paths, vec![Path::new("/keep"), Path::new("/new")]);
    assert!(files[0].is_modified);
}

#[test]
fn test_failed_apply_changes_writes_nothing() {
    let db = Database::open_in_memory().unwrap();
    let existing = db.add_file(&new_file("/dup", b"d", None)).unwrap();

    // The insert collides with an existing path after the update succeeded.
    let result = db.apply_changes(&ChangeSet {
        new_files: vec![new_file("/dup", b"x", None)],
        updated_files: vec![FileUpdate {
            is_modified: true,
            ..FileUpdate::from(&existing)
        }],
        removed_file_ids: Vec::new(),
    });

    assert!(result.is_err());
    assert!(!db.list_files().unwrap()[0].is_modified);
}

#[test]
fn test_empty_change_set_is_a_no_op() {
    let db = Database::open_in_memory().unwrap();
    let before: i64 = db
        .connection()
        .query_row("SELECT total_changes()", [], |row| row.get(0))
        .unwrap();
    assert!(db.apply_changes(&ChangeSet::default()).unwrap().is_empty());
    let after: i64 = db
        .connection()
        .query_row("SELECT total_changes()", [], |row| row.get(0))
        .unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_destinations_and_ignorables() {
    let db = Database::open_in_memory().unwrap();
    let dest = db.add_destination(Path::new("/mnt/usb")).unwrap();
    db.update_destination(dest.id, true).unwrap();
    assert!(db.list_destinations().unwrap()[0].is_selected);
    assert!(db.destination_exists(Path::new("/mnt/usb")).unwrap());
    assert_eq!(db.remove_destinations(&[dest.id]).unwrap(), 1);
    assert_eq!(count_rows(&db, "backup_destination"), 0);

    let name = db.add_ignorable(".git").unwrap();
    assert!(db.ignorable_exists(".git").unwrap());
    assert!(!db.ignorable_exists("git").unwrap());
    assert_eq!(db.remove_ignorable(&[name.id]).unwrap(), 1);
}

#[test]
fn test_settings_round_trip_and_upsert() {
    let db = Database::open_in_memory().unwrap();
    assert_eq!(db.get_bool_setting(setting_keys::OVERWRITE_UPDATED_FILES).unwrap(), None);
    db.set_setting(setting_keys::OVERWRITE_UPDATED_FILES, "true").unwrap();
    db.set_setting(setting_keys::OVERWRITE_UPDATED_FILES, "false").unwrap();
    assert_eq!(
        db.get_bool_setting(setting_keys::OVERWRITE_UPDATED_FILES).unwrap(),
        Some(false)
    );
    assert_eq!(count_rows(&db, "setting"), 1);
}

#[test]
fn test_reopen_keeps_data() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("registry.db");
    let path = path.to_str().unwrap();
    {
        let db = Database::open(path).unwrap();
        db.add_file(&new_file("/persisted", b"p", None)).unwrap();
    }
    let db = Database::open(path).unwrap();
    assert_eq!(db.list_files().unwrap().len(), 1);
    assert_eq!(db.lock_file_path(), Some(tmp.path().join("registry.db.lock")));
}
