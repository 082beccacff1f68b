use super::*;
use tempfile::tempdir;

fn raw_with_entry(path: PathBuf) -> RawConfig {
    RawConfig {
        global: RawGlobal {
            backupmethod: Some(BackupMethod::Local),
            localmount: Some("/mnt/bk".into()),
            ..Default::default()
        },
        exclude: vec![],
        entry: vec![RawEntry {
            name: Some("docs".into()),
            path: Some(path),
            recursive: Some(true),
            include: vec![],
            exclude: vec![],
        }],
    }
}

#[test]
fn defaults_applied_when_optional_fields_absent() {
    let dir = tempdir().unwrap();
    let (global, entries) = GlobalConfig::from_raw(raw_with_entry(dir.path().to_path_buf())).unwrap();

    assert_eq!(global.sync_interval_secs, DEFAULT_SYNC_INTERVAL);
    assert_eq!(global.commit_threshold, DEFAULT_COMMIT_THRESHOLD);
    assert_eq!(global.retention_secs, DEFAULT_RETENTION_SECS);
    assert!(global.retain_backups);
    assert_eq!(entries.len(), 1);
}

#[test]
fn sync_interval_below_minimum_is_rejected() {
    let dir = tempdir().unwrap();
    let mut raw = raw_with_entry(dir.path().to_path_buf());
    raw.global.syncinterval = Some(1);

    let err = GlobalConfig::from_raw(raw).unwrap_err();
    assert!(matches!(err, ConfigError::SyncIntervalTooLow));
}

#[test]
fn rsync_mode_forces_retain_backups() {
    let dir = tempdir().unwrap();
    let mut raw = raw_with_entry(dir.path().to_path_buf());
    raw.global.backupmethod = Some(BackupMethod::Rsync);
    raw.global.server = Some("host".into());
    raw.global.remotemount = Some("/remote".into());
    raw.global.retainbackup = Some(false);

    let (global, _) = GlobalConfig::from_raw(raw).unwrap();
    assert!(global.retain_backups);
}

#[test]
fn nfs_mode_without_server_is_rejected() {
    let dir = tempdir().unwrap();
    let mut raw = raw_with_entry(dir.path().to_path_buf());
    raw.global.backupmethod = Some(BackupMethod::Nfs);

    let err = GlobalConfig::from_raw(raw).unwrap_err();
    assert!(matches!(err, ConfigError::MissingNfsEndpoint));
}

#[test]
fn missing_entry_path_is_skipped_not_fatal() {
    let dir = tempdir().unwrap();
    let mut raw = raw_with_entry(dir.path().to_path_buf());
    raw.entry.push(RawEntry {
        name: Some("ghost".into()),
        path: Some(PathBuf::from("/does/not/exist/anywhere")),
        recursive: Some(false),
        include: vec![],
        exclude: vec![],
    });

    let (_, entries) = GlobalConfig::from_raw(raw).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "docs");
}

#[test]
fn all_entries_missing_is_fatal() {
    let mut raw = raw_with_entry(PathBuf::from("/nope"));
    raw.entry[0].path = Some(PathBuf::from("/still/not/here"));

    let err = GlobalConfig::from_raw(raw).unwrap_err();
    assert!(matches!(err, ConfigError::NoEntries));
}

#[test]
fn duplicate_entry_paths_are_rejected() {
    let dir = tempdir().unwrap();
    let mut raw = raw_with_entry(dir.path().to_path_buf());
    raw.entry.push(RawEntry {
        name: Some("docs-again".into()),
        path: Some(dir.path().to_path_buf()),
        recursive: Some(false),
        include: vec![],
        exclude: vec![],
    });

    let err = GlobalConfig::from_raw(raw).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateEntryPath { .. }));
}

#[test]
fn load_override_path_is_used_verbatim_even_if_missing() {
    // resolve_config_path doesn't check existence of an explicit override; the
    // subsequent read is what surfaces a missing-file error.
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.yaml");
    let err = GlobalConfig::load(Some(&missing)).unwrap_err();
    assert!(matches!(err, ConfigError::Read(..)));
}

#[test]
fn load_parses_and_validates_a_real_yaml_file() {
    let dir = tempdir().unwrap();
    let entry_dir = dir.path().join("docs");
    std::fs::create_dir(&entry_dir).unwrap();
    let config_path = dir.path().join("config.yaml");
    std::fs::write(
        &config_path,
        format!(
            "global:\n  backupmethod: local\n  localmount: /mnt/bk\nentry:\n  - name: docs\n    path: {}\n    recursive: true\n",
            entry_dir.display()
        ),
    )
    .unwrap();

    let (global, entries, resolved) = GlobalConfig::load(Some(&config_path)).unwrap();
    assert_eq!(resolved, config_path);
    assert_eq!(global.backup_method, BackupMethod::Local);
    assert_eq!(entries.len(), 1);
}

#[test]
fn nested_under_recursive_entry_is_rejected() {
    let dir = tempdir().unwrap();
    let child = dir.path().join("child");
    std::fs::create_dir(&child).unwrap();

    let mut raw = raw_with_entry(dir.path().to_path_buf());
    raw.entry.push(RawEntry {
        name: Some("child".into()),
        path: Some(child),
        recursive: Some(false),
        include: vec![],
        exclude: vec![],
    });

    let err = GlobalConfig::from_raw(raw).unwrap_err();
    assert!(matches!(err, ConfigError::NestedUnderRecursiveEntry { .. }));
}
