use super::*;
use openduckbill_core::config::{BackupMethod as RawBackupMethod, GlobalConfig as CoreGlobalConfig};
use proptest::prelude::*;

fn local_destination() -> Destination {
    let config = CoreGlobalConfig {
        backup_method: RawBackupMethod::Local,
        sync_interval_secs: 300,
        commit_threshold: 64,
        maintain_previous: false,
        retain_backups: true,
        retention_secs: 604_800,
        server: None,
        remote_mount: None,
        local_mount: Some("/mnt/bk".into()),
        ssh_port: 22,
        ssh_user: None,
        global_excludes: vec![],
    };
    Destination::new(&config, CommandRunner::new(false))
}

fn entry(path: &str, recursive: bool) -> Entry {
    Entry {
        name: "docs".into(),
        path: PathBuf::from(path),
        recursive,
        include: vec![],
        exclude: vec![],
    }
}

fn opts<'a>(exclude_file: &'a Path) -> JobOptions<'a> {
    JobOptions {
        rsync_binary: "rsync",
        exclude_file,
        dry_run: false,
        maintain_previous: false,
        is_remote: false,
        ssh_path: "ssh",
        ssh_port: 22,
    }
}

#[test]
fn argv_ends_with_source_then_destination() {
    let dest = local_destination();
    let layout = PathBuf::from("/mnt/bk/alice/__backups__/host");
    let exclude = PathBuf::from("/tmp/ex.glbexclude");
    let e = entry("/home/alice/docs", true);

    let argv = build_argv(&e, None, &dest, &layout, &opts(&exclude));

    assert_eq!(argv[0], "rsync");
    assert!(argv.contains(&"-r".to_string()));
    assert_eq!(argv.last().unwrap(), "/mnt/bk/alice/__backups__/host");
    assert_eq!(argv[argv.len() - 2], "/home/alice/docs");
}

#[test]
fn dry_run_inserts_flag_right_after_binary() {
    let dest = local_destination();
    let layout = PathBuf::from("/mnt/bk/alice/__backups__/host");
    let exclude = PathBuf::from("/tmp/ex.glbexclude");
    let e = entry("/home/alice/docs", true);
    let mut o = opts(&exclude);
    o.dry_run = true;

    let argv = build_argv(&e, None, &dest, &layout, &o);
    assert_eq!(argv[1], "--dry-run");
}

#[test]
fn maintain_previous_uses_backup_suffix_instead_of_delete() {
    let dest = local_destination();
    let layout = PathBuf::from("/mnt/bk/alice/__backups__/host");
    let exclude = PathBuf::from("/tmp/ex.glbexclude");
    let e = entry("/home/alice/docs", true);
    let mut o = opts(&exclude);
    o.maintain_previous = true;

    let argv = build_argv(&e, None, &dest, &layout, &o);
    assert!(argv.contains(&"-b".to_string()));
    assert!(argv.contains(&"--suffix=.odb~".to_string()));
    assert!(!argv.contains(&"--delete".to_string()));
}

#[test]
fn non_recursive_directory_source_gets_trailing_slash() {
    let dir = tempfile::tempdir().unwrap();
    let dest = local_destination();
    let layout = PathBuf::from("/mnt/bk/alice/__backups__/host");
    let exclude = PathBuf::from("/tmp/ex.glbexclude");
    let e = entry(dir.path().to_str().unwrap(), false);

    let argv = build_argv(&e, None, &dest, &layout, &opts(&exclude));
    let source = &argv[argv.len() - 2];
    assert!(source.ends_with('/'));
}

#[test]
fn non_recursive_file_source_has_no_trailing_slash() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("f.txt");
    std::fs::write(&file_path, b"x").unwrap();
    let dest = local_destination();
    let layout = PathBuf::from("/mnt/bk/alice/__backups__/host");
    let exclude = PathBuf::from("/tmp/ex.glbexclude");
    let e = entry(file_path.to_str().unwrap(), false);

    let argv = build_argv(&e, None, &dest, &layout, &opts(&exclude));
    let source = &argv[argv.len() - 2];
    assert!(!source.ends_with('/'));
}

#[test]
fn common_dir_prefix_single_path_is_verbatim() {
    let paths = [Path::new("/a/b/c.txt")];
    assert_eq!(common_dir_prefix(&paths), PathBuf::from("/a/b/c.txt"));
}

#[test]
fn common_dir_prefix_of_siblings_is_parent_dir() {
    let paths = [Path::new("/a/b/c.txt"), Path::new("/a/b/d.txt")];
    assert_eq!(common_dir_prefix(&paths), PathBuf::from("/a/b"));
}

#[test]
fn common_dir_prefix_of_divergent_paths_is_shared_ancestor() {
    let paths = [Path::new("/a/b/c.txt"), Path::new("/a/x/d.txt")];
    assert_eq!(common_dir_prefix(&paths), PathBuf::from("/a"));
}

#[test]
fn narrow_paths_drops_unmatched_paths() {
    let entries = vec![entry("/home/alice/docs", true)];
    let modified = vec![
        PathBuf::from("/home/alice/docs/a.txt"),
        PathBuf::from("/home/alice/docs/sub/b.txt"),
        PathBuf::from("/etc/unrelated"),
    ];

    let narrowed = narrow_paths(&modified, &entries);
    assert_eq!(narrowed.len(), 1);
    assert_eq!(narrowed[0].1, PathBuf::from("/home/alice/docs"));
}

fn path_segment_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,6}".prop_map(String::from)
}

fn absolute_path_strategy() -> impl Strategy<Value = PathBuf> {
    prop::collection::vec(path_segment_strategy(), 1..5).prop_map(|segments| {
        let mut path = PathBuf::from("/");
        path.extend(segments);
        path
    })
}

proptest! {
    /// Law: the narrowed path is always an ancestor of (or equal to) every
    /// path it was narrowed from.
    #[test]
    fn common_dir_prefix_is_ancestor_of_every_input(
        paths in prop::collection::vec(absolute_path_strategy(), 2..6)
    ) {
        let refs: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
        let common = common_dir_prefix(&refs);
        for p in &paths {
            prop_assert!(p.starts_with(&common), "{p:?} does not start with {common:?}");
        }
    }

    /// Law: the narrowed path is maximal — it can't be extended by one more
    /// component and still be common to every input, unless all inputs are
    /// identical down to the shortest one's length.
    #[test]
    fn common_dir_prefix_cannot_be_extended_further(
        paths in prop::collection::vec(absolute_path_strategy(), 2..6)
    ) {
        let refs: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
        let common = common_dir_prefix(&refs);
        let common_len = common.components().count();
        let shortest_len = paths.iter().map(|p| p.components().count()).min().unwrap_or(0);

        if common_len < shortest_len {
            let next_components: Vec<_> =
                paths.iter().map(|p| p.components().nth(common_len)).collect();
            prop_assert!(
                next_components.windows(2).any(|w| w[0] != w[1]),
                "prefix {common:?} should have been extendable across {paths:?}"
            );
        }
    }

    /// Law's tie-break: a single-path set narrows to that exact path.
    #[test]
    fn common_dir_prefix_of_one_path_is_verbatim(path in absolute_path_strategy()) {
        let refs = [path.as_path()];
        prop_assert_eq!(common_dir_prefix(&refs), path);
    }

    /// narrow_paths never produces a result outside the covering entry's tree.
    #[test]
    fn narrow_paths_result_stays_under_entry_path(
        suffixes in prop::collection::vec(path_segment_strategy(), 1..6)
    ) {
        let entries = vec![entry("/home/alice/docs", true)];
        let modified: Vec<PathBuf> = suffixes
            .iter()
            .map(|s| PathBuf::from("/home/alice/docs").join(s))
            .collect();

        let narrowed = narrow_paths(&modified, &entries);
        prop_assert_eq!(narrowed.len(), 1);
        prop_assert!(narrowed[0].1.starts_with("/home/alice/docs"));
        for m in &modified {
            prop_assert!(m.starts_with(&narrowed[0].1));
        }
    }
}
