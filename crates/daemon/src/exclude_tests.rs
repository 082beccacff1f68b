use super::*;

#[test]
fn directory_excludes_get_star_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_exclude_file(&[dir.path().display().to_string()]).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents, format!("- {}/*\n", dir.path().display()));
    let _ = std::fs::remove_file(path);
}

#[test]
fn file_excludes_have_no_star_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("secret.txt");
    std::fs::write(&file_path, b"x").unwrap();

    let path = build_exclude_file(&[file_path.display().to_string()]).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents, format!("- {}\n", file_path.display()));
    let _ = std::fs::remove_file(path);
}

#[test]
fn empty_exclude_list_produces_empty_file() {
    let path = build_exclude_file(&[]).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.is_empty());
    let _ = std::fs::remove_file(path);
}
