// Integration tests for archive extraction and wrapper flattening.

mod support;

use std::fs;
use std::path::Path;

use repo_digest_core::extract::{extract, ExtractError};
use support::zip_bytes;
use tempfile::tempdir;

fn write_archive(dir: &Path, name: &str, entries: &[(&str, Option<&str>)]) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, zip_bytes(entries)).unwrap();
    path
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn single_wrapping_folder_is_flattened_and_archive_removed() {
    let tmp = tempdir().unwrap();
    let archive = write_archive(
        tmp.path(),
        "alpha.zip",
        &[
            ("alpha-main/", None),
            ("alpha-main/README.md", Some("# alpha\n")),
            ("alpha-main/src/", None),
            ("alpha-main/src/main.py", Some("print('hi')\n")),
        ],
    );
    let destination = tmp.path().join("alpha");

    let project = extract(&archive, &destination).expect("extraction should succeed");

    assert_eq!(project.root_path, destination);
    assert_eq!(project.project_folder_name.as_deref(), Some("alpha-main"));
    assert!(project.flattened);
    assert_eq!(listing(&destination), vec!["README.md", "src"]);
    assert_eq!(
        fs::read_to_string(destination.join("src/main.py")).unwrap(),
        "print('hi')\n"
    );
    assert!(!destination.join("alpha-main").exists());
    assert!(!archive.exists(), "archive is deleted after a successful unpack");
}

#[test]
fn wrapper_without_directory_entries_is_still_flattened() {
    let tmp = tempdir().unwrap();
    let archive = write_archive(
        tmp.path(),
        "repo.zip",
        &[("repo-1a2b3c/Cargo.toml", Some("[package]\n")), ("repo-1a2b3c/src/lib.rs", Some(""))],
    );
    let destination = tmp.path().join("repo");

    let project = extract(&archive, &destination).unwrap();

    assert!(project.flattened);
    assert_eq!(listing(&destination), vec!["Cargo.toml", "src"]);
}

#[test]
fn child_sharing_the_wrapper_name_survives_flattening() {
    let tmp = tempdir().unwrap();
    let archive = write_archive(
        tmp.path(),
        "nested.zip",
        &[
            ("nested/nested/inner.txt", Some("inner")),
            ("nested/top.txt", Some("top")),
        ],
    );
    let destination = tmp.path().join("out");

    extract(&archive, &destination).unwrap();

    assert_eq!(listing(&destination), vec!["nested", "top.txt"]);
    assert_eq!(
        fs::read_to_string(destination.join("nested/inner.txt")).unwrap(),
        "inner"
    );
}

#[test]
fn flatten_clash_leaves_destination_and_wrapper_untouched() {
    let tmp = tempdir().unwrap();
    let archive = write_archive(
        tmp.path(),
        "clash.zip",
        &[
            ("clash-main/a.txt", Some("from archive a")),
            ("clash-main/src/lib.rs", Some("pub fn f() {}\n")),
            ("clash-main/z.txt", Some("from archive z")),
        ],
    );
    let destination = tmp.path().join("out");
    fs::create_dir_all(destination.join("src")).unwrap();
    fs::write(destination.join("src").join("keep.rs"), "// already here\n").unwrap();

    let err = extract(&archive, &destination).unwrap_err();

    match err {
        ExtractError::Io { path, source } => {
            assert_eq!(path, destination.join("src"));
            assert_eq!(source.kind(), std::io::ErrorKind::AlreadyExists);
        }
        other => panic!("expected an Io error, got {other:?}"),
    }
    assert_eq!(listing(&destination), vec!["clash-main", "src"]);
    assert_eq!(listing(&destination.join("src")), vec!["keep.rs"]);
    assert_eq!(
        listing(&destination.join("clash-main")),
        vec!["a.txt", "src", "z.txt"]
    );
}

#[test]
fn multi_root_archive_is_left_as_is() {
    let tmp = tempdir().unwrap();
    let archive = write_archive(
        tmp.path(),
        "multi.zip",
        &[
            ("README.md", Some("readme")),
            ("src/", None),
            ("src/main.rs", Some("fn main() {}\n")),
        ],
    );
    let destination = tmp.path().join("multi");

    let project = extract(&archive, &destination).unwrap();

    assert!(!project.flattened);
    assert_eq!(project.project_folder_name, None);
    assert_eq!(listing(&destination), vec!["README.md", "src"]);
    assert_eq!(listing(&destination.join("src")), vec!["main.rs"]);
    assert!(!archive.exists());
}

#[test]
fn single_file_archive_is_not_flattened() {
    let tmp = tempdir().unwrap();
    let archive = write_archive(tmp.path(), "one.zip", &[("notes.txt", Some("just notes"))]);
    let destination = tmp.path().join("one");

    let project = extract(&archive, &destination).unwrap();

    assert!(!project.flattened);
    assert_eq!(project.project_folder_name.as_deref(), Some("notes.txt"));
    assert_eq!(listing(&destination), vec!["notes.txt"]);
}

#[test]
fn empty_archive_extracts_to_an_empty_project() {
    let tmp = tempdir().unwrap();
    let archive = write_archive(tmp.path(), "empty.zip", &[]);
    let destination = tmp.path().join("empty");

    let project = extract(&archive, &destination).expect("empty archives are not an error");

    assert_eq!(project.project_folder_name, None);
    assert!(!project.flattened);
    assert!(destination.is_dir());
    assert!(listing(&destination).is_empty());
    assert!(!archive.exists());
}

#[test]
fn corrupt_archive_is_reported_and_kept_on_disk() {
    let tmp = tempdir().unwrap();
    let archive = tmp.path().join("gamma.zip");
    fs::write(&archive, b"this is definitely not a zip file").unwrap();
    let destination = tmp.path().join("gamma");

    let err = extract(&archive, &destination).unwrap_err();

    assert!(matches!(err, ExtractError::CorruptArchive { .. }), "got {err:?}");
    assert!(archive.exists(), "corrupt archives are retained");
}

#[test]
fn missing_archive_is_an_io_error() {
    let tmp = tempdir().unwrap();
    let err = extract(&tmp.path().join("absent.zip"), &tmp.path().join("absent")).unwrap_err();
    assert!(matches!(err, ExtractError::Io { .. }));
}
