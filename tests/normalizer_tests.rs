//! Tests for the layout normalizer
//!
//! These tests verify:
//! - Nested `DVWA/` roots are flattened
//! - Flat trees and marker-less wrappers are copied unchanged
//! - The destination is fully replaced on every run
//! - Failures never leave a destination that looks deployed

use dvwa_deploy::error::DeployError;
use dvwa_deploy::normalizer::{normalize, resolve_source_root};
use std::collections::BTreeSet;
use std::fs::{self, File, FileTimes};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Every file below `root`, as sorted relative paths
fn files_under(root: &Path) -> BTreeSet<PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
        .collect()
}

fn set(paths: &[&str]) -> BTreeSet<PathBuf> {
    paths.iter().map(PathBuf::from).collect()
}

// =============================================================================
// Flattening
// =============================================================================

#[test]
fn test_nested_dvwa_is_flattened() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(src.path(), "DVWA/a.txt", "a");
    write(src.path(), "DVWA/sub/b.txt", "b");
    let dest = out.path().join("DVWA");

    normalize(src.path(), &dest).unwrap();

    assert_eq!(files_under(&dest), set(&["a.txt", "sub/b.txt"]));
    assert!(!dest.join("DVWA").exists());
    assert_eq!(fs::read_to_string(dest.join("sub/b.txt")).unwrap(), "b");
}

#[test]
fn test_nested_dvwa_wins_over_siblings() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(src.path(), "README.md", "readme");
    write(src.path(), "DVWA/index.php", "<?php");
    let dest = out.path().join("DVWA");

    normalize(src.path(), &dest).unwrap();

    assert_eq!(files_under(&dest), set(&["index.php"]));
}

#[test]
fn test_wrapper_with_marker_is_flattened_ignoring_hidden() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(src.path(), ".git/HEAD", "ref: refs/heads/master");
    write(src.path(), "DVWA-master/index.php", "<?php");
    write(src.path(), "DVWA-master/config/config.inc.php.dist", "<?php");
    let dest = out.path().join("DVWA");

    let summary = normalize(src.path(), &dest).unwrap();

    assert_eq!(summary.effective_root, src.path().join("DVWA-master"));
    assert_eq!(
        files_under(&dest),
        set(&["index.php", "config/config.inc.php.dist"])
    );
}

// =============================================================================
// No flattening
// =============================================================================

#[test]
fn test_flat_tree_copied_unchanged() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(src.path(), "index.php", "<?php");
    write(src.path(), "config/config.inc.php", "<?php");
    write(src.path(), "hackable/uploads/dvwa_email.png", "png");
    let dest = out.path().join("DVWA");

    normalize(src.path(), &dest).unwrap();

    assert_eq!(files_under(&dest), files_under(src.path()));
}

#[test]
fn test_ambiguous_subdirectory_is_not_flattened() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(src.path(), "assets/logo.png", "png");
    write(src.path(), "assets/css/main.css", "body{}");
    let dest = out.path().join("DVWA");

    let summary = normalize(src.path(), &dest).unwrap();

    assert_eq!(summary.effective_root, src.path());
    assert_eq!(
        files_under(&dest),
        set(&["assets/logo.png", "assets/css/main.css"])
    );
}

#[test]
fn test_empty_directories_are_recreated() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(src.path(), "index.php", "<?php");
    fs::create_dir_all(src.path().join("hackable/uploads")).unwrap();
    let dest = out.path().join("DVWA");

    normalize(src.path(), &dest).unwrap();

    assert!(dest.join("hackable/uploads").is_dir());
}

// =============================================================================
// Replacement semantics
// =============================================================================

#[test]
fn test_second_run_yields_same_tree() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(src.path(), "DVWA/a.txt", "a");
    write(src.path(), "DVWA/sub/b.txt", "b");
    let dest = out.path().join("DVWA");

    normalize(src.path(), &dest).unwrap();
    let first = files_under(&dest);
    write(&dest, "leftover.log", "from a previous lab session");

    normalize(src.path(), &dest).unwrap();

    assert_eq!(files_under(&dest), first);
    assert!(!dest.join("leftover.log").exists());
}

#[test]
fn test_prior_destination_contents_destroyed() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(src.path(), "index.php", "new");
    let dest = out.path().join("DVWA");
    write(&dest, "index.php", "old");
    write(&dest, "DVWA/hackable/uploads/shell.php", "old upload");

    normalize(src.path(), &dest).unwrap();

    assert_eq!(files_under(&dest), set(&["index.php"]));
    assert_eq!(fs::read_to_string(dest.join("index.php")).unwrap(), "new");
}

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn test_modification_time_preserved() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(src.path(), "index.php", "<?php");

    let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    File::options()
        .write(true)
        .open(src.path().join("index.php"))
        .unwrap()
        .set_times(FileTimes::new().set_modified(past).set_accessed(past))
        .unwrap();

    let dest = out.path().join("DVWA");
    normalize(src.path(), &dest).unwrap();

    let copied = fs::metadata(dest.join("index.php")).unwrap().modified().unwrap();
    assert_eq!(copied, past);
}

#[test]
fn test_permission_bits_preserved() {
    use std::os::unix::fs::PermissionsExt;

    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(src.path(), "setup.sh", "#!/bin/sh");
    fs::set_permissions(src.path().join("setup.sh"), fs::Permissions::from_mode(0o750)).unwrap();

    let dest = out.path().join("DVWA");
    normalize(src.path(), &dest).unwrap();

    let mode = fs::metadata(dest.join("setup.sh")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o750);
}

#[test]
fn test_directory_modes_preserved() {
    use std::os::unix::fs::PermissionsExt;

    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(src.path(), "config/config.inc.php", "<?php");
    write(src.path(), "dvwa/includes/dvwaPage.inc.php", "<?php");
    fs::set_permissions(src.path().join("config"), fs::Permissions::from_mode(0o750)).unwrap();
    // Read-only directory whose contents must still be copied
    fs::set_permissions(src.path().join("dvwa/includes"), fs::Permissions::from_mode(0o555)).unwrap();

    let dest = out.path().join("DVWA");
    normalize(src.path(), &dest).unwrap();

    let mode = |rel: &str| fs::metadata(dest.join(rel)).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode("config"), 0o750);
    assert_eq!(mode("dvwa/includes"), 0o555);
    assert!(dest.join("dvwa/includes/dvwaPage.inc.php").is_file());

    // Let the tempdirs clean up
    fs::set_permissions(dest.join("dvwa/includes"), fs::Permissions::from_mode(0o755)).unwrap();
    fs::set_permissions(src.path().join("dvwa/includes"), fs::Permissions::from_mode(0o755)).unwrap();
}

// =============================================================================
// Failure paths
// =============================================================================

#[test]
fn test_uncreatable_destination_fails() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(src.path(), "index.php", "<?php");

    // A regular file where a parent directory is needed
    let blocker = out.path().join("html");
    fs::write(&blocker, "not a directory").unwrap();
    let dest = blocker.join("DVWA");

    let err = normalize(src.path(), &dest).unwrap_err();

    assert!(matches!(err, DeployError::Normalize { .. }), "got {err:?}");
    assert!(!dest.exists());
}

#[test]
fn test_missing_source_fails_before_touching_destination() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("DVWA");
    write(&dest, "index.php", "existing deployment");

    let err = normalize(&src.path().join("never-cloned"), &dest).unwrap_err();

    assert!(matches!(err, DeployError::Normalize { .. }));
    assert_eq!(
        fs::read_to_string(dest.join("index.php")).unwrap(),
        "existing deployment"
    );
}

#[test]
fn test_relative_destination_inside_source_refused() {
    let src = tempfile::tempdir().unwrap();
    write(src.path(), "index.php", "<?php");

    // Only this test changes the working directory; the others use absolute paths
    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(src.path()).unwrap();
    let result = normalize(Path::new("."), Path::new("out"));
    std::env::set_current_dir(previous).unwrap();

    let err = result.unwrap_err();
    assert!(matches!(err, DeployError::Normalize { .. }), "got {err:?}");
    assert!(!src.path().join("out").exists());
    assert_eq!(files_under(src.path()), set(&["index.php"]));
}

#[test]
fn test_resolve_does_not_copy() {
    let src = tempfile::tempdir().unwrap();
    write(src.path(), "DVWA/index.php", "<?php");

    let root = resolve_source_root(src.path()).unwrap();

    assert_eq!(root, src.path().join("DVWA"));
    assert_eq!(files_under(src.path()), set(&["DVWA/index.php"]));
}
