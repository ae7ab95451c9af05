//! Layout normalizer
//!
//! Upstream DVWA archives and forks do not agree on layout: some put the
//! application at the repository root, some nest it one level down in a
//! `DVWA/` directory, and some unzip into a single wrapper directory. The
//! normalizer picks the real application root and copies its contents
//! directly into the web root, so the result never has a duplicate
//! `DVWA/DVWA/` level.
//!
//! The destination is destroyed and recreated on every call. Any filesystem
//! error is returned to the caller; nothing is repaired.

use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{DeployError, Result};

/// Directory name some archives nest the application under.
pub const NESTED_ROOT_NAME: &str = "DVWA";

/// Entries whose presence marks a directory as the application root.
pub const ROOT_MARKERS: [&str; 3] = ["index.php", "config", "DVWA"];

/// What a `normalize` call copied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeSummary {
    /// Directory whose contents were copied
    pub effective_root: PathBuf,
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
}

/// Choose the directory whose contents belong in the web root.
///
/// 1. `source_root/DVWA` if it is a directory.
/// 2. The only non-hidden entry of `source_root`, if it is a directory that
///    contains one of [`ROOT_MARKERS`].
/// 3. `source_root` itself.
pub fn resolve_source_root(source_root: &Path) -> Result<PathBuf> {
    let nested = source_root.join(NESTED_ROOT_NAME);
    if nested.is_dir() {
        return Ok(nested);
    }

    let visible: Vec<PathBuf> = fs::read_dir(source_root)
        .map_err(|e| DeployError::normalize(source_root, e))?
        .map(|entry| entry.map_err(|e| DeployError::normalize(source_root, e)))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .collect();

    if let [only] = visible.as_slice() {
        if only.is_dir() && has_root_marker(only) {
            return Ok(only.clone());
        }
    }

    Ok(source_root.to_path_buf())
}

fn has_root_marker(dir: &Path) -> bool {
    ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists())
}

/// Replace `dest_root` with a flattened copy of `source_root`.
///
/// `source_root` must be an existing directory. `dest_root` may or may not
/// exist; if it does, it is deleted first.
pub fn normalize(source_root: &Path, dest_root: &Path) -> Result<NormalizeSummary> {
    println!(
        "\nPreparing to deploy from {} -> {}",
        source_root.display(),
        dest_root.display()
    );

    if !source_root.is_dir() {
        return Err(DeployError::normalize(
            source_root,
            io::Error::new(io::ErrorKind::NotFound, "source root is not a directory"),
        ));
    }
    reject_overlap(source_root, dest_root)?;

    if fs::symlink_metadata(dest_root).is_ok() {
        println!("Removing existing {}", dest_root.display());
        remove_existing(dest_root)?;
    }

    fs::create_dir_all(dest_root).map_err(|e| DeployError::normalize(dest_root, e))?;

    let effective_root = resolve_source_root(source_root)?;
    println!("Using source root: {}", effective_root.display());
    info!(
        source = %source_root.display(),
        effective = %effective_root.display(),
        dest = %dest_root.display(),
        "normalizing layout"
    );

    let summary = copy_tree(&effective_root, dest_root)?;

    println!("Deployment complete: files are under {}", dest_root.display());
    info!(
        files = summary.files,
        directories = summary.directories,
        symlinks = summary.symlinks,
        "layout normalized"
    );

    Ok(summary)
}

fn remove_existing(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path).map_err(|e| DeployError::normalize(path, e))?;
    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| DeployError::normalize(path, e))
}

/// Refuse layouts where deleting or filling the destination would eat the source.
fn reject_overlap(source_root: &Path, dest_root: &Path) -> Result<()> {
    let source = fs::canonicalize(source_root).map_err(|e| DeployError::normalize(source_root, e))?;
    // Relative destinations resolve against the working directory
    let dest_abs = std::path::absolute(dest_root).map_err(|e| DeployError::normalize(dest_root, e))?;
    let dest = match fs::canonicalize(&dest_abs) {
        Ok(dest) => dest,
        // Not created yet: compare through its parent
        Err(_) => match (dest_abs.parent(), dest_abs.file_name()) {
            (Some(parent), Some(name)) => fs::canonicalize(parent)
                .map(|parent| parent.join(name))
                .unwrap_or_else(|_| dest_abs.clone()),
            _ => dest_abs.clone(),
        },
    };

    if source.starts_with(&dest) || dest.starts_with(&source) {
        return Err(DeployError::normalize(
            dest_root,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "destination overlaps source tree {}",
                    source_root.display()
                ),
            ),
        ));
    }
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<NormalizeSummary> {
    let mut summary = NormalizeSummary {
        effective_root: from.to_path_buf(),
        files: 0,
        directories: 0,
        symlinks: 0,
    };

    // Applied once the walk is done, so a read-only source directory
    // does not block copying its own children
    let mut dir_modes: Vec<(PathBuf, fs::Permissions)> = Vec::new();

    let walker = WalkDir::new(from)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1);

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            DeployError::normalize(path, io::Error::from(e))
        })?;

        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| DeployError::normalize(entry.path(), io::Error::other(e)))?;
        let target = to.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| DeployError::normalize(&target, e))?;
            let meta = entry
                .metadata()
                .map_err(|e| DeployError::normalize(entry.path(), io::Error::from(e)))?;
            dir_modes.push((target, meta.permissions()));
            summary.directories += 1;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())
                .map_err(|e| DeployError::normalize(entry.path(), e))?;
            std::os::unix::fs::symlink(&link, &target)
                .map_err(|e| DeployError::normalize(&target, e))?;
            summary.symlinks += 1;
        } else {
            copy_file_preserving(entry.path(), &target)?;
            summary.files += 1;
        }
        debug!("copied {}", rel.display());
    }

    // Deepest first
    for (dir, perms) in dir_modes.into_iter().rev() {
        fs::set_permissions(&dir, perms).map_err(|e| DeployError::normalize(&dir, e))?;
    }

    Ok(summary)
}

/// Copy contents and permission bits, then carry over access/modify times.
fn copy_file_preserving(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).map_err(|e| DeployError::normalize(dst, e))?;

    let meta = fs::metadata(src).map_err(|e| DeployError::normalize(src, e))?;
    let mut times = FileTimes::new();
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }

    // futimens only needs ownership, so a read-only handle works even when
    // the copied mode bits forbid writing
    let file = File::open(dst).map_err(|e| DeployError::normalize(dst, e))?;
    file.set_times(times)
        .map_err(|e| DeployError::normalize(dst, e))
}
