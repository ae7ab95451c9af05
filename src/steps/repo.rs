//! Repository acquisition: clone and bundled-archive extraction.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::step_traits::StepCommand;

/// Name of the archive some upstream forks ship instead of a source tree.
pub const ARCHIVE_NAME: &str = "DVWA.zip";

// ============================================================================
// git clone
// ============================================================================

/// `git clone <url> <target>`
#[derive(Debug, Clone)]
pub struct GitCloneArgs {
    pub url: String,
    /// Existing (empty) directory or path to create
    pub target: PathBuf,
}

impl StepCommand for GitCloneArgs {
    fn program(&self) -> &str {
        "git"
    }

    fn args(&self) -> Vec<String> {
        vec![
            "clone".to_string(),
            // A URL starting with '-' must never be read as an option
            "--".to_string(),
            self.url.clone(),
            self.target.display().to_string(),
        ]
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        // Never block on a credential prompt; stdin is closed anyway
        vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())]
    }
}

// ============================================================================
// unzip
// ============================================================================

/// `unzip -o <archive> -d <dest_dir>`, overwriting without prompting
#[derive(Debug, Clone)]
pub struct UnzipArgs {
    pub archive: PathBuf,
    pub dest_dir: PathBuf,
}

impl UnzipArgs {
    /// Extract next to the archive itself
    pub fn in_place(archive: &Path) -> Self {
        let dest_dir = archive
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            archive: archive.to_path_buf(),
            dest_dir,
        }
    }
}

impl StepCommand for UnzipArgs {
    fn program(&self) -> &str {
        "unzip"
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-o".to_string(),
            self.archive.display().to_string(),
            "-d".to_string(),
            self.dest_dir.display().to_string(),
        ]
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }
}

/// Locate bundled archives in a fresh clone.
///
/// Looks at `clone_root` itself and each immediate child directory (sorted
/// by name); deeper levels are not searched.
pub fn find_archives(clone_root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut candidates = vec![clone_root.to_path_buf()];

    let mut children: Vec<PathBuf> = fs::read_dir(clone_root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    children.sort();
    candidates.extend(children);

    Ok(candidates
        .into_iter()
        .map(|dir| dir.join(ARCHIVE_NAME))
        .filter(|zip| zip.is_file())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_clone_args() {
        let args = GitCloneArgs {
            url: "https://github.com/Mokshithv/DVWA.git".to_string(),
            target: PathBuf::from("/tmp/dvwa_clone_x"),
        };
        assert_eq!(
            args.args(),
            vec![
                "clone",
                "--",
                "https://github.com/Mokshithv/DVWA.git",
                "/tmp/dvwa_clone_x"
            ]
        );
        assert!(args.env_vars().contains(&("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())));
    }

    #[test]
    fn test_unzip_in_place() {
        let args = UnzipArgs::in_place(Path::new("/tmp/clone/DVWA/DVWA.zip"));
        assert_eq!(args.dest_dir, PathBuf::from("/tmp/clone/DVWA"));
        assert_eq!(
            args.args(),
            vec!["-o", "/tmp/clone/DVWA/DVWA.zip", "-d", "/tmp/clone/DVWA"]
        );
    }

    #[test]
    fn test_find_archives_root_and_children_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join(ARCHIVE_NAME), b"zip").unwrap();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("b").join(ARCHIVE_NAME), b"zip").unwrap();
        fs::create_dir_all(root.join("a/deeper")).unwrap();
        fs::write(root.join("a/deeper").join(ARCHIVE_NAME), b"zip").unwrap();
        // A directory with the archive's name is not an archive
        fs::create_dir_all(root.join("c").join(ARCHIVE_NAME)).unwrap();

        let found = find_archives(root).unwrap();
        assert_eq!(
            found,
            vec![root.join(ARCHIVE_NAME), root.join("b").join(ARCHIVE_NAME)]
        );
    }

    #[test]
    fn test_find_archives_none() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.php"), b"<?php").unwrap();
        assert!(find_archives(dir.path()).unwrap().is_empty());
    }
}
