//! Uploads directory permissions.
//!
//! DVWA's file-upload lab writes into `hackable/uploads`, so the web server
//! must own it and be able to write to it. Both the flattened layout and the
//! nested `DVWA/` layout are checked, since an unrecognized archive shape can
//! still leave the nesting in place.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::command_runner::{RunOptions, outcome_of, run_step};
use crate::config::DeployConfig;
use crate::error::Result;
use crate::steps::permissions::{ChmodArgs, ChownArgs};
use crate::types::StepOutcome;

/// Directories below this depth are not printed in the diagnostic listing.
const LISTING_MAX_DEPTH: usize = 4;

/// Candidate uploads directories, nested layout first.
pub fn uploads_candidates(dest_root: &Path) -> [PathBuf; 2] {
    [
        dest_root.join("DVWA").join("hackable").join("uploads"),
        dest_root.join("hackable").join("uploads"),
    ]
}

/// Hand every existing uploads directory to the web server.
///
/// For each candidate that exists, the parent (`hackable/`) is chowned to
/// the web-server account and the uploads directory itself gets
/// `uploads_mode`. When no candidate exists a listing of the deployed tree is
/// printed instead and the step is `NotApplicable`.
pub fn ensure_uploads_permissions(
    config: &DeployConfig,
    opts: &RunOptions,
) -> Result<StepOutcome> {
    let mut outcome: Option<StepOutcome> = None;

    for uploads in uploads_candidates(&config.dest_dir) {
        if !uploads.is_dir() {
            continue;
        }
        println!("Setting ownership and permissions on: {}", uploads.display());

        let owner_root = uploads.parent().unwrap_or(&uploads).to_path_buf();
        let chown = ChownArgs {
            user: config.web_user.clone(),
            group: config.web_group.clone(),
            path: owner_root,
        };
        let chmod = ChmodArgs {
            mode: config.uploads_mode.clone(),
            path: uploads.clone(),
        };

        for result in [run_step(&chown, opts)?, run_step(&chmod, opts)?] {
            let step = outcome_of(result);
            outcome = Some(outcome.map_or(step, |o| o.combine(step)));
        }
    }

    if let Some(outcome) = outcome {
        return Ok(outcome);
    }

    warn!(dest = %config.dest_dir.display(), "uploads directory not found");
    println!(
        "Warning: uploads directory not found in expected locations. Listing deployed tree for debugging:"
    );
    for line in tree_listing(&config.dest_dir) {
        println!("{}", line);
    }
    Ok(StepOutcome::NotApplicable)
}

/// Indented directory-only listing of `root`, two spaces per level.
///
/// Directories are visited in name order. The walk stops entirely once a
/// directory deeper than the listing limit has been printed.
pub fn tree_listing(root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir());

    for entry in walker {
        let depth = entry.depth();
        let name = entry.file_name().to_string_lossy();
        lines.push(format!("{}{}/", "  ".repeat(depth), name));
        if depth > LISTING_MAX_DEPTH {
            break;
        }
    }
    lines
}
