//! Pre-flight sanity checks for the runtime environment
//!
//! Verified before anything is touched:
//! - Running with root privileges (EUID 0)
//! - `git` is present (the clone step cannot be skipped)
//!
//! Binaries for best-effort steps are only reported, since those steps are
//! allowed to fail.

use crate::error::{DeployError, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub missing_optional: Vec<String>,
    pub is_root: bool,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.is_root
    }
}

/// Binaries without which the run cannot produce a deployment
const REQUIRED_BINARIES: &[&str] = &["git"];

/// Binaries used by best-effort steps (warn if missing)
const OPTIONAL_BINARIES: &[&str] = &["unzip", "mysql", "systemctl", "sed", "chown", "chmod"];

/// Check if an executable with this name is reachable through PATH
pub fn binary_exists(name: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| is_executable(&dir.join(name)))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Check if running as root (EUID 0)
fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Perform all sanity checks and return the result
pub fn verify_environment() -> SanityCheckResult {
    let missing_binaries = REQUIRED_BINARIES
        .iter()
        .filter(|b| !binary_exists(b))
        .map(|b| (*b).to_string())
        .collect();

    let missing_optional = OPTIONAL_BINARIES
        .iter()
        .filter(|b| !binary_exists(b))
        .map(|b| (*b).to_string())
        .collect();

    SanityCheckResult {
        missing_binaries,
        missing_optional,
        is_root: is_running_as_root(),
    }
}

/// Print a readable pre-flight report to stderr
pub fn print_report(result: &SanityCheckResult) {
    eprintln!();
    eprintln!("dvwa-deploy: pre-flight check failed");
    eprintln!();

    if !result.is_root {
        eprintln!("ERROR: This tool must be run as root.");
        eprintln!("   It removes and recreates the web root, manages services and");
        eprintln!("   changes file ownership.");
        eprintln!();
        eprintln!("   Solution: sudo dvwa-deploy");
        eprintln!();
    }

    if !result.missing_binaries.is_empty() {
        eprintln!("ERROR: Missing required binaries");
        for binary in &result.missing_binaries {
            eprintln!("   - {} (install: apt install {})", binary, package_for_binary(binary));
        }
        eprintln!();
    }
}

/// Map binary names to their Debian package names
fn package_for_binary(binary: &str) -> &'static str {
    match binary {
        "git" => "git",
        "unzip" => "unzip",
        "mysql" => "default-mysql-client",
        "systemctl" => "systemd",
        "sed" => "sed",
        "chown" | "chmod" => "coreutils",
        _ => "unknown",
    }
}

/// Skip root check (for development/testing)
/// Set DVWA_DEPLOY_SKIP_ROOT_CHECK=1 to skip
pub fn should_skip_root_check() -> bool {
    std::env::var("DVWA_DEPLOY_SKIP_ROOT_CHECK")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

/// Run pre-flight checks with optional root check skip
pub fn run_preflight_checks(skip_root: bool) -> Result<()> {
    tracing::debug!("Running pre-flight sanity checks (skip_root={})...", skip_root);

    let mut result = verify_environment();

    if skip_root || should_skip_root_check() {
        tracing::warn!("Root check skipped (DVWA_DEPLOY_SKIP_ROOT_CHECK=1)");
        result.is_root = true;
    }

    for binary in &result.missing_optional {
        tracing::warn!(
            "Optional binary not found: {} (install: apt install {}); dependent steps will fail",
            binary,
            package_for_binary(binary)
        );
    }

    if !result.is_ok() {
        print_report(&result);
        let mut reasons = Vec::new();
        if !result.is_root {
            reasons.push("not running as root".to_string());
        }
        if !result.missing_binaries.is_empty() {
            reasons.push(format!("missing {}", result.missing_binaries.join(", ")));
        }
        return Err(DeployError::preflight(reasons.join("; ")));
    }

    tracing::info!("Pre-flight checks passed");
    Ok(())
}
