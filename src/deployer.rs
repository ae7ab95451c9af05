//! Deployment orchestration
//!
//! Runs the provisioning steps in order against a scratch clone directory.
//! Only the clone and the layout normalizer can abort a run; every other
//! step records its outcome and the run continues.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::command_runner::{RunOptions, outcome_of, run_step, spawn_detached};
use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::normalizer;
use crate::process_guard::{ChildRegistry, ProcessGuard};
use crate::step_traits::StepCommand;
use crate::steps::browser::{BrowserArgs, has_display};
use crate::steps::database::{MysqlExecArgs, bootstrap_statements};
use crate::steps::permissions::ChownArgs;
use crate::steps::php::AllowUrlIncludeArgs;
use crate::steps::repo::{GitCloneArgs, UnzipArgs, find_archives};
use crate::steps::service::{ServiceAction, SystemctlArgs};
use crate::types::{DeployStep, StepOutcome};
use crate::uploads;

/// Prefix of the scratch directory the repository is cloned into
pub const CLONE_DIR_PREFIX: &str = "dvwa_clone_";

/// Per-step outcomes of a run, in execution order
#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    entries: Vec<(DeployStep, StepOutcome)>,
}

impl DeployReport {
    pub fn record(&mut self, step: DeployStep, outcome: StepOutcome) {
        self.entries.push((step, outcome));
    }

    pub fn entries(&self) -> &[(DeployStep, StepOutcome)] {
        &self.entries
    }

    pub fn outcome(&self, step: DeployStep) -> Option<StepOutcome> {
        self.entries
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, outcome)| *outcome)
    }

    /// Steps that failed or timed out
    pub fn failures(&self) -> Vec<DeployStep> {
        self.entries
            .iter()
            .filter(|(_, outcome)| outcome.is_failure())
            .map(|(step, _)| *step)
            .collect()
    }

    pub fn print_summary(&self) {
        println!("\nSummary:");
        for (step, outcome) in &self.entries {
            println!("  {:<22} {}", step.to_string(), outcome);
        }
    }
}

/// Deployer instance
pub struct Deployer {
    config: DeployConfig,
    dry_run: bool,
    /// Terminates any still-registered children when the deployer goes away
    _guard: ProcessGuard,
}

impl Deployer {
    pub fn new(config: DeployConfig, dry_run: bool) -> Self {
        Self {
            config,
            dry_run,
            _guard: ProcessGuard::new(),
        }
    }

    /// Run every step against a fresh scratch clone directory.
    ///
    /// The scratch directory is removed whether or not the steps succeed;
    /// failure to remove it is only logged.
    pub fn run(&self) -> Result<DeployReport> {
        let scratch = tempfile::Builder::new()
            .prefix(CLONE_DIR_PREFIX)
            .tempdir()?;
        println!("Using temporary directory: {}", scratch.path().display());

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register_scratch_dir(scratch.path());
        }

        let mut report = DeployReport::default();
        let result = self.run_in(scratch.path(), &mut report);

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister_scratch_dir(scratch.path());
        }
        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!("Failed to remove {}: {}", scratch_path.display(), e);
            println!("Failed to remove tempdir: {}", e);
        }

        result?;
        println!("\nDone.");
        report.print_summary();
        Ok(report)
    }

    /// Run the step sequence with `clone_root` as the clone target.
    pub fn run_in(&self, clone_root: &Path, report: &mut DeployReport) -> Result<()> {
        let dest = self.config.dest_dir.as_path();

        self.step(report, DeployStep::RemoveExisting, || self.remove_existing(dest))?;
        self.step(report, DeployStep::Clone, || self.clone_repo(clone_root))?;
        self.step(report, DeployStep::Extract, || self.extract_archives(clone_root))?;
        self.step(report, DeployStep::Deploy, || self.deploy(clone_root, dest))?;

        self.step(report, DeployStep::StartDatabase, || {
            self.run_best_effort(&SystemctlArgs::new(
                ServiceAction::Start,
                &self.config.database_service,
            ))
        })?;
        self.step(report, DeployStep::ProvisionDatabase, || {
            let statements = bootstrap_statements(&self.config.database);
            self.run_best_effort(&MysqlExecArgs::from_statements(&statements))
        })?;
        self.step(report, DeployStep::StartWeb, || {
            self.run_best_effort(&SystemctlArgs::new(
                ServiceAction::Start,
                &self.config.web_service,
            ))
        })?;
        self.step(report, DeployStep::ConfigurePhp, || self.configure_php())?;
        self.step(report, DeployStep::RestartWeb, || {
            let stop = self.run_best_effort(&SystemctlArgs::new(
                ServiceAction::Stop,
                &self.config.web_service,
            ))?;
            let start = self.run_best_effort(&SystemctlArgs::new(
                ServiceAction::Start,
                &self.config.web_service,
            ))?;
            Ok(stop.combine(start))
        })?;
        self.step(report, DeployStep::UploadsPermissions, || {
            uploads::ensure_uploads_permissions(&self.config, &self.best_effort())
        })?;
        self.step(report, DeployStep::Ownership, || {
            if !dest.is_dir() && !self.dry_run {
                return Ok(StepOutcome::NotApplicable);
            }
            self.run_best_effort(&ChownArgs {
                user: self.config.web_user.clone(),
                group: self.config.web_group.clone(),
                path: dest.to_path_buf(),
            })
        })?;
        self.step(report, DeployStep::Browser, || self.open_browser())?;

        Ok(())
    }

    fn step<F>(&self, report: &mut DeployReport, step: DeployStep, action: F) -> Result<()>
    where
        F: FnOnce() -> Result<StepOutcome>,
    {
        if self.config.is_skipped(step) {
            println!("\n=== Skipping {} ===", step);
            info!(%step, "step skipped by configuration");
            report.record(step, StepOutcome::Skipped);
            return Ok(());
        }

        info!(%step, "starting step");
        match action() {
            Ok(outcome) => {
                info!(%step, %outcome, "step finished");
                report.record(step, outcome);
                Ok(())
            }
            // Only critical steps may abort the run
            Err(e) if !step.is_critical() => {
                warn!(%step, error = %e, "best-effort step failed");
                println!("Step {} failed: {}", step, e);
                report.record(step, StepOutcome::Failed);
                Ok(())
            }
            Err(e) => {
                report.record(step, StepOutcome::Failed);
                Err(e)
            }
        }
    }

    fn options(&self, step: DeployStep) -> RunOptions {
        let timeout = self.config.command_timeout();
        let opts = if step.is_critical() {
            RunOptions::critical(timeout)
        } else {
            RunOptions::best_effort(timeout)
        };
        opts.with_dry_run(self.dry_run)
    }

    fn best_effort(&self) -> RunOptions {
        RunOptions::best_effort(self.config.command_timeout()).with_dry_run(self.dry_run)
    }

    fn run_best_effort<T: StepCommand>(&self, cmd: &T) -> Result<StepOutcome> {
        Ok(outcome_of(run_step(cmd, &self.best_effort())?))
    }

    fn remove_existing(&self, dest: &Path) -> Result<StepOutcome> {
        let Ok(meta) = fs::symlink_metadata(dest) else {
            return Ok(StepOutcome::NotApplicable);
        };
        println!("\nRemoving existing deployment at {}", dest.display());
        if self.dry_run {
            info!("[dry-run] would remove {}", dest.display());
            return Ok(StepOutcome::Skipped);
        }

        let removed = if meta.is_dir() {
            fs::remove_dir_all(dest)
        } else {
            fs::remove_file(dest)
        };
        match removed {
            Ok(()) => Ok(StepOutcome::Succeeded),
            Err(e) => {
                // The normalizer retries the removal and fails hard if it persists
                warn!("Failed to remove {}: {}", dest.display(), e);
                println!("Failed to remove {}: {}", dest.display(), e);
                Ok(StepOutcome::Failed)
            }
        }
    }

    fn clone_repo(&self, clone_root: &Path) -> Result<StepOutcome> {
        let cmd = GitCloneArgs {
            url: self.config.repo_url.clone(),
            target: clone_root.to_path_buf(),
        };
        match run_step(&cmd, &self.options(DeployStep::Clone))? {
            Some(_) => Ok(StepOutcome::Succeeded),
            None => Err(DeployError::critical_step(cmd.command_line(), None)),
        }
    }

    fn extract_archives(&self, clone_root: &Path) -> Result<StepOutcome> {
        let archives = match find_archives(clone_root) {
            Ok(archives) => archives,
            Err(e) => {
                warn!(path = %clone_root.display(), "archive scan failed: {}", e);
                println!("Failed to scan {} for archives: {}", clone_root.display(), e);
                return Ok(StepOutcome::Failed);
            }
        };
        if archives.is_empty() {
            return Ok(StepOutcome::NotApplicable);
        }

        let mut outcome = StepOutcome::NotApplicable;
        for archive in archives {
            println!("Found {} -> attempting to unzip", archive.display());
            outcome = outcome.combine(self.run_best_effort(&UnzipArgs::in_place(&archive))?);
        }
        Ok(outcome)
    }

    fn deploy(&self, clone_root: &Path, dest: &Path) -> Result<StepOutcome> {
        if self.dry_run {
            println!(
                "\n[dry-run] would replace {} with the normalized contents of the clone",
                dest.display()
            );
            return Ok(StepOutcome::Skipped);
        }
        normalizer::normalize(clone_root, dest)?;
        Ok(StepOutcome::Succeeded)
    }

    fn configure_php(&self) -> Result<StepOutcome> {
        let php_ini = &self.config.php_ini;
        if !php_ini.exists() {
            println!(
                "Warning: {} not found. Update the path if your PHP version differs.",
                php_ini.display()
            );
            warn!(path = %php_ini.display(), "php.ini not found");
            return Ok(StepOutcome::NotApplicable);
        }
        self.run_best_effort(&AllowUrlIncludeArgs {
            php_ini: php_ini.clone(),
        })
    }

    fn open_browser(&self) -> Result<StepOutcome> {
        if !self.config.open_browser {
            return Ok(StepOutcome::Skipped);
        }
        if !self.dry_run && !has_display() {
            println!(
                "\nNo graphical session detected; open {} manually.",
                self.config.setup_url
            );
            return Ok(StepOutcome::NotApplicable);
        }

        let cmd = BrowserArgs {
            program: self.config.browser.clone(),
            url: self.config.setup_url.clone(),
        };
        if spawn_detached(&cmd, self.dry_run)? {
            Ok(StepOutcome::Succeeded)
        } else {
            Ok(StepOutcome::Failed)
        }
    }
}
