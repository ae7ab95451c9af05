use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DeployConfig;
use crate::types::DeployStep;

/// dvwa-deploy - Provision a DVWA security lab
#[derive(Parser, Debug)]
#[command(name = "dvwa-deploy")]
#[command(about = "Clone, flatten and deploy DVWA, then configure MySQL, Apache and PHP")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Dry-run mode: show what would be executed without making changes.
    ///
    /// External commands are echoed but not run, and the web root is left
    /// untouched. Implies skipping the root check.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Options for the default deploy run
    #[command(flatten)]
    pub deploy: DeployArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full deployment (the default when no subcommand is given)
    Deploy(DeployArgs),
    /// Flatten a source tree into a destination, replacing it
    Normalize {
        /// Extracted source tree (e.g. a fresh clone)
        source: PathBuf,
        /// Destination directory; deleted and recreated
        dest: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
    /// Write the default configuration as JSON
    InitConfig {
        /// Where to write the configuration
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct DeployArgs {
    /// JSON configuration file (defaults apply to anything it omits)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Repository to clone
    #[arg(long)]
    pub repo_url: Option<String>,

    /// Web root destination (deleted and recreated)
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// PHP ini file to enable allow_url_include in
    #[arg(long)]
    pub php_ini: Option<PathBuf>,

    /// Per-command timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Skip a step (repeatable), e.g. --skip browser --skip configure-php
    #[arg(long = "skip", value_name = "STEP")]
    pub skip: Vec<DeployStep>,

    /// Do not launch a browser at the end
    #[arg(long)]
    pub no_browser: bool,

    /// Do not require root (development only)
    #[arg(long)]
    pub skip_root_check: bool,
}

impl DeployArgs {
    /// Load the config file (if any) and apply CLI overrides on top.
    pub fn resolve_config(&self) -> Result<DeployConfig> {
        let mut config = match &self.config {
            Some(path) => DeployConfig::load_from_file(path)?,
            None => DeployConfig::default(),
        };

        if let Some(url) = &self.repo_url {
            config.repo_url = url.clone();
        }
        if let Some(dest) = &self.dest {
            config.dest_dir = dest.clone();
        }
        if let Some(php_ini) = &self.php_ini {
            config.php_ini = php_ini.clone();
        }
        if let Some(timeout) = self.timeout {
            config.command_timeout_secs = timeout;
        }
        for step in &self.skip {
            if !config.skip_steps.contains(step) {
                config.skip_steps.push(*step);
            }
        }
        if self.no_browser {
            config.open_browser = false;
        }

        Ok(config)
    }
}
