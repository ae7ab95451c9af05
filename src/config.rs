//! Deployment configuration.
//!
//! Every field has a default matching the stock lab layout (Debian/Kali with
//! Apache, PHP 8.4 and MySQL/MariaDB), so an empty `{}` file is a valid
//! config. Values can be overridden from a JSON file and then from CLI flags.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DeployError, Result};
use crate::steps::database::{is_safe_identifier, is_safe_password};
use crate::steps::permissions::is_valid_mode;
use crate::steps::php::DEFAULT_PHP_INI;
use crate::types::DeployStep;

pub const DEFAULT_REPO_URL: &str = "https://github.com/Mokshithv/DVWA.git";
pub const DEFAULT_DEST_DIR: &str = "/var/www/html/DVWA";

/// Lab database account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub name: String,
    pub user: String,
    pub host: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "dvwa".to_string(),
            user: "admin".to_string(),
            host: "127.0.0.1".to_string(),
            password: "password".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("database.name", &self.name),
            ("database.user", &self.user),
            ("database.host", &self.host),
        ] {
            if !is_safe_identifier(value) {
                return Err(DeployError::validation(format!(
                    "{} must be non-empty and contain only letters, digits, '_', '.', '-' (got {:?})",
                    field, value
                )));
            }
        }
        if !is_safe_password(&self.password) {
            return Err(DeployError::validation(
                "database.password cannot contain a single quote or backslash",
            ));
        }
        Ok(())
    }
}

/// Deployment configuration that can be saved/loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    // Source
    pub repo_url: String,

    // Web root
    pub dest_dir: PathBuf,
    pub web_user: String,
    pub web_group: String,
    pub uploads_mode: String,

    // Services
    pub database_service: String,
    pub web_service: String,
    pub php_ini: PathBuf,
    pub database: DatabaseConfig,

    // Post-install
    pub open_browser: bool,
    pub browser: String,
    pub setup_url: String,

    // Run control
    pub command_timeout_secs: u64,
    pub skip_steps: Vec<DeployStep>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            repo_url: DEFAULT_REPO_URL.to_string(),
            dest_dir: PathBuf::from(DEFAULT_DEST_DIR),
            web_user: "www-data".to_string(),
            web_group: "www-data".to_string(),
            uploads_mode: "0777".to_string(),
            database_service: "mysql".to_string(),
            web_service: "apache2".to_string(),
            php_ini: PathBuf::from(DEFAULT_PHP_INI),
            database: DatabaseConfig::default(),
            open_browser: true,
            browser: "firefox".to_string(),
            setup_url: "http://127.0.0.1/DVWA/setup.php".to_string(),
            command_timeout_secs: 300,
            skip_steps: Vec::new(),
        }
    }
}

impl DeployConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|e| {
            DeployError::config(format!(
                "Failed to write configuration to {:?}: {}",
                path.as_ref(),
                e
            ))
        })
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            DeployError::config(format!("Failed to read configuration from {:?}: {}", path, e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            DeployError::config(format!("Failed to parse configuration {:?}: {}", path, e))
        })
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn is_skipped(&self, step: DeployStep) -> bool {
        self.skip_steps.contains(&step)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.repo_url.trim().is_empty() {
            return Err(DeployError::validation("repo_url must be specified"));
        }
        if self.repo_url.starts_with('-') {
            return Err(DeployError::validation("repo_url cannot start with '-'"));
        }

        // dest_dir is deleted recursively on every run
        if !self.dest_dir.is_absolute() {
            return Err(DeployError::validation(format!(
                "dest_dir must be an absolute path (got {:?})",
                self.dest_dir
            )));
        }
        if self.dest_dir.parent().is_none() {
            return Err(DeployError::validation("dest_dir cannot be the filesystem root"));
        }

        for (field, value) in [
            ("web_user", &self.web_user),
            ("web_group", &self.web_group),
            ("database_service", &self.database_service),
            ("web_service", &self.web_service),
        ] {
            if !is_safe_identifier(value) {
                return Err(DeployError::validation(format!(
                    "{} is not a valid name (got {:?})",
                    field, value
                )));
            }
        }

        if !is_valid_mode(&self.uploads_mode) {
            return Err(DeployError::validation(format!(
                "uploads_mode must be 3-4 octal digits (got {:?})",
                self.uploads_mode
            )));
        }

        self.database.validate()?;

        if self.open_browser && self.browser.trim().is_empty() {
            return Err(DeployError::validation(
                "browser must be specified when open_browser is enabled",
            ));
        }

        if self.command_timeout_secs == 0 {
            return Err(DeployError::validation(
                "command_timeout_secs must be greater than zero",
            ));
        }

        if self.skip_steps.contains(&DeployStep::Clone) {
            return Err(DeployError::validation("the clone step cannot be skipped"));
        }

        Ok(())
    }
}
