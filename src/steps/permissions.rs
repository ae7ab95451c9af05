//! Ownership and permission commands (`chown -R`, `chmod -R`).

use std::path::PathBuf;

use crate::step_traits::StepCommand;

/// `chown -R <user>:<group> <path>`
#[derive(Debug, Clone)]
pub struct ChownArgs {
    pub user: String,
    pub group: String,
    pub path: PathBuf,
}

impl StepCommand for ChownArgs {
    fn program(&self) -> &str {
        "chown"
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-R".to_string(),
            format!("{}:{}", self.user, self.group),
            "--".to_string(),
            self.path.display().to_string(),
        ]
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }
}

/// `chmod -R <mode> <path>`
#[derive(Debug, Clone)]
pub struct ChmodArgs {
    /// Octal mode string, e.g. `0777`
    pub mode: String,
    pub path: PathBuf,
}

impl StepCommand for ChmodArgs {
    fn program(&self) -> &str {
        "chmod"
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-R".to_string(),
            self.mode.clone(),
            "--".to_string(),
            self.path.display().to_string(),
        ]
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }
}

/// Accept 3 or 4 octal digits (`777`, `0777`, `2775`)
pub fn is_valid_mode(mode: &str) -> bool {
    (3..=4).contains(&mode.len()) && mode.chars().all(|c| ('0'..='7').contains(&c))
}
