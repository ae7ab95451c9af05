//! dvwa-deploy library
//!
//! Core functionality for provisioning a DVWA lab: the layout normalizer,
//! typed external commands, and the deployment sequence that drives them.

pub mod cli;
pub mod command_runner;
pub mod config;
pub mod deployer;
pub mod error;
pub mod normalizer;
pub mod process_guard;
pub mod sanity;
pub mod step_traits;
pub mod steps;
pub mod types;
pub mod uploads;

// Re-export main types for convenience
pub use command_runner::{CommandOutput, RunOptions, run_step};
pub use config::{DatabaseConfig, DeployConfig};
pub use deployer::{DeployReport, Deployer};
pub use error::DeployError;
pub use normalizer::{NormalizeSummary, normalize, resolve_source_root};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use step_traits::StepCommand;
pub use types::{DeployStep, StepOutcome};
