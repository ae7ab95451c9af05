//! Type-safe identifiers for deployment steps and their outcomes
//!
//! Steps are enums rather than strings so `--skip` values and config entries
//! are validated at parse time.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// A single stage of the deployment run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DeployStep {
    /// Remove any prior deployment under the web root
    RemoveExisting,
    /// Clone the application repository (critical)
    Clone,
    /// Extract bundled archives found in the clone
    Extract,
    /// Flatten and copy the clone into the web root
    Deploy,
    StartDatabase,
    ProvisionDatabase,
    StartWeb,
    ConfigurePhp,
    RestartWeb,
    UploadsPermissions,
    /// Hand the whole web root to the web-server user
    Ownership,
    Browser,
}

impl DeployStep {
    /// Whether failure of this step aborts the run
    pub fn is_critical(self) -> bool {
        matches!(self, DeployStep::Clone | DeployStep::Deploy)
    }
}

/// Result of a single step as recorded in the run report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StepOutcome {
    #[strum(serialize = "ok")]
    Succeeded,
    #[strum(serialize = "failed")]
    Failed,
    #[strum(serialize = "timed out")]
    TimedOut,
    #[strum(serialize = "skipped")]
    Skipped,
    /// Nothing to act on (missing file or directory)
    #[strum(serialize = "not applicable")]
    NotApplicable,
}

impl StepOutcome {
    /// Merge outcomes of several commands belonging to one step.
    ///
    /// The worse outcome wins: TimedOut > Failed > Succeeded > NotApplicable > Skipped.
    pub fn combine(self, other: StepOutcome) -> StepOutcome {
        if self.severity() >= other.severity() {
            self
        } else {
            other
        }
    }

    fn severity(self) -> u8 {
        match self {
            StepOutcome::Skipped => 0,
            StepOutcome::NotApplicable => 1,
            StepOutcome::Succeeded => 2,
            StepOutcome::Failed => 3,
            StepOutcome::TimedOut => 4,
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, StepOutcome::Failed | StepOutcome::TimedOut)
    }
}
