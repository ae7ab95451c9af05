//! Service manager commands (`systemctl`).

use strum::{Display, EnumString};

use crate::step_traits::StepCommand;

/// Action passed to `systemctl`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
}

/// `systemctl <action> <unit>`
#[derive(Debug, Clone)]
pub struct SystemctlArgs {
    pub action: ServiceAction,
    pub unit: String,
}

impl SystemctlArgs {
    pub fn new(action: ServiceAction, unit: impl Into<String>) -> Self {
        Self {
            action,
            unit: unit.into(),
        }
    }
}

impl StepCommand for SystemctlArgs {
    fn program(&self) -> &str {
        "systemctl"
    }

    fn args(&self) -> Vec<String> {
        vec![self.action.to_string(), self.unit.clone()]
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_systemctl_args() {
        let cmd = SystemctlArgs::new(ServiceAction::Start, "mysql");
        assert_eq!(cmd.args(), vec!["start", "mysql"]);
        assert_eq!(cmd.command_line(), "systemctl start mysql");

        let cmd = SystemctlArgs::new(ServiceAction::Stop, "apache2");
        assert_eq!(cmd.args(), vec!["stop", "apache2"]);
    }

    #[test]
    fn test_service_action_parse() {
        assert_eq!("stop".parse::<ServiceAction>().ok(), Some(ServiceAction::Stop));
        assert!("reload".parse::<ServiceAction>().is_err());
    }
}
