//! Type-safe external command contracts.
//!
//! Every external program the deployment invokes is described by a struct
//! implementing `StepCommand`. The struct produces a program name and an
//! argument vector that is handed to `std::process::Command` as-is, so no
//! value ever passes through a shell and quoting cannot be broken by paths
//! or passwords.
//!
//! # Contract
//!
//! - `program()`: binary name resolved through `PATH` (e.g. `git`).
//! - `args()`: arguments exactly as the program expects them.
//! - `env_vars()`: extra environment for the child (usually none).
//!
//! # Example
//!
//! ```ignore
//! use dvwa_deploy::steps::service::{ServiceAction, SystemctlArgs};
//! use dvwa_deploy::step_traits::StepCommand;
//!
//! let cmd = SystemctlArgs::new(ServiceAction::Start, "apache2");
//! assert_eq!(cmd.program(), "systemctl");
//! assert_eq!(cmd.args(), vec!["start", "apache2"]);
//! ```
pub trait StepCommand {
    /// Program to execute.
    fn program(&self) -> &str;

    /// Convert struct fields to the argument vector.
    fn args(&self) -> Vec<String>;

    /// Environment variables the child requires.
    fn env_vars(&self) -> Vec<(String, String)>;

    /// Human-readable command line for console echo and logs.
    ///
    /// Arguments containing whitespace or quotes are single-quoted for
    /// display only; nothing is ever re-parsed from this string.
    fn command_line(&self) -> String {
        let mut line = self.program().to_string();
        for arg in self.args() {
            line.push(' ');
            line.push_str(&display_arg(&arg));
        }
        line
    }
}

fn display_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    if arg
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\' | '$' | '`' | ';' | '&' | '|'))
    {
        format!("'{}'", arg.replace('\'', r"'\''"))
    } else {
        arg.to_string()
    }
}
