//! Browser launch for the post-install setup page.

use crate::step_traits::StepCommand;

/// `<browser> <url>`, launched detached
#[derive(Debug, Clone)]
pub struct BrowserArgs {
    pub program: String,
    pub url: String,
}

impl StepCommand for BrowserArgs {
    fn program(&self) -> &str {
        &self.program
    }

    fn args(&self) -> Vec<String> {
        vec![self.url.clone()]
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }
}

/// A graphical session is needed for the browser to show anything.
pub fn has_display() -> bool {
    ["DISPLAY", "WAYLAND_DISPLAY"]
        .iter()
        .any(|var| std::env::var_os(var).is_some_and(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_args() {
        let cmd = BrowserArgs {
            program: "firefox".to_string(),
            url: "http://127.0.0.1/DVWA/setup.php".to_string(),
        };
        assert_eq!(cmd.command_line(), "firefox http://127.0.0.1/DVWA/setup.php");
    }
}
