//! PHP interpreter configuration.

use std::path::PathBuf;

use crate::step_traits::StepCommand;

/// Default ini for the Apache SAPI of PHP 8.4 on Debian-family systems.
pub const DEFAULT_PHP_INI: &str = "/etc/php/8.4/apache2/php.ini";

const ALLOW_URL_INCLUDE_EXPR: &str = r"s/^allow_url_include\s*=.*/allow_url_include = On/";

/// `sed -i 's/^allow_url_include\s*=.*/allow_url_include = On/' <php_ini>`
#[derive(Debug, Clone)]
pub struct AllowUrlIncludeArgs {
    pub php_ini: PathBuf,
}

impl StepCommand for AllowUrlIncludeArgs {
    fn program(&self) -> &str {
        "sed"
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            ALLOW_URL_INCLUDE_EXPR.to_string(),
            self.php_ini.display().to_string(),
        ]
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sed_args() {
        let cmd = AllowUrlIncludeArgs {
            php_ini: PathBuf::from(DEFAULT_PHP_INI),
        };
        assert_eq!(
            cmd.args(),
            vec![
                "-i",
                r"s/^allow_url_include\s*=.*/allow_url_include = On/",
                "/etc/php/8.4/apache2/php.ini",
            ]
        );
    }

    #[test]
    fn test_sed_rewrites_directive() {
        use crate::command_runner::{RunOptions, run_step};

        let dir = tempfile::tempdir().unwrap();
        let ini = dir.path().join("php.ini");
        std::fs::write(
            &ini,
            "; comment\nallow_url_fopen = On\nallow_url_include = Off\nmemory_limit = 128M\n",
        )
        .unwrap();

        let cmd = AllowUrlIncludeArgs { php_ini: ini.clone() };
        let out = run_step(&cmd, &RunOptions::default()).unwrap().unwrap();
        assert!(out.success, "sed failed: {}", out.stderr);

        let content = std::fs::read_to_string(&ini).unwrap();
        assert_eq!(
            content,
            "; comment\nallow_url_fopen = On\nallow_url_include = On\nmemory_limit = 128M\n"
        );
    }
}
