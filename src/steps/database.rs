//! Database bootstrap via the `mysql` client.
//!
//! The statements are rendered into a single `-e` argument. Identifiers are
//! interpolated into SQL text, so `DatabaseConfig::validate` must have
//! accepted them first.

use crate::config::DatabaseConfig;
use crate::step_traits::StepCommand;

/// Statements that reset and recreate the lab database and its account.
pub fn bootstrap_statements(db: &DatabaseConfig) -> Vec<String> {
    let account = format!("'{}'@'{}'", db.user, db.host);
    vec![
        format!("drop database if exists {};", db.name),
        format!("drop user if exists {};", account),
        format!("create database {};", db.name),
        format!("create user {} identified by '{}';", account, db.password),
        format!("grant all privileges on {}.* to {};", db.name, account),
        "flush privileges;".to_string(),
    ]
}

/// `mysql -e "<statements>"`
///
/// Runs as the invoking (root) user; if the server requires a password for
/// root this fails and the step is reported as failed.
#[derive(Debug, Clone)]
pub struct MysqlExecArgs {
    pub sql: String,
}

impl MysqlExecArgs {
    pub fn from_statements(statements: &[String]) -> Self {
        Self {
            sql: statements.join(" "),
        }
    }
}

impl StepCommand for MysqlExecArgs {
    fn program(&self) -> &str {
        "mysql"
    }

    fn args(&self) -> Vec<String> {
        vec!["-e".to_string(), self.sql.clone()]
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }
}

/// Identifier characters allowed in database, user and host names.
pub fn is_safe_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Passwords are quoted with `'`, so they cannot contain a quote or backslash.
pub fn is_safe_password(value: &str) -> bool {
    !value.contains('\'') && !value.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bootstrap_statements() {
        let statements = bootstrap_statements(&DatabaseConfig::default());
        assert_eq!(
            statements,
            vec![
                "drop database if exists dvwa;",
                "drop user if exists 'admin'@'127.0.0.1';",
                "create database dvwa;",
                "create user 'admin'@'127.0.0.1' identified by 'password';",
                "grant all privileges on dvwa.* to 'admin'@'127.0.0.1';",
                "flush privileges;",
            ]
        );
    }

    #[test]
    fn test_mysql_single_argument() {
        let statements = vec!["create database a;".to_string(), "flush privileges;".to_string()];
        let cmd = MysqlExecArgs::from_statements(&statements);
        assert_eq!(cmd.program(), "mysql");
        assert_eq!(cmd.args(), vec!["-e", "create database a; flush privileges;"]);
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_safe_identifier("dvwa"));
        assert!(is_safe_identifier("127.0.0.1"));
        assert!(is_safe_identifier("lab_user-2"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("dvwa; drop"));
        assert!(!is_safe_identifier("a'b"));
    }

    #[test]
    fn test_password_rules() {
        assert!(is_safe_password("password"));
        assert!(is_safe_password("p@ss w0rd!"));
        assert!(!is_safe_password("it's"));
        assert!(!is_safe_password(r"back\slash"));
    }
}
