use anyhow::{anyhow, Result};
use envmnt::{ExpandOptions, ExpansionType};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

fn default_port() -> u16 {
    3306
}

fn default_username() -> String {
    "root".to_string()
}

/// MySQL server connection section.
///
/// For example:
/// ```yaml
/// connection:
///   hostname: db.prod.internal
///   port: 3306
///   database: app
///   username: root
///   password: ${PROD_DB_PASSWORD}
/// ```
///
/// `port` defaults to 3306 and `username` to `root`. The password is
/// optional, it is prompted for when neither the configuration nor the
/// command line provides one.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Connection {
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    #[serde(default = "default_username")]
    pub username: String,
    pub password: Option<String>,
}

impl Connection {
    pub fn validate(&self) -> Result<()> {
        if self.hostname.is_empty() {
            return Err(anyhow!("Property hostname must have a value declared"));
        }

        if self.database.is_empty() {
            return Err(anyhow!("Property database must have a value declared"));
        }

        if self.username.is_empty() {
            return Err(anyhow!("Property username must have a value declared"));
        }

        Ok(())
    }

    // Expand environment variables in every field.
    // For example: password: ${PROD_DB_PASSWORD}
    pub fn expand_env_vars(&self) -> Result<Self> {
        let mut connection = self.clone();

        connection.hostname = expand(&self.hostname, "hostname");
        connection.database = expand(&self.database, "database");
        connection.username = expand(&self.username, "username");
        connection.password = self.password.as_deref().map(|p| expand(p, "password"));

        Ok(connection)
    }
}

fn expand(value: &str, field: &str) -> String {
    let options = ExpandOptions {
        expansion_type: Some(ExpansionType::UnixBracketsWithDefaults),
        default_to_empty: false,
    };

    let expanded = envmnt::expand(value, Some(options));

    // Most likely the variable was not exported
    if expanded.contains("${") {
        warn!(
            "The connection {} may not have fully expanded environment variables",
            field
        );
    }

    expanded
}

// Never print the password
impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "mysql://{}@{}:{}/{}",
            self.username, self.hostname, self.port, self.database
        )
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: default_port(),
            database: "mysql".to_string(),
            username: default_username(),
            password: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_validate() {
        let connection = Connection::default();
        assert!(connection.validate().is_ok());

        let connection = Connection {
            hostname: "".to_string(),
            ..Connection::default()
        };
        assert_eq!(
            connection.validate().unwrap_err().to_string(),
            "Property hostname must have a value declared"
        );
    }

    #[test]
    fn test_connection_defaults_from_yaml() {
        let connection: Connection =
            serde_yaml::from_str("hostname: db.prod\ndatabase: app\n").unwrap();

        assert_eq!(connection.port, 3306);
        assert_eq!(connection.username, "root");
        assert_eq!(connection.password, None);
    }

    #[test]
    fn test_connection_expand_env_vars() {
        envmnt::set("DB_DUMPER_TEST_PASSWORD", "s3cret");

        let connection = Connection {
            password: Some("${DB_DUMPER_TEST_PASSWORD}".to_string()),
            ..Connection::default()
        };
        let expanded = connection.expand_env_vars().unwrap();
        assert_eq!(expanded.password.as_deref(), Some("s3cret"));

        envmnt::remove("DB_DUMPER_TEST_PASSWORD");
    }

    #[test]
    fn test_connection_display_hides_password() {
        let connection = Connection {
            password: Some("s3cret".to_string()),
            ..Connection::default()
        };

        assert_eq!(connection.to_string(), "mysql://root@localhost:3306/mysql");
    }
}
