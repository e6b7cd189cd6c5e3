use anyhow::{Context, Result};

use crate::config::Connection;

/// Password of one server, asked for at most once per process.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    hostname: String,
    password: Option<String>,
}

impl Credentials {
    pub fn new(connection: &Connection) -> Self {
        Self {
            username: connection.username.clone(),
            hostname: connection.hostname.clone(),
            password: connection.password.clone(),
        }
    }

    /// An explicit password wins and is remembered for later calls.
    /// Otherwise the remembered one is used, or the user is prompted.
    pub fn password(&mut self, explicit: Option<&str>) -> Result<String> {
        if let Some(password) = explicit {
            self.password = Some(password.to_string());
        }

        match &self.password {
            Some(password) => Ok(password.clone()),
            None => {
                let password = rpassword::prompt_password(format!(
                    "Password for {}@{}: ",
                    self.username, self.hostname
                ))
                .with_context(|| {
                    format!(
                        "could not read password for {}@{}, use --password",
                        self.username, self.hostname
                    )
                })?;

                self.password = Some(password.clone());
                Ok(password)
            }
        }
    }
}
