use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::grants::RewriteSpec;

/// A user whose grants are copied to the dev server.
///
/// ```yaml
/// grant_users:
///   - user: app
///     host: "%"
///     pass: devpass
///   - user: report
///     host: 10.0.0.%
///     destination_user: report_dev
///     destination_host: localhost
///     source_database: app
///     destination_database: app_dev
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GrantUser {
    pub user: String,
    pub host: String,
    // password for the destination server, optional
    pub pass: Option<String>,
    pub destination_user: Option<String>,
    pub destination_host: Option<String>,
    pub source_database: Option<String>,
    pub destination_database: Option<String>,
}

impl GrantUser {
    pub fn new(user: &str, host: &str) -> Self {
        Self {
            user: user.to_string(),
            host: host.to_string(),
            pass: None,
            destination_user: None,
            destination_host: None,
            source_database: None,
            destination_database: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.user.is_empty() {
            return Err(anyhow!("grant user name is empty"));
        }

        if self.host.is_empty() {
            return Err(anyhow!("grant user {} has an empty host", self.user));
        }

        if self.destination_host.is_some() && self.destination_user.is_none() {
            return Err(anyhow!(
                "grant user {}@{} sets destination_host without destination_user",
                self.user,
                self.host
            ));
        }

        Ok(())
    }

    /// Rewrite rules for the grants of this user.
    pub fn rewrite_spec(&self) -> RewriteSpec {
        RewriteSpec {
            source_user: self.user.clone(),
            source_host: self.host.clone(),
            source_database: self.source_database.clone(),
            destination_user: self.destination_user.clone(),
            destination_host: self.destination_host.clone(),
            destination_password: self.pass.clone(),
            destination_database: self.destination_database.clone(),
        }
    }
}
