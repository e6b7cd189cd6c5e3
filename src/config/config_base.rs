use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

pub use super::connection::Connection;
pub use super::profile::Profile;
pub use super::user::GrantUser;

/// File names used when no `--file` is given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DumpFiles {
    pub schema: String,
    pub full: String,
    pub grants: String,
}

impl Default for DumpFiles {
    fn default() -> Self {
        Self {
            schema: "00-Schema.sql".to_string(),
            full: "05-FullTables.sql".to_string(),
            grants: "9999-Grants.sql".to_string(),
        }
    }
}

/// External programs, overridable for wrappers (or tests).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Commands {
    pub mysqldump: String,
    pub mysql: String,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            mysqldump: "mysqldump".to_string(),
            mysql: "mysql".to_string(),
        }
    }
}

/// Configuration of one production database and how to turn it into a dev copy.
///  - `connection`: the production server dumps are taken from.
///  - `dev`: the server `db:import` loads the dump into (optional).
///  - `dump_dir`: where the SQL files are written.
///  - `grant_users`, `data_filters`, `data_excludes`: the deployment [Profile].
///
/// For example:
///
/// ```yaml
/// connection:
///   hostname: db.prod.internal
///   database: app
///   password: ${PROD_DB_PASSWORD}
/// dev:
///   hostname: localhost
///   database: app_dev
/// dump_dir: ./dump
/// grant_users:
///   - user: app
///     host: "%"
///     pass: devpass
/// data_filters:
///   orders: "created_at BETWEEN :startDate AND :endDate"
/// data_excludes:
///   - sessions
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub connection: Connection,
    #[serde(default)]
    pub dev: Option<Connection>,
    pub dump_dir: PathBuf,
    #[serde(default)]
    pub files: DumpFiles,
    #[serde(default)]
    pub commands: Commands,
    #[serde(default)]
    pub grant_users: Vec<GrantUser>,
    #[serde(default)]
    pub data_filters: BTreeMap<String, String>,
    #[serde(default)]
    pub data_excludes: Vec<String>,
}

impl std::str::FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(s)?;

        config.validate()?;

        config.expand_env_vars()
    }
}

impl Config {
    pub fn new(config_path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file {}", config_path.display()))?;

        config_str
            .parse::<Config>()
            .with_context(|| format!("invalid config file {}", config_path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;

        if let Some(dev) = &self.dev {
            dev.validate()?;
        }

        if self.dump_dir.as_os_str().is_empty() {
            return Err(anyhow!("Property dump_dir must have a value declared"));
        }

        for (name, value) in [
            ("files.schema", &self.files.schema),
            ("files.full", &self.files.full),
            ("files.grants", &self.files.grants),
            ("commands.mysqldump", &self.commands.mysqldump),
            ("commands.mysql", &self.commands.mysql),
        ] {
            if value.is_empty() {
                return Err(anyhow!("Property {} must have a value declared", name));
            }
        }

        // Validate grant users are unique by user@host
        let mut principals = HashSet::new();
        for user in &self.grant_users {
            user.validate()?;

            if !principals.insert((user.user.as_str(), user.host.as_str())) {
                return Err(anyhow!("duplicated grant user: {}@{}", user.user, user.host));
            }
        }

        for (table, filter) in &self.data_filters {
            if filter.trim().is_empty() {
                return Err(anyhow!("data filter for table {} is empty", table));
            }

            if self.data_excludes.contains(table) {
                return Err(anyhow!(
                    "table {} is both excluded and partially filtered",
                    table
                ));
            }
        }

        Ok(())
    }

    // Expand env variables in connections
    fn expand_env_vars(&self) -> Result<Self> {
        let mut config = self.clone();

        config.connection = config.connection.expand_env_vars()?;
        config.dev = match &config.dev {
            Some(dev) => Some(dev.expand_env_vars()?),
            None => None,
        };

        Ok(config)
    }

    pub fn schema_file(&self) -> PathBuf {
        self.dump_dir.join(&self.files.schema)
    }

    pub fn full_file(&self) -> PathBuf {
        self.dump_dir.join(&self.files.full)
    }

    pub fn grants_file(&self) -> PathBuf {
        self.dump_dir.join(&self.files.grants)
    }
}

impl Profile for Config {
    fn grant_users(&self) -> &[GrantUser] {
        &self.grant_users
    }

    fn default_data_filters(&self) -> &BTreeMap<String, String> {
        &self.data_filters
    }

    fn default_data_excludes(&self) -> &[String] {
        &self.data_excludes
    }
}
