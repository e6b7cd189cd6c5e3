use anyhow::{Context, Result};
use log::{debug, info, warn};
use regex::{NoExpand, Regex};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::connection::GrantSource;
use crate::error::DumpError;

/// Placeholder the server prints instead of a password hash.
pub const REDACTED_PASSWORD: &str = "<secret>";

/// Who the grants are read for and how they are rewritten for the
/// destination server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSpec {
    pub source_user: String,
    pub source_host: String,
    pub source_database: Option<String>,
    pub destination_user: Option<String>,
    pub destination_host: Option<String>,
    pub destination_password: Option<String>,
    pub destination_database: Option<String>,
}

impl RewriteSpec {
    pub fn new(source_user: &str, source_host: &str) -> Self {
        Self {
            source_user: source_user.to_string(),
            source_host: source_host.to_string(),
            ..Self::default()
        }
    }

    pub fn with_source_database(self, database: &str) -> Self {
        Self {
            source_database: Some(database.to_string()),
            ..self
        }
    }

    pub fn with_destination_user(self, user: &str, host: &str) -> Self {
        Self {
            destination_user: Some(user.to_string()),
            destination_host: Some(host.to_string()),
            ..self
        }
    }

    pub fn with_destination_password(self, password: &str) -> Self {
        Self {
            destination_password: Some(password.to_string()),
            ..self
        }
    }

    pub fn with_destination_database(self, database: &str) -> Self {
        Self {
            destination_database: Some(database.to_string()),
            ..self
        }
    }
}

// Empty strings count as "not set"
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Turns `SHOW GRANTS` rows into statements for the destination server.
///
/// The rules run in a fixed order: user, password, database. Then a single
/// `;` terminates the statement. Feeding an output line back in gives the
/// same line.
#[derive(Debug)]
pub struct GrantRewriter {
    user: Option<(Regex, String)>,
    password: (Regex, String),
    // appended to `GRANT USAGE` rows that carry no password (MySQL 5.7+)
    usage_password: Option<String>,
    database: Option<(Regex, String)>,
}

impl GrantRewriter {
    pub fn new(spec: &RewriteSpec) -> Result<Self> {
        let user = match non_empty(&spec.destination_user) {
            Some(destination_user) => {
                let destination_host =
                    non_empty(&spec.destination_host).unwrap_or(&spec.source_host);
                let from = format!(
                    "'{}'@'{}'",
                    regex::escape(&spec.source_user),
                    regex::escape(&spec.source_host)
                );
                let to = format!("'{}'@'{}'", destination_user, destination_host);
                Some((Regex::new(&from)?, to))
            }
            None => None,
        };

        let secret = regex::escape(REDACTED_PASSWORD);
        let quoted_password = non_empty(&spec.destination_password).map(quote_literal);
        let password = match &quoted_password {
            // IDENTIFIED BY PASSWORD expects a hash, a plain password drops the keyword
            Some(password) => (
                Regex::new(&format!("(?:PASSWORD )?{}", secret))?,
                password.clone(),
            ),
            // MySQL 5.6 prints the redacted clause, strip it
            None => (
                Regex::new(&format!(" IDENTIFIED BY PASSWORD {}", secret))?,
                String::new(),
            ),
        };

        let database = match (
            non_empty(&spec.source_database),
            non_empty(&spec.destination_database),
        ) {
            (Some(source), Some(destination)) => Some((
                Regex::new(&format!("`{}`", regex::escape(source)))?,
                format!("`{}`", destination),
            )),
            _ => None,
        };

        Ok(Self {
            user,
            password,
            usage_password: quoted_password,
            database,
        })
    }

    fn replace_user(&self, line: String) -> String {
        match &self.user {
            Some((from, to)) => from.replacen(&line, 1, NoExpand(to)).into_owned(),
            None => line,
        }
    }

    fn replace_password(&self, line: String) -> String {
        let (from, to) = &self.password;
        let line = from.replace_all(&line, NoExpand(to)).into_owned();

        match &self.usage_password {
            Some(password)
                if line.starts_with("GRANT USAGE ON") && !line.contains("IDENTIFIED BY") =>
            {
                format!("{} IDENTIFIED BY {}", line, password)
            }
            _ => line,
        }
    }

    fn replace_database(&self, line: String) -> String {
        match &self.database {
            Some((from, to)) => from.replace_all(&line, NoExpand(to)).into_owned(),
            None => line,
        }
    }

    /// Rewrite one grant row into a `;` terminated statement.
    pub fn rewrite(&self, line: &str) -> String {
        let line = line.trim_end_matches(';').to_string();

        let line = self.replace_user(line);
        let line = self.replace_password(line);
        let line = self.replace_database(line);

        format!("{};", line)
    }
}

// SQL string literal, quotes and backslashes escaped
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// One-shot form of [GrantRewriter::rewrite].
pub fn rewrite_grant_line(line: &str, spec: &RewriteSpec) -> Result<String> {
    Ok(GrantRewriter::new(spec)?.rewrite(line))
}

/// Reads the grants of one user and writes them, rewritten, to a file.
#[derive(Debug, Clone)]
pub struct GrantDump {
    pub spec: RewriteSpec,
    pub file: Option<PathBuf>,
    pub append: bool,
}

impl GrantDump {
    pub fn new(spec: RewriteSpec) -> Self {
        Self {
            spec,
            file: None,
            append: false,
        }
    }

    pub fn to_file(self, file: PathBuf) -> Self {
        Self {
            file: Some(file),
            ..self
        }
    }

    pub fn append(self, append: bool) -> Self {
        Self { append, ..self }
    }

    /// Returns the number of statements written.
    pub fn run(&self, source: &mut dyn GrantSource) -> Result<usize> {
        if self.spec.source_user.is_empty() || self.spec.source_host.is_empty() {
            return Err(DumpError::configuration(
                "source user and host must be set before dumping grants",
            )
            .into());
        }

        let file = self.file.as_ref().ok_or_else(|| {
            DumpError::configuration("Filename must be specified before dumping grants")
        })?;

        let rewriter = GrantRewriter::new(&self.spec)?;

        let rows = source.show_grants(&self.spec.source_user, &self.spec.source_host)?;
        if rows.is_empty() {
            return Err(DumpError::NoData {
                user: self.spec.source_user.clone(),
                host: self.spec.source_host.clone(),
            }
            .into());
        }

        let statements: Vec<String> = rows.iter().map(|row| rewriter.rewrite(row)).collect();
        if non_empty(&self.spec.destination_password).is_some()
            && !statements.iter().any(|s| s.contains("IDENTIFIED BY"))
        {
            warn!(
                "No grant of {}@{} takes a password, the destination password is not applied",
                self.spec.source_user, self.spec.source_host
            );
        }

        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("could not create directory {}", parent.display()))?;
        }

        let handle = OpenOptions::new()
            .create(true)
            .write(true)
            .append(self.append)
            .truncate(!self.append)
            .open(file)
            .with_context(|| format!("could not open {}", file.display()))?;
        let mut writer = BufWriter::new(handle);

        for statement in &statements {
            debug!("grant: {}", statement);
            writeln!(writer, "{}", statement)
                .with_context(|| format!("could not write to {}", file.display()))?;
        }
        writer.flush()?;

        info!(
            "  Wrote {} statement(s) to {}",
            statements.len(),
            file.display()
        );

        Ok(statements.len())
    }
}
