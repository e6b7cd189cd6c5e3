use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

use crate::config::Connection;

/// What to put in a dump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpSettings {
    /// Schema only
    pub no_data: bool,
    /// Data only
    pub no_create_info: bool,
    /// Empty means every table
    pub include_tables: Vec<String>,
    pub exclude_tables: Vec<String>,
    pub lock_tables: bool,
    pub where_clause: Option<String>,
}

/// One run of the external `mysqldump` program.
///
/// The password goes through `MYSQL_PWD` so that it does not show up in the
/// process list.
pub struct Mysqldump<'a> {
    command: &'a str,
    connection: &'a Connection,
    password: &'a str,
    settings: DumpSettings,
}

impl<'a> Mysqldump<'a> {
    pub fn new(command: &'a str, connection: &'a Connection, password: &'a str) -> Self {
        Self {
            command,
            connection,
            password,
            settings: DumpSettings::default(),
        }
    }

    pub fn with_settings(self, settings: DumpSettings) -> Self {
        Self { settings, ..self }
    }

    pub fn args(&self) -> Vec<String> {
        let settings = &self.settings;
        let mut args = vec![
            format!("--host={}", self.connection.hostname),
            format!("--port={}", self.connection.port),
            format!("--user={}", self.connection.username),
        ];

        if settings.no_data {
            args.push("--no-data".to_string());
        }
        if settings.no_create_info {
            args.push("--no-create-info".to_string());
        }
        if !settings.lock_tables {
            args.push("--skip-lock-tables".to_string());
        }
        if let Some(where_clause) = &settings.where_clause {
            args.push(format!("--where={}", where_clause));
        }
        for table in &settings.exclude_tables {
            args.push(format!(
                "--ignore-table={}.{}",
                self.connection.database, table
            ));
        }

        args.push(self.connection.database.clone());
        args.extend(settings.include_tables.iter().cloned());

        args
    }

    /// Runs the dump with stdout going to `file`, which is replaced unless
    /// `append` is set.
    ///
    /// A failed run leaves `file` as it was: a replacement is written to a
    /// temporary file first, an append is cut back to the previous length.
    pub fn to_file(&self, file: &Path, append: bool) -> Result<()> {
        let dir = match file.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).with_context(|| {
                    format!("could not create directory {}", parent.display())
                })?;
                parent
            }
            None => Path::new("."),
        };

        if append {
            self.append_to(file)
        } else {
            self.replace(file, dir)
        }
    }

    fn replace(&self, file: &Path, dir: &Path) -> Result<()> {
        let output = NamedTempFile::new_in(dir)
            .with_context(|| format!("could not create a temporary file in {}", dir.display()))?;

        self.run(output.as_file().try_clone()?, file)?;

        output
            .persist(file)
            .with_context(|| format!("could not write {}", file.display()))?;

        Ok(())
    }

    fn append_to(&self, file: &Path) -> Result<()> {
        let existed = file.exists();
        let output = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .with_context(|| format!("could not open {}", file.display()))?;
        let len = output.metadata()?.len();

        let result = self.run(output.try_clone()?, file);
        if result.is_err() {
            warn!("Rolling back {} to {} bytes", file.display(), len);
            if existed {
                output.set_len(len)?;
            } else {
                drop(output);
                fs::remove_file(file)?;
            }
        }

        result
    }

    fn run(&self, output: File, file: &Path) -> Result<()> {
        let args = self.args();
        debug!("{} {}", self.command, args.join(" "));

        let status = Command::new(self.command)
            .args(&args)
            .env("MYSQL_PWD", self.password)
            .stdin(Stdio::null())
            .stdout(Stdio::from(output))
            .status()
            .with_context(|| format!("failed to run `{}`", self.command))?;

        if !status.success() {
            return Err(anyhow!(
                "`{}` exited with {} while writing {}",
                self.command,
                status,
                file.display()
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        Connection {
            hostname: "db.prod".to_string(),
            database: "app".to_string(),
            ..Connection::default()
        }
    }

    #[test]
    fn test_schema_args() {
        let connection = connection();
        let dump = Mysqldump::new("mysqldump", &connection, "pw").with_settings(DumpSettings {
            no_data: true,
            include_tables: vec!["users".to_string(), "orders".to_string()],
            ..DumpSettings::default()
        });

        assert_eq!(
            dump.args(),
            vec![
                "--host=db.prod",
                "--port=3306",
                "--user=root",
                "--no-data",
                "--skip-lock-tables",
                "app",
                "users",
                "orders",
            ]
        );
    }

    #[test]
    fn test_partial_args() {
        let connection = connection();
        let dump = Mysqldump::new("mysqldump", &connection, "pw").with_settings(DumpSettings {
            no_create_info: true,
            lock_tables: true,
            exclude_tables: vec!["sessions".to_string()],
            where_clause: Some("created_at >= '2024-01-01'".to_string()),
            ..DumpSettings::default()
        });

        assert_eq!(
            dump.args(),
            vec![
                "--host=db.prod",
                "--port=3306",
                "--user=root",
                "--no-create-info",
                "--where=created_at >= '2024-01-01'",
                "--ignore-table=app.sessions",
                "app",
            ]
        );
    }

    #[test]
    fn test_to_file_truncate_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested").join("dump.sql");
        let connection = connection();
        let dump = Mysqldump::new("echo", &connection, "pw");

        dump.to_file(&file, false).unwrap();
        dump.to_file(&file, true).unwrap();
        let content = fs::read_to_string(&file).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.starts_with("--host=db.prod --port=3306"));

        dump.to_file(&file, false).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_to_file_failure() {
        let dir = tempfile::tempdir().unwrap();
        let connection = connection();

        let err = Mysqldump::new("false", &connection, "pw")
            .to_file(&dir.path().join("dump.sql"), false)
            .unwrap_err();
        assert!(err.to_string().starts_with("`false` exited with"));
    }

    #[test]
    fn test_to_file_failure_keeps_previous_dump() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("05-FullTables.sql");
        fs::write(&file, "previous good dump\n").unwrap();
        let connection = connection();

        for append in [false, true] {
            Mysqldump::new("false", &connection, "pw")
                .to_file(&file, append)
                .unwrap_err();
            assert_eq!(fs::read_to_string(&file).unwrap(), "previous good dump\n");
        }

        Mysqldump::new("db-dumper-no-such-program", &connection, "pw")
            .to_file(&file, false)
            .unwrap_err();
        assert_eq!(fs::read_to_string(&file).unwrap(), "previous good dump\n");

        // no temporary files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_to_file_failed_append_rolls_back_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("10-orders.sql");
        fs::write(&file, "first range\n").unwrap();
        let connection = connection();

        // writes its arguments, then fails
        let script = dir.path().join("half-dump.sh");
        fs::write(&script, "#!/bin/sh\necho \"$@\"\nexit 3\n").unwrap();
        let mut permissions = fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut permissions, 0o755);
        fs::set_permissions(&script, permissions).unwrap();

        let command = script.to_str().unwrap();
        Mysqldump::new(command, &connection, "pw")
            .to_file(&file, true)
            .unwrap_err();
        assert_eq!(fs::read_to_string(&file).unwrap(), "first range\n");

        let fresh = dir.path().join("11-events.sql");
        Mysqldump::new(command, &connection, "pw")
            .to_file(&fresh, true)
            .unwrap_err();
        assert!(!fresh.exists());
    }

    #[test]
    fn test_to_file_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let connection = connection();

        let err = Mysqldump::new("db-dumper-no-such-program", &connection, "pw")
            .to_file(&dir.path().join("dump.sql"), false)
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to run `db-dumper-no-such-program`");
    }
}
