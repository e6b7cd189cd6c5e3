use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use structopt::StructOpt;
use walkdir::WalkDir;

use crate::config::Connection;
use crate::error::DumpError;

#[derive(Debug, Clone, Default, PartialEq, Eq, StructOpt)]
pub struct ImportOpts {
    /// SQL file to import, can be repeated
    #[structopt(long = "file", parse(from_os_str))]
    pub files: Vec<PathBuf>,

    /// Import every *.sql file of this directory in name order
    /// [default: <dump_dir> when no --file is given]
    #[structopt(long, parse(from_os_str))]
    pub dir: Option<PathBuf>,

    /// Password of the dev server, prompted for when missing
    #[structopt(long)]
    pub password: Option<String>,
}

/// Feeds SQL files to the `mysql` client, one process per file.
pub struct Import<'a> {
    command: &'a str,
    connection: &'a Connection,
    files: Vec<PathBuf>,
}

impl<'a> Import<'a> {
    pub fn new(command: &'a str, connection: &'a Connection) -> Self {
        Self {
            command,
            connection,
            files: vec![],
        }
    }

    pub fn add_file(&mut self, file: &Path) -> Result<&mut Self> {
        if !file.is_file() {
            return Err(DumpError::configuration(format!(
                "File does not exist: {}",
                file.display()
            ))
            .into());
        }

        self.files.push(file.to_path_buf());

        Ok(self)
    }

    pub fn add_files(&mut self, files: &[PathBuf]) -> Result<&mut Self> {
        for file in files {
            self.add_file(file)?;
        }

        Ok(self)
    }

    /// Adds the `*.sql` files directly inside `dir`, sorted by file name.
    pub fn add_dir(&mut self, dir: &Path) -> Result<&mut Self> {
        if !dir.is_dir() {
            return Err(DumpError::configuration(format!(
                "Directory does not exist: {}",
                dir.display()
            ))
            .into());
        }

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "sql") {
                self.files.push(path.to_path_buf());
            }
        }

        Ok(self)
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(DumpError::configuration("No files are specified to import").into());
        }

        Ok(())
    }

    pub fn args(&self) -> Vec<String> {
        vec![
            format!("--host={}", self.connection.hostname),
            format!("--port={}", self.connection.port),
            format!("--user={}", self.connection.username),
            self.connection.database.clone(),
        ]
    }

    /// Imports every file in order, stops at the first failure.
    pub fn run(&self, password: &str) -> Result<()> {
        self.validate()?;

        let args = self.args();

        for file in &self.files {
            info!("Importing {}", file.display());
            debug!("{} {} < {}", self.command, args.join(" "), file.display());

            let input =
                File::open(file).with_context(|| format!("could not open {}", file.display()))?;

            let status = Command::new(self.command)
                .args(&args)
                .env("MYSQL_PWD", password)
                .stdin(Stdio::from(input))
                .status()
                .with_context(|| format!("failed to run `{}`", self.command))?;

            if !status.success() {
                return Err(anyhow!(
                    "`{}` exited with {} while importing {}",
                    self.command,
                    status,
                    file.display()
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn dev() -> Connection {
        Connection {
            database: "app_dev".to_string(),
            ..Connection::default()
        }
    }

    #[test]
    fn test_add_dir_sorted_sql_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["9999-Grants.sql", "00-Schema.sql", "10-orders.sql", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("nested.sql")).unwrap();

        let connection = dev();
        let mut import = Import::new("mysql", &connection);
        import.add_dir(dir.path()).unwrap();

        let names = import
            .files()
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["00-Schema.sql", "10-orders.sql", "9999-Grants.sql"]);
    }

    #[test]
    fn test_add_missing_file() {
        let connection = dev();
        let mut import = Import::new("mysql", &connection);

        let err = import
            .add_file(Path::new("/tmp/db-dumper-missing.sql"))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "File does not exist: /tmp/db-dumper-missing.sql");
    }

    #[test]
    fn test_run_without_files() {
        let connection = dev();
        let import = Import::new("mysql", &connection);

        let err = import.run("pw").unwrap_err();
        assert_eq!(err.to_string(), "No files are specified to import");
    }

    #[test]
    fn test_run_pipes_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("00-Schema.sql");
        fs::write(&file, "CREATE TABLE t (id INT);\n").unwrap();

        let connection = dev();
        let mut import = Import::new("true", &connection);
        import.add_file(&file).unwrap();
        import.run("pw").unwrap();

        let mut failing = Import::new("false", &connection);
        failing.add_file(&file).unwrap();
        let err = failing.run("pw").unwrap_err();
        assert!(err.to_string().contains("while importing"));
    }

    #[test]
    fn test_args() {
        let connection = dev();
        let import = Import::new("mysql", &connection);

        assert_eq!(
            import.args(),
            vec!["--host=localhost", "--port=3306", "--user=root", "app_dev"]
        );
    }
}
