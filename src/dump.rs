use anyhow::Result;
use chrono::NaiveDate;
use log::{info, warn};
use std::path::{Path, PathBuf};
use structopt::StructOpt;

use crate::config::{Config, Profile};
use crate::connection::{DbConnection, GrantSource};
use crate::credentials::Credentials;
use crate::error::DumpError;
use crate::grants::GrantDump;
use crate::import::{Import, ImportOpts};
use crate::mysqldump::{DumpSettings, Mysqldump};
use crate::sequence::{self, SequenceReport, Step, StepRunner, Workflow};

#[derive(Debug, Clone, Default, PartialEq, Eq, StructOpt)]
pub struct DumpSchemaOpts {
    /// Output file [default: <dump_dir>/00-Schema.sql]
    #[structopt(long, parse(from_os_str))]
    pub file: Option<PathBuf>,

    /// Password of the source server, prompted for when missing
    #[structopt(long)]
    pub password: Option<String>,

    /// Comma separated tables to dump (default: all)
    #[structopt(long, use_delimiter = true)]
    pub include_tables: Vec<String>,

    /// Comma separated tables to skip
    #[structopt(long, use_delimiter = true)]
    pub exclude_tables: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, StructOpt)]
pub struct DumpDataFullOpts {
    /// Output file [default: <dump_dir>/05-FullTables.sql]
    #[structopt(long, parse(from_os_str))]
    pub file: Option<PathBuf>,

    /// Password of the source server, prompted for when missing
    #[structopt(long)]
    pub password: Option<String>,

    /// Comma separated tables to dump (default: all)
    #[structopt(long, use_delimiter = true)]
    pub include_tables: Vec<String>,

    /// Comma separated tables to skip, on top of the default excludes
    #[structopt(long, use_delimiter = true)]
    pub exclude_tables: Vec<String>,

    /// Also dump excluded and partially filtered tables
    #[structopt(long)]
    pub ignore_default_excludes: bool,

    /// Append to the output file instead of overwriting it
    #[structopt(long)]
    pub append: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, StructOpt)]
pub struct DumpDataPartialOpts {
    /// First day of the range, YYYY-MM-DD
    pub start_date: String,

    /// Last day of the range, YYYY-MM-DD
    pub end_date: String,

    /// Output directory [default: <dump_dir>]
    #[structopt(long, parse(from_os_str))]
    pub dir: Option<PathBuf>,

    /// Append to existing table files instead of overwriting them
    #[structopt(long)]
    pub append: bool,

    /// Comma separated tables to dump (default: every filtered table)
    #[structopt(long, use_delimiter = true)]
    pub include_tables: Vec<String>,

    /// Comma separated tables to skip
    #[structopt(long, use_delimiter = true)]
    pub exclude_tables: Vec<String>,

    /// Number prefix of the first table file
    #[structopt(long, default_value = "10")]
    pub starting_sequence: usize,

    /// Password of the source server, prompted for when missing
    #[structopt(long)]
    pub password: Option<String>,
}

impl DumpDataPartialOpts {
    pub fn new(start_date: &str, end_date: &str) -> Self {
        Self {
            start_date: start_date.to_string(),
            end_date: end_date.to_string(),
            dir: None,
            append: false,
            include_tables: vec![],
            exclude_tables: vec![],
            starting_sequence: 10,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, StructOpt)]
pub struct DumpGrantsOpts {
    /// Output file [default: <dump_dir>/9999-Grants.sql]
    #[structopt(long, parse(from_os_str))]
    pub file: Option<PathBuf>,

    /// Password of the source server, prompted for when missing
    #[structopt(long)]
    pub password: Option<String>,

    /// Append to the output file instead of overwriting it
    #[structopt(long)]
    pub append_file: bool,
}

fn describe(tables: &[String], empty: &str) -> String {
    if tables.is_empty() {
        empty.to_string()
    } else {
        tables.join(", ")
    }
}

/// Tables left out of the full data dump.
///
/// Unless `ignore_default_excludes` is set these are the profile's excludes
/// plus every partially filtered table, then the explicit excludes.
pub fn full_dump_excludes(profile: &dyn Profile, opts: &DumpDataFullOpts) -> Vec<String> {
    let mut excludes: Vec<String> = vec![];

    let defaults = if opts.ignore_default_excludes {
        vec![]
    } else {
        profile
            .default_data_excludes()
            .iter()
            .chain(profile.default_data_filters().keys())
            .cloned()
            .collect::<Vec<_>>()
    };

    for table in defaults.into_iter().chain(opts.exclude_tables.iter().cloned()) {
        if !excludes.contains(&table) {
            excludes.push(table);
        }
    }

    excludes
}

fn parse_date(value: &str, which: &str) -> Result<NaiveDate, DumpError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        DumpError::configuration(format!(
            "{} Date provided is not in the correct format (expected YYYY-MM-DD): {}",
            which, value
        ))
    })
}

/// `(table, WHERE clause)` pairs of a partial dump, with `:startDate` and
/// `:endDate` replaced by quoted dates.
pub fn partial_dump_filters(
    profile: &dyn Profile,
    opts: &DumpDataPartialOpts,
) -> Result<Vec<(String, String)>, DumpError> {
    let start_date = parse_date(&opts.start_date, "Start")?;
    let end_date = parse_date(&opts.end_date, "End")?;

    let tables: Vec<String> = if opts.include_tables.is_empty() {
        profile.default_data_filters().keys().cloned().collect()
    } else {
        opts.include_tables.clone()
    };

    let start = start_date.format("'%Y-%m-%d'").to_string();
    let end = end_date.format("'%Y-%m-%d'").to_string();

    let filters = tables
        .into_iter()
        .filter(|table| !opts.exclude_tables.contains(table))
        .map(|table| -> Result<(String, String), DumpError> {
            let filter = profile.data_filter_for_table(&table).ok_or_else(|| {
                DumpError::configuration(format!(
                    "Table does not have partial filtering enabled: {}",
                    table
                ))
            })?;

            let filter = filter
                .replace(":startDate", &start)
                .replace(":endDate", &end);

            Ok((table, filter))
        })
        .collect::<Result<Vec<_>, DumpError>>()?;

    if opts.starting_sequence.checked_add(filters.len()).is_none() {
        return Err(DumpError::configuration(format!(
            "Starting sequence {} leaves no room for {} table file(s)",
            opts.starting_sequence,
            filters.len()
        )));
    }

    Ok(filters)
}

/// File a partially dumped table is written to, e.g. `10-orders.sql`.
pub fn partial_dump_file(dir: &Path, sequence: usize, table: &str) -> PathBuf {
    dir.join(format!("{:02}-{}.sql", sequence, table))
}

/// Dumps the grants of every profile user into `file`.
///
/// The first user follows `append`, the others always append.
pub fn write_grants(
    profile: &dyn Profile,
    source: &mut dyn GrantSource,
    file: &Path,
    append: bool,
) -> Result<usize> {
    let mut append = append;
    let mut written = 0;

    for user in profile.grant_users() {
        info!("Dumping grants for {}@{}", user.user, user.host);

        written += GrantDump::new(user.rewrite_spec())
            .to_file(file.to_path_buf())
            .append(append)
            .run(source)?;

        append = true;
    }

    Ok(written)
}

/// Runs dump commands against the configured production server.
///
/// The source password is asked for once and reused by every command.
pub struct Dumper {
    config: Config,
    credentials: Credentials,
}

impl Dumper {
    pub fn new(config: Config) -> Self {
        let credentials = Credentials::new(&config.connection);

        Self {
            config,
            credentials,
        }
    }

    pub fn password(&mut self, explicit: Option<&str>) -> Result<String> {
        self.credentials.password(explicit)
    }

    fn mysqldump<'a>(&'a self, password: &'a str) -> Mysqldump<'a> {
        Mysqldump::new(
            &self.config.commands.mysqldump,
            &self.config.connection,
            password,
        )
    }

    pub fn dump_schema(&mut self, opts: &DumpSchemaOpts) -> Result<()> {
        let file = opts.file.clone().unwrap_or_else(|| self.config.schema_file());
        let password = self.password(opts.password.as_deref())?;

        info!("Dumping prod schema (no data)");
        info!("  Including: {}", describe(&opts.include_tables, "All"));
        info!("  Excluding: {}", describe(&opts.exclude_tables, "None"));

        self.mysqldump(&password)
            .with_settings(DumpSettings {
                no_data: true,
                include_tables: opts.include_tables.clone(),
                exclude_tables: opts.exclude_tables.clone(),
                ..DumpSettings::default()
            })
            .to_file(&file, false)
    }

    pub fn dump_data_full(&mut self, opts: &DumpDataFullOpts) -> Result<()> {
        let file = opts.file.clone().unwrap_or_else(|| self.config.full_file());
        let password = self.password(opts.password.as_deref())?;
        let excludes = full_dump_excludes(&self.config, opts);

        info!("Dumping full tables");
        info!("  Including: {}", describe(&opts.include_tables, "All"));
        info!("  Excluding: {}", describe(&excludes, "None"));

        self.mysqldump(&password)
            .with_settings(DumpSettings {
                no_create_info: true,
                include_tables: opts.include_tables.clone(),
                exclude_tables: excludes,
                ..DumpSettings::default()
            })
            .to_file(&file, opts.append)
    }

    pub fn dump_data_partial(&mut self, opts: &DumpDataPartialOpts) -> Result<()> {
        let dir = opts
            .dir
            .clone()
            .unwrap_or_else(|| self.config.dump_dir.clone());
        let filters = partial_dump_filters(&self.config, opts)?;
        let password = self.password(opts.password.as_deref())?;

        if filters.is_empty() {
            warn!("No tables selected for a partial dump");
            return Ok(());
        }

        info!("Dumping partial data for tables:");
        info!(
            "  {}",
            filters
                .iter()
                .map(|(table, _)| table.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        for (offset, (table, filter)) in filters.into_iter().enumerate() {
            let file = partial_dump_file(&dir, opts.starting_sequence + offset, &table);

            self.mysqldump(&password)
                .with_settings(DumpSettings {
                    no_create_info: true,
                    include_tables: vec![table],
                    where_clause: Some(filter),
                    ..DumpSettings::default()
                })
                .to_file(&file, opts.append)?;
        }

        Ok(())
    }

    pub fn dump_grants(&mut self, opts: &DumpGrantsOpts) -> Result<()> {
        let file = opts.file.clone().unwrap_or_else(|| self.config.grants_file());

        if self.config.grant_users().is_empty() {
            warn!("No grant users configured, nothing to dump");
            return Ok(());
        }

        let password = self.password(opts.password.as_deref())?;

        let mut conn = DbConnection::connect(&self.config.connection, &password)?;
        write_grants(&self.config, &mut conn, &file, opts.append_file)?;

        Ok(())
    }

    /// Loads SQL files into the `dev` server of the configuration.
    pub fn import(&mut self, opts: &ImportOpts) -> Result<()> {
        let dev = self.config.dev.clone().ok_or_else(|| {
            DumpError::configuration("a dev connection must be configured to import")
        })?;

        let mut import = Import::new(&self.config.commands.mysql, &dev);
        import.add_files(&opts.files)?;
        if opts.files.is_empty() || opts.dir.is_some() {
            let dir = opts.dir.as_deref().unwrap_or(self.config.dump_dir.as_path());
            import.add_dir(dir)?;
        }

        // nothing to prompt for when there is nothing to do
        import.validate()?;

        let password = Credentials::new(&dev).password(opts.password.as_deref())?;
        import.run(&password)
    }

    /// Validates the workflow, resolves the shared password once and runs
    /// every step in order.
    pub fn run_workflow(&mut self, workflow: Workflow) -> Result<SequenceReport> {
        workflow.validate()?;

        let password = self.password(workflow.password())?;
        let workflow = workflow.with_password(password);

        Ok(sequence::run_workflow(self, &workflow)?)
    }
}

impl StepRunner for Dumper {
    fn run_step(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::DumpSchema(opts) => self.dump_schema(opts),
            Step::DumpDataFull(opts) => self.dump_data_full(opts),
            Step::DumpDataPartial(opts) => self.dump_data_partial(opts),
            Step::DumpGrants(opts) => self.dump_grants(opts),
        }
    }
}
