use std::path::PathBuf;
use structopt::StructOpt;

use crate::dump::{DumpDataFullOpts, DumpDataPartialOpts, DumpGrantsOpts, DumpSchemaOpts};
use crate::import::ImportOpts;
use crate::sequence::{AppendDevOpts, InitializeDevOpts};

/// Dump a production MySQL database into a development copy
#[derive(Debug, StructOpt)]
#[structopt(name = "db-dumper")]
pub struct Cli {
    /// The configuration file
    #[structopt(short, long, default_value = "db-dumper.yaml", parse(from_os_str))]
    pub config: PathBuf,

    #[structopt(subcommand)]
    pub cmd: Command,
}

#[derive(StructOpt, Debug)]
pub enum Command {
    /// Dump the schema (no data)
    #[structopt(name = "db:dump-schema")]
    DumpSchema(DumpSchemaOpts),

    /// Dump the data of every table that is not excluded or partially filtered
    #[structopt(name = "db:dump-data-full")]
    DumpDataFull(DumpDataFullOpts),

    /// Dump the rows of filtered tables inside a date range, one file per table
    #[structopt(name = "db:dump-data-partial")]
    DumpDataPartial(DumpDataPartialOpts),

    /// Dump the grants of the configured users, rewritten for the dev server
    #[structopt(name = "db:dump-grants")]
    DumpGrants(DumpGrantsOpts),

    /// Dump schema, full tables, partial tables and grants
    #[structopt(name = "db:initialize-dev")]
    InitializeDev(InitializeDevOpts),

    /// Append partial data (and full tables) to an existing dump
    #[structopt(name = "db:append-dev")]
    AppendDev(AppendDevOpts),

    /// Import SQL files into the dev server
    #[structopt(name = "db:import")]
    Import(ImportOpts),
}

// Parse the command line arguments
pub fn parse() -> Cli {
    Cli::from_args()
}
