use anyhow::Result;
use db_dumper::cli::{self, Command};
use db_dumper::config::Config;
use db_dumper::dump::Dumper;
use db_dumper::sequence::Workflow;
use env_logger::Env;
use log::info;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = cli::parse();
    let config = Config::new(&args.config)?;
    let mut dumper = Dumper::new(config);

    match args.cmd {
        Command::DumpSchema(opts) => dumper.dump_schema(&opts)?,
        Command::DumpDataFull(opts) => dumper.dump_data_full(&opts)?,
        Command::DumpDataPartial(opts) => dumper.dump_data_partial(&opts)?,
        Command::DumpGrants(opts) => dumper.dump_grants(&opts)?,
        Command::InitializeDev(opts) => {
            dumper.run_workflow(Workflow::InitializeDev(opts))?;
        }
        Command::AppendDev(opts) => {
            dumper.run_workflow(Workflow::AppendDev(opts))?;
        }
        Command::Import(opts) => dumper.import(&opts)?,
    }

    info!("Done");

    Ok(())
}
