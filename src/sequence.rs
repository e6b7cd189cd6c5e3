use ansi_term::Colour::{Green, Red, Yellow};
use anyhow::Result;
use ascii_table::AsciiTable;
use log::{error, info};
use structopt::StructOpt;

use crate::dump::{DumpDataFullOpts, DumpDataPartialOpts, DumpGrantsOpts, DumpSchemaOpts};
use crate::error::DumpError;

/// One sub-command of a workflow with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    DumpSchema(DumpSchemaOpts),
    DumpDataFull(DumpDataFullOpts),
    DumpDataPartial(DumpDataPartialOpts),
    DumpGrants(DumpGrantsOpts),
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::DumpSchema(_) => "db:dump-schema",
            Step::DumpDataFull(_) => "db:dump-data-full",
            Step::DumpDataPartial(_) => "db:dump-data-partial",
            Step::DumpGrants(_) => "db:dump-grants",
        }
    }
}

/// Runs a single step to completion.
pub trait StepRunner {
    fn run_step(&mut self, step: &Step) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Done,
    Failed,
}

impl StepStatus {
    fn paint(&self) -> String {
        match self {
            StepStatus::Pending => Yellow.paint("skipped").to_string(),
            StepStatus::Done => Green.paint("done").to_string(),
            StepStatus::Failed => Red.paint("failed").to_string(),
        }
    }
}

/// Outcome of every step of a sequence, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    pub steps: Vec<(&'static str, StepStatus)>,
}

impl SequenceReport {
    fn new(steps: &[Step]) -> Self {
        Self {
            steps: steps
                .iter()
                .map(|step| (step.name(), StepStatus::Pending))
                .collect(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.steps
            .iter()
            .all(|(_, status)| *status == StepStatus::Done)
    }
}

/// Runs `steps` one after the other and stops at the first failure.
pub fn run_sequence(
    runner: &mut dyn StepRunner,
    steps: &[Step],
) -> std::result::Result<SequenceReport, DumpError> {
    let total = steps.len();
    let mut report = SequenceReport::new(steps);

    for (index, step) in steps.iter().enumerate() {
        info!("[{}/{}] Running {}", index + 1, total, step.name());

        if let Err(source) = runner.run_step(step) {
            report.steps[index].1 = StepStatus::Failed;
            error!("{}: {}", Red.paint("Error"), step.name());
            error!("  -> {}: {:#}", Red.paint("Error details"), source);
            print_summary(&report);

            return Err(DumpError::SubcommandFailure {
                step: index + 1,
                total,
                command: step.name().to_string(),
                source,
            });
        }

        report.steps[index].1 = StepStatus::Done;
    }

    print_summary(&report);

    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq, StructOpt)]
pub struct InitializeDevOpts {
    /// First day of partially dumped data, YYYY-MM-DD
    pub start_date: String,

    /// Last day of partially dumped data, YYYY-MM-DD
    pub end_date: String,

    /// Password of the source server, prompted for when missing
    #[structopt(long)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, StructOpt)]
pub struct AppendDevOpts {
    /// First day of partially dumped data, YYYY-MM-DD
    pub start_date: String,

    /// Last day of partially dumped data, YYYY-MM-DD
    pub end_date: String,

    /// Do not dump full tables at all
    #[structopt(long)]
    pub exclude_full_tables: bool,

    /// Overwrite the full tables file instead of appending to it
    #[structopt(long)]
    pub overwrite_full_tables: bool,

    /// Password of the source server, prompted for when missing
    #[structopt(long)]
    pub password: Option<String>,
}

/// The fixed step lists a dev database is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Workflow {
    /// Schema, full tables, partial tables and grants from scratch.
    InitializeDev(InitializeDevOpts),
    /// More partial data (and optionally full tables) on top of an existing dump.
    AppendDev(AppendDevOpts),
}

impl Workflow {
    pub fn name(&self) -> &'static str {
        match self {
            Workflow::InitializeDev(_) => "initialize-dev",
            Workflow::AppendDev(_) => "append-dev",
        }
    }

    pub fn password(&self) -> Option<&str> {
        match self {
            Workflow::InitializeDev(opts) => opts.password.as_deref(),
            Workflow::AppendDev(opts) => opts.password.as_deref(),
        }
    }

    pub fn with_password(self, password: String) -> Self {
        match self {
            Workflow::InitializeDev(opts) => Workflow::InitializeDev(InitializeDevOpts {
                password: Some(password),
                ..opts
            }),
            Workflow::AppendDev(opts) => Workflow::AppendDev(AppendDevOpts {
                password: Some(password),
                ..opts
            }),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), DumpError> {
        match self {
            Workflow::InitializeDev(_) => Ok(()),
            Workflow::AppendDev(opts) => {
                if opts.exclude_full_tables && opts.overwrite_full_tables {
                    return Err(DumpError::configuration(
                        "--exclude-full-tables and --overwrite-full-tables are mutually exclusive",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Expands the preset, every step carries the shared password.
    pub fn steps(&self) -> std::result::Result<Vec<Step>, DumpError> {
        self.validate()?;

        let steps = match self {
            Workflow::InitializeDev(opts) => {
                let password = opts.password.clone();
                vec![
                    Step::DumpSchema(DumpSchemaOpts {
                        password: password.clone(),
                        ..DumpSchemaOpts::default()
                    }),
                    Step::DumpDataFull(DumpDataFullOpts {
                        password: password.clone(),
                        ..DumpDataFullOpts::default()
                    }),
                    Step::DumpDataPartial(DumpDataPartialOpts {
                        password: password.clone(),
                        ..DumpDataPartialOpts::new(&opts.start_date, &opts.end_date)
                    }),
                    Step::DumpGrants(DumpGrantsOpts {
                        password,
                        ..DumpGrantsOpts::default()
                    }),
                ]
            }
            Workflow::AppendDev(opts) => {
                let mut steps = vec![];
                if !opts.exclude_full_tables {
                    steps.push(Step::DumpDataFull(DumpDataFullOpts {
                        password: opts.password.clone(),
                        append: !opts.overwrite_full_tables,
                        ..DumpDataFullOpts::default()
                    }));
                }
                steps.push(Step::DumpDataPartial(DumpDataPartialOpts {
                    password: opts.password.clone(),
                    append: true,
                    ..DumpDataPartialOpts::new(&opts.start_date, &opts.end_date)
                }));
                steps
            }
        };

        Ok(steps)
    }
}

/// Validates and runs a workflow preset.
pub fn run_workflow(
    runner: &mut dyn StepRunner,
    workflow: &Workflow,
) -> std::result::Result<SequenceReport, DumpError> {
    let steps = workflow.steps()?;

    info!("Running workflow {} ({} steps)", workflow.name(), steps.len());

    run_sequence(runner, &steps)
}

/// Print summary table
fn print_summary(report: &SequenceReport) {
    let mut summary = vec![vec![
        "Step".to_string(),
        "Command".to_string(),
        "Status".to_string(),
    ]];
    summary.push(vec!["---".to_string(), "---".to_string(), "---".to_string()]);

    for (index, (name, status)) in report.steps.iter().enumerate() {
        summary.push(vec![
            (index + 1).to_string(),
            name.to_string(),
            status.paint(),
        ]);
    }

    let term_width = term_size::dimensions()
        .map(|(w, _)| w)
        .unwrap_or(120)
        .saturating_sub(5);

    let mut table = AsciiTable::default();
    table.set_max_width(term_width);

    info!("Summary:\n{}", table.format(summary));
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    /// Records invoked steps, fails on the n-th call (1-based).
    struct Recorder {
        fail_at: Option<usize>,
        invoked: Vec<Step>,
    }

    impl Recorder {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                fail_at,
                invoked: vec![],
            }
        }

        fn names(&self) -> Vec<&'static str> {
            self.invoked.iter().map(Step::name).collect()
        }
    }

    impl StepRunner for Recorder {
        fn run_step(&mut self, step: &Step) -> Result<()> {
            self.invoked.push(step.clone());
            if Some(self.invoked.len()) == self.fail_at {
                return Err(anyhow!("exit code 2"));
            }
            Ok(())
        }
    }

    fn initialize_dev() -> Workflow {
        Workflow::InitializeDev(InitializeDevOpts {
            start_date: "2024-01-01".to_string(),
            end_date: "2024-01-31".to_string(),
            password: Some("pw".to_string()),
        })
    }

    fn append_dev(exclude_full_tables: bool, overwrite_full_tables: bool) -> Workflow {
        Workflow::AppendDev(AppendDevOpts {
            start_date: "2024-02-01".to_string(),
            end_date: "2024-02-29".to_string(),
            exclude_full_tables,
            overwrite_full_tables,
            password: Some("pw".to_string()),
        })
    }

    #[test]
    fn test_initialize_dev_runs_all_steps() {
        let mut runner = Recorder::new(None);

        let report = run_workflow(&mut runner, &initialize_dev()).unwrap();

        assert!(report.all_succeeded());
        assert_eq!(
            runner.names(),
            vec![
                "db:dump-schema",
                "db:dump-data-full",
                "db:dump-data-partial",
                "db:dump-grants"
            ]
        );

        // shared password and date range are passed through
        match &runner.invoked[2] {
            Step::DumpDataPartial(opts) => {
                assert_eq!(opts.start_date, "2024-01-01");
                assert_eq!(opts.end_date, "2024-01-31");
                assert_eq!(opts.password.as_deref(), Some("pw"));
                assert_eq!(opts.starting_sequence, 10);
                assert!(!opts.append);
            }
            step => panic!("unexpected step {:?}", step),
        }
        match &runner.invoked[3] {
            Step::DumpGrants(opts) => assert_eq!(opts.password.as_deref(), Some("pw")),
            step => panic!("unexpected step {:?}", step),
        }
    }

    #[test]
    fn test_initialize_dev_stops_at_failing_step() {
        let mut runner = Recorder::new(Some(2));

        let err = run_workflow(&mut runner, &initialize_dev()).unwrap_err();

        assert_eq!(runner.names(), vec!["db:dump-schema", "db:dump-data-full"]);
        match err {
            DumpError::SubcommandFailure {
                step,
                total,
                command,
                source,
            } => {
                assert_eq!(step, 2);
                assert_eq!(total, 4);
                assert_eq!(command, "db:dump-data-full");
                assert_eq!(source.to_string(), "exit code 2");
            }
            err => panic!("unexpected error {:?}", err),
        }
    }

    #[test]
    fn test_append_dev_mutually_exclusive_flags() {
        let mut runner = Recorder::new(None);

        let err = run_workflow(&mut runner, &append_dev(true, true)).unwrap_err();

        assert!(matches!(err, DumpError::Configuration(_)));
        assert!(err.to_string().contains("mutually exclusive"));
        assert!(runner.invoked.is_empty());
    }

    #[test]
    fn test_append_dev_appends_full_and_partial() {
        let mut runner = Recorder::new(None);

        run_workflow(&mut runner, &append_dev(false, false)).unwrap();

        assert_eq!(
            runner.invoked,
            vec![
                Step::DumpDataFull(DumpDataFullOpts {
                    password: Some("pw".to_string()),
                    append: true,
                    ..DumpDataFullOpts::default()
                }),
                Step::DumpDataPartial(DumpDataPartialOpts {
                    password: Some("pw".to_string()),
                    append: true,
                    ..DumpDataPartialOpts::new("2024-02-01", "2024-02-29")
                }),
            ]
        );
    }

    #[test]
    fn test_append_dev_overwrite_full_tables() {
        let steps = append_dev(false, true).steps().unwrap();

        match &steps[0] {
            Step::DumpDataFull(opts) => assert!(!opts.append),
            step => panic!("unexpected step {:?}", step),
        }
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn test_append_dev_exclude_full_tables() {
        let steps = append_dev(true, false).steps().unwrap();

        assert_eq!(
            steps.iter().map(Step::name).collect::<Vec<_>>(),
            vec!["db:dump-data-partial"]
        );
    }

    #[test]
    fn test_with_password() {
        let workflow = Workflow::InitializeDev(InitializeDevOpts {
            start_date: "2024-01-01".to_string(),
            end_date: "2024-01-31".to_string(),
            password: None,
        });
        assert_eq!(workflow.password(), None);

        let workflow = workflow.with_password("prompted".to_string());
        assert_eq!(workflow.password(), Some("prompted"));
        assert!(workflow
            .steps()
            .unwrap()
            .iter()
            .all(|step| match step {
                Step::DumpSchema(opts) => opts.password.as_deref() == Some("prompted"),
                Step::DumpDataFull(opts) => opts.password.as_deref() == Some("prompted"),
                Step::DumpDataPartial(opts) => opts.password.as_deref() == Some("prompted"),
                Step::DumpGrants(opts) => opts.password.as_deref() == Some("prompted"),
            }));
    }

    #[test]
    fn test_empty_sequence_succeeds() {
        let mut runner = Recorder::new(Some(1));

        let report = run_sequence(&mut runner, &[]).unwrap();
        assert!(report.steps.is_empty());
        assert!(runner.invoked.is_empty());
    }
}
