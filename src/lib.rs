//! Dump a production MySQL database into a development sized set of SQL
//! files: schema, full tables, date-filtered tables and rewritten grants.

pub mod cli;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod dump;
pub mod error;
pub mod grants;
pub mod import;
pub mod mysqldump;
pub mod sequence;

pub use error::DumpError;
pub use grants::{rewrite_grant_line, GrantRewriter, RewriteSpec};
pub use sequence::{run_sequence, run_workflow, Step, StepRunner, Workflow};
