use thiserror::Error;

/// Failures a caller may need to tell apart.
///
/// Task functions return `anyhow::Result`, these values travel inside it and
/// can be recovered with `downcast_ref::<DumpError>()`.
#[derive(Debug, Error)]
pub enum DumpError {
    /// Missing or contradictory input, detected before any work is done.
    #[error("{0}")]
    Configuration(String),

    /// `SHOW GRANTS` returned nothing for the requested principal.
    #[error("No GRANTs found for {user}@{host}")]
    NoData { user: String, host: String },

    /// A step of a workflow failed, later steps were not run.
    #[error("Command {command} failed (step {step} of {total})")]
    SubcommandFailure {
        step: usize,
        total: usize,
        command: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DumpError {
    pub fn configuration(message: impl Into<String>) -> Self {
        DumpError::Configuration(message.into())
    }
}
