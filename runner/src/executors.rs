mod local;

use crate::{config::ConfigErrors, scheduler::SchedulerError};
use desweep_analysis::AnalysisError;
use thiserror::Error;

pub use local::{LocalExecutor, SweepOutcome, SUMMARY_FILE};

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigErrors),
    #[error("Failed to submit task: {0}")]
    Submit(#[from] SchedulerError),
    #[error("Failed to aggregate results: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("Failed to prepare output directory: {0}")]
    OutputDir(#[source] std::io::Error),
}
