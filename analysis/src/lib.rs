//! Post-run analysis of a benchmark sweep: reads the captured output of each
//! run, extracts the measured rate and averages it per (model, thread count).

mod aggregate;
mod rate;
mod table;

pub use aggregate::{collect, AggregatedMetric, Aggregator, Cell, ModelSeries};
pub use rate::{extract_rate, rate_token, RATE_MARKER};
pub use table::{render_table, write_csv};

use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("No line starting with '{marker}' in {path:?}")]
    MetricNotFound { path: PathBuf, marker: String },
    #[error("Unable to parse '{value}' as a rate in {path:?}")]
    InvalidMetric { path: PathBuf, value: String },
    #[error("{model} with {threads} threads has {found} samples, expected {expected}")]
    IncompleteCell {
        model: String,
        threads: usize,
        found: usize,
        expected: usize,
    },
    #[error("Repetitions must be at least 1")]
    NoRepetitions,
    #[error("Failed to write summary: {0}")]
    Write(#[from] io::Error),
}
