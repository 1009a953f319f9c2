use super::ExecutorError;
use crate::{
    config::{ConfigErrors, SweepConfig},
    scheduler::{
        observer::{FileCleanupObserver, VerboseObserver},
        RunReport, Scheduler,
    },
    sweep::Sweep,
};
use desweep_analysis::{collect, render_table, write_csv, AggregatedMetric, AnalysisError};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
};
use tracing::{debug, error, info, instrument};

/// name of the summary table inside the output directory
pub const SUMMARY_FILE: &str = "throughput.csv";

/// Result of a sweep, the metric is only present if every run succeeded
#[derive(Debug)]
pub struct SweepOutcome {
    pub report: RunReport,
    pub metric: Option<AggregatedMetric>,
    pub summary: Option<PathBuf>,
}

impl SweepOutcome {
    pub fn success(&self) -> bool {
        self.report.success() && self.metric.is_some()
    }
}

/// Executor that runs the whole sweep on this machine
#[derive(Debug)]
pub struct LocalExecutor {
    config: SweepConfig,
    sweep: Sweep,
}

impl LocalExecutor {
    /// check the config and plan the sweep
    pub fn load(config: SweepConfig) -> Result<Self, ExecutorError> {
        if config.preflight_checks() {
            return Err(ConfigErrors::Preflight.into());
        }

        let sweep = Sweep::plan(&config)?;

        Ok(Self { config, sweep })
    }

    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    /// run every grid point, then aggregate the logs into the summary table
    #[instrument(skip(self), level = "info")]
    pub fn execute(&mut self) -> Result<SweepOutcome, ExecutorError> {
        fs::create_dir_all(&self.config.output_dir).map_err(ExecutorError::OutputDir)?;

        let mut scheduler = Scheduler::new(self.config.pool(), self.config.scheduler_config());
        scheduler.add_observer(FileCleanupObserver::new());
        scheduler.add_observer(VerboseObserver::new(self.config.verbose));

        for task in self.sweep.tasks()? {
            scheduler.submit(task)?;
        }

        debug!(
            tasks = scheduler.len(),
            capacity = self.config.capacity(),
            "Submitted sweep"
        );

        let report = scheduler.run_report();
        if !report.success() {
            for failed in report.failed() {
                error!(task = %failed.task_name, exit_code = ?failed.exit_code, "Run failed");
            }

            return Ok(SweepOutcome {
                report,
                metric: None,
                summary: None,
            });
        }

        let metric = collect(&self.sweep.cells(), self.sweep.runs, &self.config.marker)?;

        let summary = self.config.output_dir.join(SUMMARY_FILE);
        let file = File::create(&summary).map_err(|source| AnalysisError::Io {
            path: summary.clone(),
            source,
        })?;
        write_csv(&metric, BufWriter::new(file))?;

        info!("Summary written to {}", summary.to_string_lossy());
        info!("Events per second\n{}", render_table(&metric));

        Ok(SweepOutcome {
            report,
            metric: Some(metric),
            summary: Some(summary),
        })
    }
}
