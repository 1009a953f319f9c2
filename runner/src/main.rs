use clap::Parser;
use desweep_runner::{config::SweepConfig, executors::LocalExecutor};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Sweep a benchmark over thread counts and workload models
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// benchmark executable
    exe: Option<PathBuf>,
    /// output directory for logs and the summary
    odir: Option<PathBuf>,
    /// YAML config, command line flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// number of runs per grid point
    #[arg(short, long)]
    runs: Option<usize>,
    /// execution time per run in seconds
    #[arg(short, long)]
    exetime: Option<u64>,
    /// step size for the number of threads
    #[arg(short, long)]
    step: Option<usize>,
    /// first thread count, defaults to the step
    #[arg(long)]
    start: Option<usize>,
    /// last thread count, defaults to the capacity
    #[arg(long)]
    stop: Option<usize>,
    /// number of cpus to schedule on, defaults to all
    #[arg(long)]
    capacity: Option<u64>,
    /// arguments for numactl
    #[arg(short, long)]
    numactl: Option<String>,
    /// glob to select models
    #[arg(short, long)]
    models: Option<String>,
    /// value for a `{NAME}` placeholder in the benchmark arguments
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_variable)]
    variables: Vec<(String, String)>,
    /// list models then exit
    #[arg(short, long)]
    list: bool,
    /// show task descriptions
    #[arg(short, long)]
    verbose: bool,
    /// seed for the randomized task order
    #[arg(long)]
    seed: Option<u64>,
    /// run tasks in grid order instead of shuffling them
    #[arg(long)]
    insertion_order: bool,
    /// keep launching runs after a failure
    #[arg(long)]
    tolerant: bool,
}

fn parse_variable(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

impl Cli {
    fn into_config(self) -> Result<SweepConfig, String> {
        let mut config = match (&self.config, &self.exe, &self.odir) {
            (Some(path), _, _) => SweepConfig::from_file(path).map_err(|e| e.to_string())?,
            (None, Some(exe), Some(odir)) => SweepConfig::new(exe, odir),
            (None, _, _) => return Err("either --config or <EXE> <ODIR> are required".to_string()),
        };

        if let Some(exe) = self.exe {
            config.executable = exe;
        }
        if let Some(odir) = self.odir {
            config.output_dir = odir;
        }
        if let Some(runs) = self.runs {
            config.runs = runs;
        }
        if let Some(exetime) = self.exetime {
            config.exetime = exetime;
        }
        if let Some(step) = self.step {
            config.threads.step = step;
        }
        if self.start.is_some() {
            config.threads.start = self.start;
        }
        if self.stop.is_some() {
            config.threads.stop = self.stop;
        }
        if self.capacity.is_some() {
            config.capacity = self.capacity;
        }
        if self.numactl.is_some() {
            config.numactl = self.numactl;
        }
        if let Some(models) = self.models {
            config.models = models;
        }
        config.variables.extend(self.variables);
        if self.seed.is_some() {
            config.order.seed = self.seed;
        }
        if self.insertion_order {
            config.order.randomize = false;
        }
        if self.tolerant {
            config.failure_mode = desweep_runner::FailureMode::TolerantContinue;
        }
        config.verbose |= self.verbose;

        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let list = cli.list;
    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if list {
        return match config.selected_models() {
            Ok(models) => {
                for (name, workload) in models {
                    println!("{name:<10} {workload}");
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    let outcome = LocalExecutor::load(config).and_then(|mut executor| executor.execute());

    match outcome {
        Ok(outcome) if outcome.success() => {
            info!("Sweep finished");
            ExitCode::SUCCESS
        }
        Ok(outcome) => {
            error!(
                failed = outcome.report.failed().count(),
                not_run = outcome.report.not_run.len(),
                "Sweep failed, completed logs are kept for the next attempt"
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
