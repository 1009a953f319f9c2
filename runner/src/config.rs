#[cfg(test)]
mod config_test;

use crate::{
    scheduler::{resource::ResourcePool, FailureMode, SchedulerConfig, TaskOrder},
    sweep::{
        template::{CommandTemplate, TemplateError},
        LayoutModels, Workload, WorkloadError, BUILTIN_MODELS, PLACEHOLDERS,
    },
};
use globset::GlobBuilder;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, warn};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Model glob was invalid")]
    InvalidGlob(#[from] globset::Error),
    #[error("Model {model} is invalid: {source}")]
    InvalidWorkload {
        model: String,
        #[source]
        source: WorkloadError,
    },
    #[error("No model matches {0}")]
    NoModels(String),
    #[error("Model {0} is not part of the sweep")]
    UnknownModel(String),
    #[error("Invalid argument template: {0}")]
    Template(#[from] TemplateError),
    #[error("Thread range selects no thread counts")]
    EmptyThreadRange,
    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[from] Error),
    #[error("Failed to parse config")]
    Parse(#[from] serde_yaml::Error),
    #[error("Preflight checks failed")]
    Preflight,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    // benchmark executable, invoked once per grid point
    pub executable: PathBuf,
    // directory for the per-run logs and the summary table
    #[serde(alias = "odir")]
    pub output_dir: PathBuf,
    // size of the cpus pool, defaults to the number of cpus of this machine
    #[serde(default)]
    pub capacity: Option<u64>,
    #[serde(default)]
    pub threads: ThreadRange,
    // repetitions per (model, thread count)
    #[serde(default = "default_runs")]
    pub runs: usize,
    // execution time per run in seconds
    #[serde(default = "default_exetime")]
    pub exetime: u64,
    #[serde(default = "default_events")]
    pub events: u64,
    // arguments for numactl, the benchmark is wrapped when set
    #[serde(default)]
    pub numactl: Option<String>,
    // glob selecting models by name
    #[serde(default = "default_models")]
    pub models: String,
    // additional models, these replace builtin models of the same name
    #[serde(default)]
    pub extra_models: BTreeMap<String, Workload>,
    // generated `{components}x{events}` models, added to the builtin ones
    #[serde(default)]
    pub layouts: Option<LayoutModels>,
    // benchmark arguments with `{placeholder}`s, defaults to `-e -c -t -n -g`
    #[serde(default)]
    pub arguments: CommandTemplate,
    // user defined placeholders, e.g. a topology
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default = "default_failure_mode")]
    pub failure_mode: FailureMode,
    #[serde(default)]
    pub order: OrderConfig,
    // prefix of the output line carrying the measured rate
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default)]
    pub verbose: bool,
}

/// thread counts `start, start + step, ...` up to `stop`
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ThreadRange {
    // defaults to `step`
    pub start: Option<usize>,
    // defaults to the pool capacity
    pub stop: Option<usize>,
    #[serde(default = "default_step")]
    pub step: usize,
}

impl Default for ThreadRange {
    fn default() -> Self {
        Self {
            start: None,
            stop: None,
            step: default_step(),
        }
    }
}

impl ThreadRange {
    pub fn counts(&self, capacity: usize) -> Vec<usize> {
        if self.step == 0 {
            return Vec::new();
        }

        let start = self.start.unwrap_or(self.step).max(1);
        let stop = self.stop.unwrap_or(capacity);

        (start..=stop).step_by(self.step).collect()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OrderConfig {
    // shuffle tasks so equally shaped runs don't execute in lockstep
    #[serde(default = "default_randomize")]
    pub randomize: bool,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            randomize: default_randomize(),
            seed: None,
        }
    }
}

impl SweepConfig {
    pub fn new(executable: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            output_dir: output_dir.into(),
            capacity: None,
            threads: ThreadRange::default(),
            runs: default_runs(),
            exetime: default_exetime(),
            events: default_events(),
            numactl: None,
            models: default_models(),
            extra_models: BTreeMap::new(),
            layouts: None,
            arguments: CommandTemplate::default(),
            variables: BTreeMap::new(),
            failure_mode: default_failure_mode(),
            order: OrderConfig::default(),
            marker: default_marker(),
            verbose: false,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path).map_err(|_| ConfigErrors::FileNotFound(path.to_path_buf()))?;

        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity.unwrap_or(num_cpus::get() as u64)
    }

    pub fn thread_counts(&self) -> Vec<usize> {
        self.threads.counts(self.capacity() as usize)
    }

    pub fn pool(&self) -> ResourcePool {
        ResourcePool::cpus(self.capacity())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let order = if self.order.randomize {
            TaskOrder::Randomized {
                seed: self.order.seed,
            }
        } else {
            TaskOrder::Insertion
        };

        SchedulerConfig::new(self.failure_mode, order)
    }

    /// builtin, layout and extra models whose name matches the `models` glob
    pub fn selected_models(&self) -> Result<BTreeMap<String, Workload>, ConfigErrors> {
        let matcher = GlobBuilder::new(&self.models).build()?.compile_matcher();

        let mut models: BTreeMap<String, Workload> = BUILTIN_MODELS
            .iter()
            .map(|(name, workload)| (name.to_string(), workload.clone()))
            .collect();
        if let Some(layouts) = &self.layouts {
            models.extend(layouts.models(self.capacity()));
        }
        models.extend(self.extra_models.clone());
        models.retain(|name, _| matcher.is_match(name));

        for (model, workload) in models.iter() {
            workload
                .validate()
                .map_err(|source| ConfigErrors::InvalidWorkload {
                    model: model.clone(),
                    source,
                })?;
        }

        Ok(models)
    }

    /// Report every problem with the config, returns true if any was found
    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        match check_executable(&self.executable) {
            Ok(true) => {}
            Ok(false) => {
                error!(
                    "Benchmark {} is not executable",
                    self.executable.to_string_lossy()
                );
                contains_error = true;
            }
            Err(e) => {
                error!(
                    "Failed to find executable at {}: {e}",
                    self.executable.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if self.runs == 0 {
            error!("runs cannot be 0, every grid point needs at least one run");
            contains_error = true;
        }

        if self.capacity() == 0 {
            error!("capacity cannot be 0, no task could ever run");
            contains_error = true;
        }

        if self.threads.step == 0 {
            error!("threads.step cannot be 0");
            contains_error = true;
        } else {
            let counts = self.thread_counts();

            if counts.is_empty() {
                error!(
                    "threads {:?} selects no thread counts with a capacity of {}",
                    self.threads,
                    self.capacity()
                );
                contains_error = true;
            }

            for threads in counts.iter().filter(|threads| **threads as u64 > self.capacity()) {
                error!(
                    "{threads} threads exceed the capacity of {}, these runs would be rejected",
                    self.capacity()
                );
                contains_error = true;
            }
        }

        match self.selected_models() {
            Ok(models) if models.is_empty() => {
                error!("models '{}' does not select any model", self.models);
                contains_error = true;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to select models: {e}");
                contains_error = true;
            }
        }

        match self.arguments.placeholders() {
            Ok(names) => {
                for name in names {
                    if !PLACEHOLDERS.contains(&name) && !self.variables.contains_key(name) {
                        error!("arguments use {{{name}}} which is neither builtin nor in variables");
                        contains_error = true;
                    }
                }
            }
            Err(e) => {
                error!("Invalid arguments: {e}");
                contains_error = true;
            }
        }

        for name in self.variables.keys() {
            if PLACEHOLDERS.contains(&name.as_str()) {
                warn!("variables.{name} is shadowed by the builtin placeholder of the same name");
            }
        }

        for name in self.extra_models.keys() {
            if BUILTIN_MODELS.contains_key(name.as_str()) {
                warn!("extra_models.{name} replaces the builtin model of the same name");
            }
        }

        if self.output_dir.is_file() {
            error!(
                "output_dir {} is a file",
                self.output_dir.to_string_lossy()
            );
            contains_error = true;
        }

        contains_error
    }
}

fn default_runs() -> usize {
    1
}

fn default_exetime() -> u64 {
    10
}

fn default_events() -> u64 {
    10000
}

fn default_step() -> usize {
    4
}

fn default_models() -> String {
    "*".to_string()
}

// every sweep of the benchmark stops at the first failure unless told otherwise
fn default_failure_mode() -> FailureMode {
    FailureMode::AggressiveFail
}

fn default_randomize() -> bool {
    true
}

fn default_marker() -> String {
    desweep_analysis::RATE_MARKER.to_string()
}
