pub mod template;

#[cfg(test)]
mod sweep_test;

use crate::{
    config::{ConfigErrors, SweepConfig},
    scheduler::{condition::FileModificationCondition, resource::Requirement, task::Task},
};
use desweep_analysis::Cell;
use itertools::{iproduct, Itertools};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    ffi::OsString,
    fmt::{self, Display},
    path::{Path, PathBuf},
};
use template::CommandTemplate;
use thiserror::Error;
use tracing::debug;

/// placeholders filled in for every grid point, user variables can't replace them
pub const PLACEHOLDERS: [&str; 8] = [
    "exetime",
    "events",
    "threads",
    "model",
    "repetition",
    "kind",
    "param",
    "output_dir",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkloadError {
    #[error("sha only supports 1, 256 or 512 bits, got {0}")]
    ShaBits(u32),
    #[error("mem needs a non-zero size")]
    EmptyMemory,
    #[error("bounce needs at least one hop")]
    NoHops,
    #[error("phold remote probability is a percentage, got {0}")]
    RemotePercentage(u32),
}

/// Workload models understood by the benchmark executable
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Workload {
    Empty,
    New,
    Simple,
    Sha { bits: u32 },
    Mem { bytes: u64 },
    Mix { ratio: u64 },
    Bounce { hops: u32 },
    PHold { remote: u32 },
    /// free-form arguments spliced in at `{args}`
    Custom { args: Vec<String> },
}

impl Workload {
    /// value passed as `-n`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::New => "new",
            Self::Simple => "simple",
            Self::Sha { .. } => "sha",
            Self::Mem { .. } => "mem",
            Self::Mix { .. } => "mix",
            Self::Bounce { .. } => "bounce",
            Self::PHold { .. } => "phold",
            Self::Custom { .. } => "custom",
        }
    }

    /// value passed as `-g`
    pub fn param(&self) -> u64 {
        match *self {
            Self::Empty | Self::New | Self::Simple | Self::Custom { .. } => 0,
            Self::Sha { bits } => bits.into(),
            Self::Mem { bytes } => bytes,
            Self::Mix { ratio } => ratio,
            Self::Bounce { hops } => hops.into(),
            Self::PHold { remote } => remote.into(),
        }
    }

    /// arguments spliced in at `{args}`, empty for the builtin kinds
    pub fn args(&self) -> &[String] {
        match self {
            Self::Custom { args } => args,
            _ => &[],
        }
    }

    pub fn validate(&self) -> Result<(), WorkloadError> {
        match *self {
            Self::Sha { bits } if ![1, 256, 512].contains(&bits) => Err(WorkloadError::ShaBits(bits)),
            Self::Mem { bytes: 0 } => Err(WorkloadError::EmptyMemory),
            Self::Bounce { hops: 0 } => Err(WorkloadError::NoHops),
            Self::PHold { remote } if remote > 100 => Err(WorkloadError::RemotePercentage(remote)),
            _ => Ok(()),
        }
    }
}

impl Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom { args } => write!(f, "custom {}", args.iter().join(" ")),
            _ => write!(f, "{} {}", self.kind(), self.param()),
        }
    }
}

/// models shipped with the sweep, selectable by name
pub static BUILTIN_MODELS: Lazy<BTreeMap<&'static str, Workload>> = Lazy::new(|| {
    use Workload::*;

    BTreeMap::from([
        ("empty", Empty),
        ("new", New),
        ("simple", Simple),
        ("sha1", Sha { bits: 1 }),
        ("sha256", Sha { bits: 256 }),
        ("sha512", Sha { bits: 512 }),
        ("mem1m", Mem { bytes: 1_000_000 }),
        ("mem10m", Mem { bytes: 10_000_000 }),
        ("mem100m", Mem { bytes: 100_000_000 }),
        ("mem1g", Mem { bytes: 1_000_000_000 }),
        ("mem10g", Mem { bytes: 10_000_000_000 }),
        ("mix0", Mix { ratio: 0 }),
        ("mix1", Mix { ratio: 1 }),
        ("mix10", Mix { ratio: 10 }),
        ("mix100", Mix { ratio: 100 }),
        ("mix1000", Mix { ratio: 1000 }),
        ("bounce1", Bounce { hops: 1 }),
        ("bounce2", Bounce { hops: 2 }),
        ("bounce3", Bounce { hops: 3 }),
        ("bounce4", Bounce { hops: 4 }),
        ("bounce5", Bounce { hops: 5 }),
        ("phold0", PHold { remote: 0 }),
        ("phold1", PHold { remote: 1 }),
        ("phold5", PHold { remote: 5 }),
        ("phold10", PHold { remote: 10 }),
        ("phold20", PHold { remote: 20 }),
        ("phold40", PHold { remote: 40 }),
        ("phold80", PHold { remote: 80 }),
        ("phold100", PHold { remote: 100 }),
    ])
});

/// Component layouts starting at `components` x `initial_events`, halving the
/// components and doubling the events until the components fit the machine
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LayoutModels {
    #[serde(default = "default_components")]
    pub components: u64,
    #[serde(default = "default_initial_events")]
    pub initial_events: u64,
}

impl Default for LayoutModels {
    fn default() -> Self {
        Self {
            components: default_components(),
            initial_events: default_initial_events(),
        }
    }
}

impl LayoutModels {
    /// models named `{components}x{initial_events}`
    pub fn models(&self, capacity: u64) -> BTreeMap<String, Workload> {
        let mut models = BTreeMap::new();
        let (mut components, mut events) = (self.components, self.initial_events);

        loop {
            models.insert(
                format!("{components}x{events}"),
                Workload::Custom {
                    args: vec![
                        format!("/benchmark/num_components=int={components}"),
                        format!("/benchmark/component/initial_events=int={events}"),
                    ],
                },
            );

            if components <= capacity {
                break;
            }
            components /= 2;
            events = events.saturating_mul(2);
        }

        models
    }
}

fn default_components() -> u64 {
    1024
}

fn default_initial_events() -> u64 {
    1
}

/// One point of the sweep grid
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SweepConfiguration {
    pub model: String,
    pub threads: usize,
    pub repetition: usize,
}

impl SweepConfiguration {
    /// stable task name, also used for the log file
    pub fn name(&self) -> String {
        format!("{}_{}_{}", self.model, self.threads, self.repetition)
    }

    pub fn log_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.log", self.name()))
    }
}

/// The resolved sweep: selected models x thread counts x repetitions
#[derive(Debug, Clone)]
pub struct Sweep {
    pub executable: PathBuf,
    pub output_dir: PathBuf,
    pub models: BTreeMap<String, Workload>,
    pub thread_counts: Vec<usize>,
    pub runs: usize,
    pub exetime: u64,
    pub events: u64,
    pub numactl: Option<String>,
    pub arguments: CommandTemplate,
    pub variables: BTreeMap<String, String>,
}

impl Sweep {
    pub fn plan(config: &SweepConfig) -> Result<Self, ConfigErrors> {
        let models = config.selected_models()?;
        if models.is_empty() {
            return Err(ConfigErrors::NoModels(config.models.clone()));
        }

        let thread_counts = config.thread_counts();
        if thread_counts.is_empty() {
            return Err(ConfigErrors::EmptyThreadRange);
        }

        debug!(
            models = models.len(),
            thread_counts = ?thread_counts,
            runs = config.runs,
            "Planned sweep"
        );

        let sweep = Self {
            executable: config.executable.clone(),
            output_dir: config.output_dir.clone(),
            models,
            thread_counts,
            runs: config.runs,
            exetime: config.exetime,
            events: config.events,
            numactl: config.numactl.clone(),
            arguments: config.arguments.clone(),
            variables: config.variables.clone(),
        };

        // placeholders don't depend on the grid point, rendering one checks them all
        if let Some(configuration) = sweep.configurations().next() {
            sweep.command(&configuration)?;
        }

        Ok(sweep)
    }

    pub fn len(&self) -> usize {
        self.models.len() * self.thread_counts.len() * self.runs
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// all grid points, models in name order
    pub fn configurations(&self) -> impl Iterator<Item = SweepConfiguration> + '_ {
        iproduct!(self.models.keys(), self.thread_counts.iter(), 0..self.runs).map(
            |(model, threads, repetition)| SweepConfiguration {
                model: model.clone(),
                threads: *threads,
                repetition,
            },
        )
    }

    /// value of a placeholder at a grid point
    fn value(
        &self,
        configuration: &SweepConfiguration,
        workload: &Workload,
        name: &str,
    ) -> Option<String> {
        let value = match name {
            "exetime" => self.exetime.to_string(),
            "events" => self.events.to_string(),
            "threads" => configuration.threads.to_string(),
            "model" => configuration.model.clone(),
            "repetition" => configuration.repetition.to_string(),
            "kind" => workload.kind().to_string(),
            "param" => workload.param().to_string(),
            "output_dir" => self.output_dir.to_string_lossy().into_owned(),
            _ => return self.variables.get(name).cloned(),
        };

        Some(value)
    }

    /// program and arguments for a grid point
    pub fn command(
        &self,
        configuration: &SweepConfiguration,
    ) -> Result<(OsString, Vec<OsString>), ConfigErrors> {
        let workload = self
            .models
            .get(&configuration.model)
            .ok_or_else(|| ConfigErrors::UnknownModel(configuration.model.clone()))?;
        let mut args: Vec<OsString> = Vec::new();

        let program = match &self.numactl {
            Some(numactl) => {
                args.extend(numactl.split_whitespace().map(OsString::from));
                args.push(self.executable.clone().into_os_string());
                OsString::from("numactl")
            }
            None => self.executable.clone().into_os_string(),
        };

        let rendered = self.arguments.render(
            |name| self.value(configuration, workload, name),
            workload.args(),
        )?;
        args.extend(rendered.into_iter().map(OsString::from));

        Ok((program, args))
    }

    /// task for a grid point, skipped when its log already exists
    pub fn task(&self, configuration: &SweepConfiguration) -> Result<Task, ConfigErrors> {
        let (program, args) = self.command(configuration)?;
        let log = configuration.log_path(&self.output_dir);

        Ok(Task::process(configuration.name(), program, args)
            .with_requirement(Requirement::cpus(configuration.threads as u64))
            .with_condition(FileModificationCondition::new(Vec::<PathBuf>::new(), [&log]))
            .with_stdout(log))
    }

    pub fn tasks(&self) -> Result<Vec<Task>, ConfigErrors> {
        self.configurations()
            .map(|configuration| self.task(&configuration))
            .collect()
    }

    /// log files to aggregate, one per grid point
    pub fn cells(&self) -> Vec<Cell> {
        self.configurations()
            .map(|configuration| Cell {
                path: configuration.log_path(&self.output_dir),
                model: configuration.model,
                threads: configuration.threads,
            })
            .collect()
    }
}
