use super::{
    condition::SkipCondition,
    resource::{Requirement, ResourceError},
};
use itertools::Itertools;
use std::{
    ffi::OsString,
    fmt::{self, Debug},
    fs::File,
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::Arc,
    time::Instant,
};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Failed to launch {program}: {source}")]
    ProcessLaunchError {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to open output file {path:?}: {source}")]
    OutputSink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Resources unavailable: {0}")]
    Resource(#[from] ResourceError),
    #[error("Action failed: {0}")]
    Action(#[from] io::Error),
}

/// Terminal state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Completed,
    Failed,
    Skipped,
}

/// Outcome of a single task in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub task_name: String,
    pub status: TaskStatus,
    pub exit_code: Option<i32>,
}

pub type ActionFn = dyn Fn() -> io::Result<i32> + Send + Sync;

/// What a task does once it is launched
#[derive(Clone)]
pub enum TaskAction {
    /// spawn an external process, stdout goes to the task's sink if declared
    Process { program: OsString, args: Vec<OsString> },
    /// in-process action returning an exit code
    Closure(Arc<ActionFn>),
}

impl Debug for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process { program, args } => f
                .debug_struct("Process")
                .field("program", program)
                .field("args", args)
                .finish(),
            Self::Closure(_) => f.write_str("Closure"),
        }
    }
}

/// A named unit of work with a resource requirement
#[derive(Debug)]
pub struct Task {
    name: String,
    requirement: Requirement,
    action: TaskAction,
    condition: Option<Box<dyn SkipCondition>>,
    stdout: Option<PathBuf>,
    description: Option<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, action: TaskAction) -> Self {
        Self {
            name: name.into(),
            requirement: Requirement::new(),
            action,
            condition: None,
            stdout: None,
            description: None,
        }
    }

    pub fn process<P, I, A>(name: impl Into<String>, program: P, args: I) -> Self
    where
        P: Into<OsString>,
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self::new(
            name,
            TaskAction::Process {
                program: program.into(),
                args: args.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn closure<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> io::Result<i32> + Send + Sync + 'static,
    {
        Self::new(name, TaskAction::Closure(Arc::new(action)))
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirement = requirement;
        self
    }

    pub fn with_stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn with_condition<C: SkipCondition + 'static>(mut self, condition: C) -> Self {
        self.condition = Some(Box::new(condition));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn stdout(&self) -> Option<&Path> {
        self.stdout.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn should_skip(&self) -> bool {
        self.condition
            .as_ref()
            .is_some_and(|condition| condition.should_skip(self))
    }

    /// human readable rendering of what the task runs
    pub fn command_line(&self) -> String {
        let mut line = match &self.action {
            TaskAction::Process { program, args } => std::iter::once(program)
                .chain(args.iter())
                .map(|arg| arg.to_string_lossy())
                .join(" "),
            TaskAction::Closure(_) => format!("<closure {}>", self.name),
        };

        if let Some(path) = &self.stdout {
            line.push_str(&format!(" > {}", path.to_string_lossy()));
        }

        line
    }

    /// Run the action on the calling thread until it finishes.
    /// Returns the exit code, `None` if the process was terminated by a signal.
    pub fn execute(&self) -> Result<Option<i32>, TaskError> {
        let start = Instant::now();

        let code = match &self.action {
            TaskAction::Closure(action) => Some(action()?),
            TaskAction::Process { program, args } => {
                let stdout = match &self.stdout {
                    Some(path) => Stdio::from(File::create(path).map_err(|source| {
                        TaskError::OutputSink {
                            path: path.clone(),
                            source,
                        }
                    })?),
                    None => Stdio::null(),
                };

                trace!(task = %self.name, command = %self.command_line(), "Spawning");

                let status = Command::new(program)
                    .args(args)
                    .stdin(Stdio::null())
                    .stdout(stdout)
                    .stderr(Stdio::inherit())
                    .status()
                    .map_err(|source| TaskError::ProcessLaunchError {
                        program: program.to_string_lossy().into_owned(),
                        source,
                    })?;

                status.code()
            }
        };

        debug!(
            task = %self.name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            code = ?code,
            "Task finished"
        );

        Ok(code)
    }
}
