use super::{task::Task, RunReport};
use std::{
    fmt::{self, Display},
    fs, io,
    sync::atomic::{AtomicUsize, Ordering},
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("Failed to remove {path}: {source}")]
    Cleanup {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Other(String),
}

/// Lifecycle events of a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Skipped,
    Started,
    Completed { exit_code: i32 },
    Failed { exit_code: Option<i32>, reason: String },
}

impl TaskEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}

impl Display for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::Started => write!(f, "started"),
            Self::Completed { .. } => write!(f, "completed"),
            Self::Failed { reason, .. } => write!(f, "failed ({reason})"),
        }
    }
}

/// Hooks invoked by the scheduler on task lifecycle events.
/// All hooks are called from the dispatching thread.
pub trait Observer: Send {
    fn run_started(&self, _total: usize) {}

    fn notify(&self, task: &Task, event: &TaskEvent) -> Result<(), ObserverError>;

    fn run_finished(&self, _report: &RunReport) {}
}

/// Removes the output file of a failed task so a partial artifact can't
/// satisfy a future skip condition
#[derive(Debug, Default)]
pub struct FileCleanupObserver;

impl FileCleanupObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for FileCleanupObserver {
    fn notify(&self, task: &Task, event: &TaskEvent) -> Result<(), ObserverError> {
        let TaskEvent::Failed { .. } = event else {
            return Ok(());
        };
        let Some(path) = task.stdout() else {
            return Ok(());
        };

        match fs::remove_file(path) {
            Ok(()) => {
                debug!(task = task.name(), path = ?path, "Removed output of failed task");
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ObserverError::Cleanup {
                path: path.to_string_lossy().into_owned(),
                source,
            }),
        }
    }
}

/// Renders progress of a run through the log
#[derive(Debug, Default)]
pub struct VerboseObserver {
    show_description: bool,
    total: AtomicUsize,
    finished: AtomicUsize,
}

impl VerboseObserver {
    pub fn new(show_description: bool) -> Self {
        Self {
            show_description,
            ..Self::default()
        }
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl Observer for VerboseObserver {
    fn run_started(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.finished.store(0, Ordering::SeqCst);
    }

    fn notify(&self, task: &Task, event: &TaskEvent) -> Result<(), ObserverError> {
        let done = if event.is_terminal() {
            self.finished.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.finished.load(Ordering::SeqCst)
        };
        let total = self.total.load(Ordering::SeqCst);

        match event {
            TaskEvent::Failed { .. } => error!("[{done}/{total}] {event} {}", task.name()),
            _ => info!("[{done}/{total}] {event} {}", task.name()),
        }

        if self.show_description && matches!(event, TaskEvent::Started) {
            let description = task
                .description()
                .map(str::to_string)
                .unwrap_or_else(|| task.command_line());
            info!("  {description}");
        }

        Ok(())
    }

    fn run_finished(&self, report: &RunReport) {
        if report.success() {
            info!("All {} tasks finished successfully", report.results.len());
        } else {
            warn!(
                failed = report.failed().count(),
                not_run = report.not_run.len(),
                "Run finished with failures"
            );
        }
    }
}
