use super::task::Task;
use std::{
    fmt::{self, Debug},
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::debug;

/// Decides before scheduling whether a task's effect already exists.
/// Implementations may stat the filesystem but must not modify it.
pub trait SkipCondition: Send + Sync + Debug {
    fn should_skip(&self, task: &Task) -> bool;
}

/// Skips a task when all of its outputs exist and are newer than all of its
/// inputs. A condition without outputs never skips.
#[derive(Debug, Clone, Default)]
pub struct FileModificationCondition {
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

impl FileModificationCondition {
    pub fn new<I, O>(inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
        O: IntoIterator,
        O::Item: Into<PathBuf>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    match fs::metadata(path).and_then(|metadata| metadata.modified()) {
        Ok(time) => Some(time),
        Err(error) => {
            debug!(path = ?path, error = %error, "Unable to stat file");
            None
        }
    }
}

impl SkipCondition for FileModificationCondition {
    fn should_skip(&self, task: &Task) -> bool {
        if self.outputs.is_empty() {
            return false;
        }

        // oldest output, a missing output means the task has to run
        let mut oldest_output: Option<SystemTime> = None;
        for output in self.outputs.iter() {
            match modified(output) {
                Some(time) => {
                    oldest_output = Some(oldest_output.map_or(time, |oldest| oldest.min(time)))
                }
                None => return false,
            }
        }

        let mut newest_input: Option<SystemTime> = None;
        for input in self.inputs.iter() {
            match modified(input) {
                Some(time) => {
                    newest_input = Some(newest_input.map_or(time, |newest| newest.max(time)))
                }
                None => {
                    debug!(task = task.name(), input = ?input, "Input missing, not skipping");
                    return false;
                }
            }
        }

        match (oldest_output, newest_input) {
            (Some(_), None) => true,
            (Some(output), Some(input)) => output > input,
            (None, _) => false,
        }
    }
}

/// Adapter for ad-hoc predicates
pub struct ConditionFn<F>(pub F);

impl<F> Debug for ConditionFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConditionFn")
    }
}

impl<F> SkipCondition for ConditionFn<F>
where
    F: Fn(&Task) -> bool + Send + Sync,
{
    fn should_skip(&self, task: &Task) -> bool {
        (self.0)(task)
    }
}
