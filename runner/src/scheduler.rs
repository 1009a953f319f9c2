pub mod condition;
pub mod observer;
pub mod resource;
pub mod task;


use observer::{Observer, TaskEvent};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use resource::{ResourceError, ResourcePool};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashSet, VecDeque},
    iter,
    panic::{self, AssertUnwindSafe},
    sync::mpsc,
    thread,
};
use task::{RunResult, Task, TaskError, TaskStatus};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Task {0} was submitted more than once")]
    DuplicateTaskName(String),
    #[error("Task {task} was rejected: {source}")]
    Rejected {
        task: String,
        #[source]
        source: ResourceError,
    },
}

/// What happens to the rest of a run once a task failed
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    /// stop launching new tasks, let running ones finish
    AggressiveFail,
    /// keep launching everything, report the failure at the end
    TolerantContinue,
}

/// Traversal order of the submitted tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOrder {
    Insertion,
    /// shuffled with a seeded generator, a seed is drawn when none is given
    Randomized { seed: Option<u64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub failure_mode: FailureMode,
    pub order: TaskOrder,
}

impl SchedulerConfig {
    pub fn new(failure_mode: FailureMode, order: TaskOrder) -> Self {
        Self {
            failure_mode,
            order,
        }
    }
}

/// Outcome of `Scheduler::run_report`
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// one result per task that was skipped or reached a terminal state, in traversal order
    pub results: Vec<RunResult>,
    /// tasks never launched because the run was aborted
    pub not_run: Vec<String>,
    pub aborted: bool,
    /// seed used for a randomized order
    pub seed: Option<u64>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        !self.aborted && self.not_run.is_empty() && self.failed().next().is_none()
    }

    pub fn failed(&self) -> impl Iterator<Item = &RunResult> {
        self.results
            .iter()
            .filter(|result| result.status == TaskStatus::Failed)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.results
            .iter()
            .filter(|result| result.status == status)
            .count()
    }

    /// number of tasks whose action was started
    pub fn launched(&self) -> usize {
        self.results.len() - self.count(TaskStatus::Skipped)
    }

    pub fn get(&self, task_name: &str) -> Option<&RunResult> {
        self.results
            .iter()
            .find(|result| result.task_name == task_name)
    }
}

type Outcome = thread::Result<Result<Option<i32>, TaskError>>;

struct Completion {
    index: usize,
    outcome: Outcome,
}

/// Runs independent tasks concurrently within the budget of a resource pool
pub struct Scheduler {
    pool: ResourcePool,
    config: SchedulerConfig,
    tasks: Vec<Task>,
    names: HashSet<String>,
    observers: Vec<Box<dyn Observer>>,
}

impl Scheduler {
    pub fn new(pool: ResourcePool, config: SchedulerConfig) -> Self {
        Self {
            pool,
            config,
            tasks: Vec::new(),
            names: HashSet::new(),
            observers: Vec::new(),
        }
    }

    pub fn add_observer<O: Observer + 'static>(&mut self, observer: O) {
        self.observers.push(Box::new(observer));
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Queue a task for the next run.
    /// Tasks that can never be satisfied by the pool are rejected here.
    pub fn submit(&mut self, task: Task) -> Result<(), SchedulerError> {
        if self.names.contains(task.name()) {
            return Err(SchedulerError::DuplicateTaskName(task.name().to_string()));
        }

        self.pool
            .check(task.requirement())
            .map_err(|source| SchedulerError::Rejected {
                task: task.name().to_string(),
                source,
            })?;

        self.names.insert(task.name().to_string());
        self.tasks.push(task);

        Ok(())
    }

    /// Run all submitted tasks, true if none failed
    pub fn run(&mut self) -> bool {
        self.run_report().success()
    }

    /// Run all submitted tasks to a terminal state, respecting the failure mode.
    /// The submitted tasks are consumed.
    #[instrument(skip(self), level = "info")]
    pub fn run_report(&mut self) -> RunReport {
        let mut tasks = std::mem::take(&mut self.tasks);
        self.names.clear();

        let mut report = RunReport {
            seed: self.arrange(&mut tasks),
            ..RunReport::default()
        };

        for observer in self.observers.iter() {
            observer.run_started(tasks.len());
        }

        let mut finished: Vec<(usize, RunResult)> = Vec::with_capacity(tasks.len());
        let mut queue = VecDeque::with_capacity(tasks.len());

        for (index, task) in tasks.iter().enumerate() {
            if task.should_skip() {
                self.emit(task, &TaskEvent::Skipped);
                finished.push((
                    index,
                    RunResult {
                        task_name: task.name().to_string(),
                        status: TaskStatus::Skipped,
                        exit_code: None,
                    },
                ));
            } else {
                queue.push_back(index);
            }
        }

        debug!(
            queued = queue.len(),
            skipped = finished.len(),
            "Finished skip checks"
        );

        let (sender, receiver) = mpsc::channel::<Completion>();
        let tasks = &tasks;

        thread::scope(|scope| {
            let mut running = 0usize;

            loop {
                // first fit in traversal order
                let mut position = 0;
                while !report.aborted && position < queue.len() {
                    let index = queue[position];
                    let task = &tasks[index];

                    let reservation = match self.pool.try_acquire(task.requirement()) {
                        Ok(Some(reservation)) => reservation,
                        Ok(None) => {
                            position += 1;
                            continue;
                        }
                        Err(error) => {
                            error!(task = task.name(), error = %error, "Resource request can't be satisfied");
                            queue.remove(position);
                            let result = self.conclude(task, Ok(Err(TaskError::Resource(error))));
                            report.aborted |= self.aborts(&result);
                            finished.push((index, result));
                            continue;
                        }
                    };

                    queue.remove(position);
                    self.emit(task, &TaskEvent::Started);

                    let sender = sender.clone();
                    let spawned = thread::Builder::new()
                        .name(task.name().to_string())
                        .spawn_scoped(scope, move || {
                            let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.execute()));
                            // resources are free before anyone hears about the exit
                            drop(reservation);
                            // the receiver lives until every worker has reported
                            let _ = sender.send(Completion { index, outcome });
                        });

                    match spawned {
                        Ok(_) => running += 1,
                        Err(error) => {
                            let result = self.conclude(task, Ok(Err(TaskError::Action(error))));
                            report.aborted |= self.aborts(&result);
                            finished.push((index, result));
                        }
                    }
                }

                if running == 0 {
                    if report.aborted || queue.is_empty() {
                        break;
                    }

                    // the pool is held by someone outside this run, wait for the head of the queue
                    let Some(&index) = queue.front() else {
                        break;
                    };
                    match self.pool.acquire(tasks[index].requirement()) {
                        Ok(reservation) => {
                            self.pool.release(reservation);
                            continue;
                        }
                        Err(error) => {
                            error!(error = %error, "Unable to wait for resources");
                            break;
                        }
                    }
                }

                let Ok(completion) = receiver.recv() else {
                    break;
                };

                // every completion already reported is concluded before anything new launches
                for completion in iter::once(completion).chain(receiver.try_iter()) {
                    running -= 1;

                    let result = self.conclude(&tasks[completion.index], completion.outcome);
                    if self.aborts(&result) && !report.aborted {
                        warn!(
                            task = %result.task_name,
                            "Task failed, no further tasks will be launched"
                        );
                        report.aborted = true;
                    }
                    finished.push((completion.index, result));
                }
            }
        });

        finished.sort_by_key(|(index, _)| *index);
        report.results = finished.into_iter().map(|(_, result)| result).collect();
        report.not_run = queue
            .into_iter()
            .map(|index| tasks[index].name().to_string())
            .collect();

        info!(
            completed = report.count(TaskStatus::Completed),
            failed = report.count(TaskStatus::Failed),
            skipped = report.count(TaskStatus::Skipped),
            not_run = report.not_run.len(),
            "Run finished"
        );

        for observer in self.observers.iter() {
            observer.run_finished(&report);
        }

        report
    }

    fn arrange(&self, tasks: &mut [Task]) -> Option<u64> {
        match self.config.order {
            TaskOrder::Insertion => None,
            TaskOrder::Randomized { seed } => {
                let seed = seed.unwrap_or_else(rand::random);
                info!(seed, "Randomizing task order");
                tasks.shuffle(&mut StdRng::seed_from_u64(seed));

                Some(seed)
            }
        }
    }

    fn aborts(&self, result: &RunResult) -> bool {
        result.status == TaskStatus::Failed && self.config.failure_mode == FailureMode::AggressiveFail
    }

    /// classify an outcome and let the observers know about it
    fn conclude(&self, task: &Task, outcome: Outcome) -> RunResult {
        let (status, exit_code, event) = match outcome {
            Ok(Ok(Some(0))) => (
                TaskStatus::Completed,
                Some(0),
                TaskEvent::Completed { exit_code: 0 },
            ),
            Ok(Ok(Some(code))) => (
                TaskStatus::Failed,
                Some(code),
                TaskEvent::Failed {
                    exit_code: Some(code),
                    reason: format!("exit code {code}"),
                },
            ),
            Ok(Ok(None)) => (
                TaskStatus::Failed,
                None,
                TaskEvent::Failed {
                    exit_code: None,
                    reason: "terminated by signal".to_string(),
                },
            ),
            Ok(Err(error)) => (
                TaskStatus::Failed,
                None,
                TaskEvent::Failed {
                    exit_code: None,
                    reason: error.to_string(),
                },
            ),
            Err(_) => (
                TaskStatus::Failed,
                None,
                TaskEvent::Failed {
                    exit_code: None,
                    reason: "action panicked".to_string(),
                },
            ),
        };

        self.emit(task, &event);

        RunResult {
            task_name: task.name().to_string(),
            status,
            exit_code,
        }
    }

    /// observer failures never reach the run
    fn emit(&self, task: &Task, event: &TaskEvent) {
        for observer in self.observers.iter() {
            match panic::catch_unwind(AssertUnwindSafe(|| observer.notify(task, event))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(task = task.name(), event = %event, error = %error, "Observer failed")
                }
                Err(_) => error!(task = task.name(), event = %event, "Observer panicked"),
            }
        }
    }
}
