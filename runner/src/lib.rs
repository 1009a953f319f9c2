pub mod config;
pub mod executors;
pub mod scheduler;
pub mod sweep;

pub use config::{ConfigErrors, SweepConfig};
pub use executors::{ExecutorError, LocalExecutor, SweepOutcome};
pub use scheduler::{
    condition::{ConditionFn, FileModificationCondition, SkipCondition},
    observer::{FileCleanupObserver, Observer, ObserverError, TaskEvent, VerboseObserver},
    resource::{Requirement, Resource, ResourceError, ResourcePool},
    task::{RunResult, Task, TaskAction, TaskStatus},
    FailureMode, RunReport, Scheduler, SchedulerConfig, SchedulerError, TaskOrder,
};
pub use sweep::{
    template::{CommandTemplate, TemplateError},
    LayoutModels, Sweep, SweepConfiguration, Workload,
};
