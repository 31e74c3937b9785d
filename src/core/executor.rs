use crate::config::Timing;
use crate::core::flow::TaskFlow;
use crate::core::params::TaskRef;
use crate::core::registry::{TaskDefinition, TaskRegistry};
use crate::core::task_config::TaskConfig;
use crate::core::telemetry::{Telemetry, TraceEntry};
use crate::core::{Params, TaskStatus};
use crate::error::TaskError;
use crate::perception::PerceptionActuator;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// How deep pre/post tasks and nested task calls may go.
pub const MAX_NESTING: usize = 16;

const WAIT_SLICE: Duration = Duration::from_millis(20);

/// Cooperative cancellation flag shared by a worker and the tasks it runs.
#[derive(Debug, Clone)]
pub struct RunningFlag(Arc<AtomicBool>);

impl RunningFlag {
    pub fn new(running: bool) -> Self {
        RunningFlag(Arc::new(AtomicBool::new(running)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn start(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Sleeps for `duration` unless the flag is cleared first.
    /// Returns whether the flag is still set.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if !self.is_running() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(WAIT_SLICE.min(deadline - now));
        }
    }
}

impl Default for RunningFlag {
    fn default() -> Self {
        RunningFlag::new(true)
    }
}

/// Execution context of one target.
///
/// Resolves task names in the shared registry, runs pre-tasks, the behavior and
/// post-tasks, and runs whole task configurations with fail-stop semantics.
/// All perception goes through the bound [`PerceptionActuator`]; an executor
/// without one can still run tasks that never look at the screen.
///
/// An executor is driven by one thread at a time, normally its worker. The nesting
/// depth and the current run id live on the executor, so concurrent callers of
/// [`execute_task`](Self::execute_task) on a shared executor would see each other's.
pub struct TaskExecutor {
    target: String,
    registry: Arc<TaskRegistry>,
    actuator: Option<PerceptionActuator>,
    running: RunningFlag,
    timing: Timing,
    telemetry: Option<Arc<dyn Telemetry>>,
    depth: AtomicUsize,
    run_id: Mutex<Option<Uuid>>,
}

impl TaskExecutor {
    pub fn new(target: impl Into<String>, registry: Arc<TaskRegistry>) -> Self {
        TaskExecutor {
            target: target.into(),
            registry,
            actuator: None,
            running: RunningFlag::default(),
            timing: Timing::default(),
            telemetry: None,
            depth: AtomicUsize::new(0),
            run_id: Mutex::new(None),
        }
    }

    pub fn with_actuator(mut self, actuator: PerceptionActuator) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_running(mut self, running: RunningFlag) -> Self {
        self.running = running;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn running(&self) -> &RunningFlag {
        &self.running
    }

    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    /// The bound actuator, or [`TaskError::NoActuator`] for a dry context.
    pub fn actuator(&self) -> Result<&PerceptionActuator, TaskError> {
        self.actuator
            .as_ref()
            .ok_or_else(|| TaskError::NoActuator(self.target.clone()))
    }

    /// Whether the bound target is running. A context without actuator always is.
    pub fn is_target_reachable(&self) -> bool {
        self.actuator.as_ref().is_none_or(|a| a.is_reachable())
    }

    /// A flow labelled with this target and using its step backoff.
    pub fn flow<'a>(&self) -> TaskFlow<'a> {
        TaskFlow::new(self.target.clone()).backoff(self.timing.step_backoff())
    }

    /// Runs the task called `name`.
    ///
    /// Unknown names are a configuration error reported as [`TaskStatus::Failed`].
    /// Pre-tasks and post-tasks always run and never change the result; errors and
    /// panics of the behavior fail just this task.
    pub fn execute_task(&self, name: &str, params: &Params) -> TaskStatus {
        let started = Instant::now();
        let depth = DepthGuard::enter(&self.depth);
        if depth.level > MAX_NESTING {
            log::error!(
                "[{}] task `{}` nested deeper than {} levels, refusing to run it",
                self.target,
                name,
                MAX_NESTING
            );
            self.record(name, TaskStatus::Failed, started);
            return TaskStatus::Failed;
        }

        let Some(definition) = self.registry.resolve(name) else {
            log::error!("[{}] task `{}` is not registered", self.target, name);
            self.record(name, TaskStatus::Failed, started);
            return TaskStatus::Failed;
        };

        let params = definition.resolve_params(params, &self.target);
        log::info!("[{}] running task `{}` {:?}", self.target, name, params);

        self.run_hooks("pre-task", name, definition.pre_tasks());
        let status = self.invoke(&definition, &params);
        if status.is_success() && !self.timing.task_pacing().is_zero() {
            self.running.wait(self.timing.task_pacing());
        }
        self.run_hooks("post-task", name, definition.post_tasks());

        self.record(name, status, started);
        status
    }

    /// Runs every task of `config` in order, stopping at the first failure.
    ///
    /// Never panics or returns an error; the returned status is only a convenience
    /// for callers that want it, the log carries the details.
    pub fn execute_task_config(&self, config: &TaskConfig) -> TaskStatus {
        let run_id = Uuid::new_v4();
        *self.current_run() = Some(run_id);
        log::info!(
            "[{}] starting config `{}` ({} task(s), run {})",
            self.target,
            config.name,
            config.len(),
            run_id
        );

        let mut status = TaskStatus::Success;
        for task in &config.tasks {
            if !self.execute_task(&task.name, &task.params).is_success() {
                log::error!(
                    "[{}] task {} failed, stopping config `{}`",
                    self.target,
                    task.name,
                    config.name
                );
                status = TaskStatus::Failed;
                break;
            }
        }

        if status.is_success() {
            log::info!("[{}] config `{}` completed", self.target, config.name);
        }
        *self.current_run() = None;
        if let Some(telemetry) = &self.telemetry {
            telemetry.flush();
        }
        status
    }

    fn invoke(&self, definition: &TaskDefinition, params: &Params) -> TaskStatus {
        let name = definition.name();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            definition.behavior().run(self, params)
        }));

        match outcome {
            Ok(Ok(TaskStatus::Success)) => {
                log::info!("[{}] task `{}` succeeded", self.target, name);
                TaskStatus::Success
            }
            Ok(Ok(status)) => {
                log::warn!("[{}] task `{}` returned {}", self.target, name, status);
                TaskStatus::Failed
            }
            Ok(Err(e)) => {
                log::error!("[{}] task `{}` failed: {}", self.target, name, e);
                TaskStatus::Failed
            }
            Err(payload) => {
                log::error!(
                    "[{}] task `{}` panicked: {}",
                    self.target,
                    name,
                    panic_message(payload.as_ref())
                );
                TaskStatus::Failed
            }
        }
    }

    fn run_hooks(&self, kind: &str, owner: &str, hooks: &[TaskRef]) {
        for hook in hooks {
            if !self.execute_task(hook.name(), &hook.params()).is_success() {
                log::warn!(
                    "[{}] {} `{}` of `{}` failed, continuing",
                    self.target,
                    kind,
                    hook.name(),
                    owner
                );
            }
        }
    }

    fn record(&self, task: &str, status: TaskStatus, started: Instant) {
        let Some(telemetry) = &self.telemetry else {
            return;
        };
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        telemetry.record(TraceEntry {
            timestamp,
            run_id: *self.current_run(),
            target: self.target.clone(),
            task: task.to_string(),
            status,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        });
    }

    fn current_run(&self) -> std::sync::MutexGuard<'_, Option<Uuid>> {
        self.run_id.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct DepthGuard<'a> {
    depth: &'a AtomicUsize,
    level: usize,
}

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        let level = depth.fetch_add(1, Ordering::SeqCst) + 1;
        DepthGuard { depth, level }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
