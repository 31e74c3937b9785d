use crate::core::executor::{RunningFlag, TaskExecutor};
use crate::core::task_config::TaskConfig;
use crate::core::validation::validate_config;
use crate::error::WorkerError;
use crate::worker::WorkerStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

#[derive(Debug)]
struct Shared {
    status: Mutex<WorkerStatus>,
    cycles: AtomicU64,
}

impl Shared {
    fn set(&self, status: WorkerStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn get(&self) -> WorkerStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs one task configuration over and over against one target on a dedicated thread.
///
/// Workers share nothing but the read-only registry, so a slow or stuck target never
/// delays another. Stopping is cooperative: [`stop`](Self::stop) clears the executor's
/// running flag, which the loop, the inter-cycle delay and long-running tasks observe.
/// A task that is in the middle of a screenshot or tap finishes that call first.
pub struct WorkerSupervisor {
    executor: Arc<TaskExecutor>,
    config: Arc<TaskConfig>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerSupervisor {
    pub fn new(executor: Arc<TaskExecutor>, config: TaskConfig) -> Self {
        WorkerSupervisor {
            executor,
            config: Arc::new(config),
            shared: Arc::new(Shared {
                status: Mutex::new(WorkerStatus::Idle),
                cycles: AtomicU64::new(0),
            }),
            handle: None,
        }
    }

    pub fn target(&self) -> &str {
        self.executor.target()
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn status(&self) -> WorkerStatus {
        self.shared.get()
    }

    /// Number of completed cycles since the worker was created.
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::SeqCst)
    }

    /// Spawns the worker thread. Fails if the previous thread is still running.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        if let Some(handle) = &self.handle {
            if !handle.is_finished() {
                return Err(WorkerError::AlreadyRunning(self.target().to_string()));
            }
            self.join();
        }

        validate_config(self.executor.registry(), &self.config).log_summary(self.target());

        let running = self.executor.running().clone();
        running.start();
        self.shared.set(WorkerStatus::Running);

        let executor = Arc::clone(&self.executor);
        let config = Arc::clone(&self.config);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(format!("worker-{}", self.target()))
            .spawn(move || worker_loop(&executor, &config, &shared, &running))
            .map_err(|source| {
                self.shared.set(WorkerStatus::Stopped);
                WorkerError::Spawn {
                    target: self.executor.target().to_string(),
                    source,
                }
            })?;

        log::info!("[{}] worker started with config `{}`", self.target(), self.config.name);
        self.handle = Some(handle);
        Ok(())
    }

    /// Asks the worker to stop. Returns immediately; see [`join`](Self::join).
    pub fn stop(&self) {
        if self.handle.is_some() {
            log::info!("[{}] stop requested", self.target());
        }
        self.executor.running().stop();
    }

    /// Waits for the worker thread to exit.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[{}] worker thread panicked", self.target());
                self.shared.set(WorkerStatus::Stopped);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for WorkerSupervisor {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.executor.running().stop();
        }
    }
}

fn worker_loop(executor: &TaskExecutor, config: &TaskConfig, shared: &Shared, running: &RunningFlag) {
    let target = executor.target();
    let delay = executor.timing().cycle_delay();

    while running.is_running() {
        if !executor.is_target_reachable() {
            log::warn!("[{}] target is not reachable, skipping `{}`", target, config.name);
            shared.set(WorkerStatus::Unreachable);
            return;
        }

        shared.set(WorkerStatus::Running);
        executor.execute_task_config(config);
        let cycle = shared.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!("[{}] cycle {} of `{}` finished", target, cycle, config.name);

        if !running.wait(delay) {
            break;
        }
    }

    shared.set(WorkerStatus::Stopped);
    log::info!("[{}] worker stopped", target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timing;
    use crate::core::registry::{TaskDefinition, TaskRegistry};
    use crate::core::{Params, TaskStatus};
    use crate::error::TaskError;
    use crate::perception::PerceptionActuator;
    use crate::perception::replay::ReplayTransport;
    use image::GrayImage;
    use std::time::{Duration, Instant};

    fn noop(_: &TaskExecutor, _: &Params) -> Result<TaskStatus, TaskError> {
        Ok(TaskStatus::Success)
    }

    fn registry() -> Arc<TaskRegistry> {
        let mut registry = TaskRegistry::new();
        registry.register(TaskDefinition::new("noop", noop));
        Arc::new(registry)
    }

    fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let started = Instant::now();
        while started.elapsed() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_start_cycle_stop() {
        let executor = TaskExecutor::new("sup-1", registry()).with_timing(Timing::immediate());
        let mut worker = WorkerSupervisor::new(
            Arc::new(executor),
            TaskConfig::new("loop").task("noop", Params::new()),
        );
        assert_eq!(worker.status(), WorkerStatus::Idle);

        worker.start().unwrap();
        assert!(matches!(worker.start(), Err(WorkerError::AlreadyRunning(_))));
        assert!(wait_until(Duration::from_secs(5), || worker.cycles() >= 3));

        worker.stop();
        worker.join();
        assert_eq!(worker.status(), WorkerStatus::Stopped);
        assert!(worker.is_finished());
    }

    #[test]
    fn test_stop_interrupts_cycle_delay() {
        let timing = Timing {
            cycle_delay_ms: 60_000,
            ..Timing::immediate()
        };
        let executor = TaskExecutor::new("sup-2", registry()).with_timing(timing);
        let mut worker = WorkerSupervisor::new(
            Arc::new(executor),
            TaskConfig::new("slow").task("noop", Params::new()),
        );

        worker.start().unwrap();
        assert!(wait_until(Duration::from_secs(5), || worker.cycles() == 1));

        let stopped_at = Instant::now();
        worker.stop();
        worker.join();
        assert!(stopped_at.elapsed() < Duration::from_secs(5));
        assert_eq!(worker.cycles(), 1);
    }

    #[test]
    fn test_unreachable_target_ends_the_worker() {
        let transport = Arc::new(ReplayTransport::new([GrayImage::new(4, 4)]));
        transport.set_reachable(false);
        let executor = TaskExecutor::new("sup-3", registry())
            .with_timing(Timing::immediate())
            .with_actuator(PerceptionActuator::new("sup-3", transport.clone()));
        let mut worker = WorkerSupervisor::new(
            Arc::new(executor),
            TaskConfig::new("loop").task("noop", Params::new()),
        );

        worker.start().unwrap();
        assert!(wait_until(Duration::from_secs(5), || worker.is_finished()));
        worker.join();
        assert_eq!(worker.status(), WorkerStatus::Unreachable);
        assert!(!worker.status().is_active());
        assert_eq!(worker.cycles(), 0);

        // a later start picks the target up once it answers
        transport.set_reachable(true);
        worker.start().unwrap();
        assert!(wait_until(Duration::from_secs(5), || worker.cycles() > 0));

        worker.stop();
        worker.join();
        assert_eq!(worker.status(), WorkerStatus::Stopped);
    }

    #[test]
    fn test_restart_after_stop() {
        let executor = TaskExecutor::new("sup-4", registry()).with_timing(Timing::immediate());
        let mut worker = WorkerSupervisor::new(Arc::new(executor), TaskConfig::new("empty"));

        worker.start().unwrap();
        worker.stop();
        worker.join();
        worker.start().unwrap();
        assert!(wait_until(Duration::from_secs(5), || worker.cycles() > 0));
        worker.stop();
        worker.join();
        assert_eq!(worker.status(), WorkerStatus::Stopped);
    }
}
