use crate::core::executor::TaskExecutor;
use crate::core::task_config::TaskConfig;
use crate::error::WorkerError;
use crate::worker::{WorkerStatus, WorkerSupervisor};
use std::collections::BTreeMap;
use std::sync::Arc;

/// At most one [`WorkerSupervisor`] per target.
#[derive(Default)]
pub struct WorkerPool {
    workers: BTreeMap<String, WorkerSupervisor>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a worker for the executor's target.
    ///
    /// Refused while a worker for the same target is still running; a finished
    /// worker for that target is replaced.
    pub fn start(&mut self, executor: Arc<TaskExecutor>, config: TaskConfig) -> Result<(), WorkerError> {
        let target = executor.target().to_string();
        if let Some(existing) = self.workers.get_mut(&target) {
            if !existing.is_finished() {
                log::warn!("[{}] a worker is already running", target);
                return Err(WorkerError::AlreadyRunning(target));
            }
            existing.join();
        }

        let mut worker = WorkerSupervisor::new(executor, config);
        worker.start()?;
        self.workers.insert(target, worker);
        Ok(())
    }

    /// Signals the worker of `target` to stop. Returns false for an unknown target.
    pub fn stop(&self, target: &str) -> bool {
        match self.workers.get(target) {
            Some(worker) => {
                worker.stop();
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        for worker in self.workers.values() {
            worker.stop();
        }
    }

    /// Stops every worker and waits for all threads to exit.
    pub fn shutdown(&mut self) {
        self.stop_all();
        for worker in self.workers.values_mut() {
            worker.join();
        }
    }

    pub fn status(&self, target: &str) -> Option<WorkerStatus> {
        self.workers.get(target).map(WorkerSupervisor::status)
    }

    /// Status of every known worker, by target name.
    pub fn statuses(&self) -> Vec<(String, WorkerStatus)> {
        self.workers
            .iter()
            .map(|(target, worker)| (target.clone(), worker.status()))
            .collect()
    }

    pub fn get(&self, target: &str) -> Option<&WorkerSupervisor> {
        self.workers.get(target)
    }

    /// Removes the workers whose thread has exited and returns their targets.
    pub fn reap(&mut self) -> Vec<String> {
        let finished: Vec<String> = self
            .workers
            .iter()
            .filter(|(_, worker)| worker.is_finished())
            .map(|(target, _)| target.clone())
            .collect();

        for target in &finished {
            if let Some(mut worker) = self.workers.remove(target) {
                worker.join();
                log::debug!("[{}] worker reaped after {} cycle(s)", target, worker.cycles());
            }
        }
        finished
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
