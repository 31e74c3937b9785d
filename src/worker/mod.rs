//! Long-running workers, one thread per target.

mod pool;
mod supervisor;

pub use pool::WorkerPool;
pub use supervisor::WorkerSupervisor;

use std::fmt;

/// Lifecycle of a worker as seen from outside its thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerStatus {
    /// Created, never started.
    Idle,
    Running,
    /// The target did not answer before a cycle; the thread has exited.
    Unreachable,
    /// The thread has exited.
    Stopped,
}

impl WorkerStatus {
    /// Whether the worker thread is still looping.
    pub fn is_active(self) -> bool {
        self == WorkerStatus::Running
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Running => "running",
            WorkerStatus::Unreachable => "unreachable",
            WorkerStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}
