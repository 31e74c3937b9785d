use crate::core::TaskStatus;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// One executed task, as seen by a [`Telemetry`] sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: u64,
    /// Identifies one `execute_task_config` invocation; `None` for direct `execute_task` calls.
    pub run_id: Option<Uuid>,
    pub target: String,
    pub task: String,
    pub status: TaskStatus,
    pub elapsed_ms: u64,
}

/// Trait for observing executed tasks.
pub trait Telemetry: Send + Sync {
    fn record(&self, entry: TraceEntry);
    fn flush(&self) {}
}

/// Simple in-memory collector for traces.
#[derive(Default)]
pub struct MemoryTelemetry {
    traces: Mutex<Vec<TraceEntry>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_traces(&self) -> Vec<TraceEntry> {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Task names recorded for `target`, in execution order.
    pub fn tasks_for(&self, target: &str) -> Vec<String> {
        self.get_traces()
            .into_iter()
            .filter(|t| t.target == target)
            .map(|t| t.task)
            .collect()
    }
}

impl Telemetry for MemoryTelemetry {
    fn record(&self, entry: TraceEntry) {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}
