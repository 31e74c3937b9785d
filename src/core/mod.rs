//! The task orchestration engine.
//!
//! - [`step`] and [`flow`]: the retry/timeout state machine used to sequence sub-actions
//! - [`registry`] and [`params`]: named task definitions and their parameter schemas
//! - [`executor`]: resolves and runs tasks and task configurations against one target
//! - [`definition`]: declarative task definitions built on top of [`flow`]
//! - [`builtin`]: the tasks every registry starts with

pub mod builtin;
pub mod definition;
pub mod executor;
pub mod flow;
pub mod params;
pub mod registry;
pub mod step;
pub mod task_config;
pub mod telemetry;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The Alias for serde_json::Value, task parameters are plain JSON values
pub type ParamValue = serde_json::Value;

/// Parameters passed to a task invocation.
pub type Params = HashMap<String, ParamValue>;

/// Outcome of a task, a step or a whole flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_success(self) -> bool {
        self == TaskStatus::Success
    }
}

impl From<bool> for TaskStatus {
    fn from(ok: bool) -> Self {
        if ok {
            TaskStatus::Success
        } else {
            TaskStatus::Failed
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::NotStarted => "not started",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_bool() {
        assert_eq!(TaskStatus::from(true), TaskStatus::Success);
        assert_eq!(TaskStatus::from(false), TaskStatus::Failed);
        assert!(!TaskStatus::default().is_success());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let s = serde_json::to_string(&TaskStatus::NotStarted).unwrap();
        assert_eq!(s, "\"not_started\"");
    }
}
