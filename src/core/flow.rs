use crate::core::step::{DEFAULT_BACKOFF, StepResult, TaskStep};
use crate::core::TaskStatus;
use std::time::Duration;

/// An ordered list of [`TaskStep`]s run strictly in sequence.
///
/// The flow stops at the first step that does not succeed and returns its status,
/// remaining steps are never run.
///
/// ```rust
/// use tapflow::prelude::*;
/// use std::time::Duration;
///
/// let mut flow = TaskFlow::new("emulator-0")
///     .backoff(Duration::ZERO)
///     .step("open", || Ok(TaskStatus::Success))
///     .step_with("confirm", || Ok(true.into()), 3, Some(Duration::from_secs(5)));
///
/// assert_eq!(flow.run(), TaskStatus::Success);
/// ```
pub struct TaskFlow<'a> {
    label: String,
    backoff: Duration,
    steps: Vec<TaskStep<'a>>,
}

impl<'a> TaskFlow<'a> {
    pub fn new(label: impl Into<String>) -> Self {
        TaskFlow {
            label: label.into(),
            backoff: DEFAULT_BACKOFF,
            steps: Vec::new(),
        }
    }

    /// Backoff applied to the steps added after this call.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Appends a single-attempt step.
    pub fn step<F>(self, name: impl Into<String>, action: F) -> Self
    where
        F: FnMut() -> StepResult + 'a,
    {
        self.step_with(name, action, 1, None)
    }

    /// Appends a step retried up to `retry` times within `timeout`.
    pub fn step_with<F>(
        mut self,
        name: impl Into<String>,
        action: F,
        retry: u32,
        timeout: Option<Duration>,
    ) -> Self
    where
        F: FnMut() -> StepResult + 'a,
    {
        let step = TaskStep::new(name, action)
            .retry(retry)
            .timeout(timeout)
            .backoff(self.backoff)
            .label(self.label.clone());
        self.steps.push(step);
        self
    }

    /// Appends a step built by the caller, keeping its own settings.
    pub fn push(&mut self, step: TaskStep<'a>) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[TaskStep<'a>] {
        &self.steps
    }

    pub fn run(&mut self) -> TaskStatus {
        for step in self.steps.iter_mut() {
            let status = step.run();
            if status != TaskStatus::Success {
                log::warn!(
                    "[{}] flow stopped at step `{}`: {}",
                    self.label,
                    step.name(),
                    status
                );
                return status;
            }
        }
        TaskStatus::Success
    }
}
