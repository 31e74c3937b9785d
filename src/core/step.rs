use crate::core::TaskStatus;
use crate::error::TaskError;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// Pause between two attempts of the same step.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// What a step action returns on each attempt.
pub type StepResult = Result<TaskStatus, TaskError>;

/// Lifecycle of a [`TaskStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// A named action retried up to `retry` times, optionally bounded by a wall-clock timeout.
///
/// Each attempt is interpreted as follows:
/// - `Ok(TaskStatus::Success)` ends the step as succeeded
/// - any other `Ok` status or an `Err` is a failed attempt, logged with its attempt number
///
/// Once the time elapsed since the first attempt reaches the timeout the step fails
/// even if retries remain.
pub struct TaskStep<'a> {
    name: String,
    action: Box<dyn FnMut() -> StepResult + 'a>,
    retry: u32,
    timeout: Option<Duration>,
    backoff: Duration,
    label: String,
    state: StepState,
    attempts: u32,
}

impl<'a> TaskStep<'a> {
    /// Creates a single-attempt step with no timeout.
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: FnMut() -> StepResult + 'a,
    {
        TaskStep {
            name: name.into(),
            action: Box::new(action),
            retry: 1,
            timeout: None,
            backoff: DEFAULT_BACKOFF,
            label: String::from("-"),
            state: StepState::Pending,
            attempts: 0,
        }
    }

    /// Sets the attempt budget. Zero is raised to one.
    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = retry.max(1);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Tag used to prefix log lines, usually the target identifier.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    /// Number of attempts made by the last [`run`](TaskStep::run).
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn run(&mut self) -> TaskStatus {
        self.state = StepState::Running;
        self.attempts = 0;
        let started = Instant::now();

        for attempt in 1..=self.retry {
            self.attempts = attempt;
            match (self.action)() {
                Ok(TaskStatus::Success) => {
                    log::debug!(
                        "[{}] step `{}` succeeded on attempt {}/{}",
                        self.label,
                        self.name,
                        attempt,
                        self.retry
                    );
                    self.state = StepState::Succeeded;
                    return TaskStatus::Success;
                }
                Ok(status) => log::warn!(
                    "[{}] step `{}` attempt {}/{} failed: returned {}",
                    self.label,
                    self.name,
                    attempt,
                    self.retry,
                    status
                ),
                Err(e) => log::warn!(
                    "[{}] step `{}` attempt {}/{} failed: {}",
                    self.label,
                    self.name,
                    attempt,
                    self.retry,
                    e
                ),
            }

            if let Some(limit) = self.timeout {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    log::warn!(
                        "[{}] step `{}` timed out after {:.2?} (limit {:.2?})",
                        self.label,
                        self.name,
                        elapsed,
                        limit
                    );
                    self.state = StepState::Failed;
                    return TaskStatus::Failed;
                }
            }

            if attempt < self.retry {
                thread::sleep(self.backoff);
            }
        }

        log::warn!(
            "[{}] step `{}` failed after {} attempt(s)",
            self.label,
            self.name,
            self.attempts
        );
        self.state = StepState::Failed;
        TaskStatus::Failed
    }
}

impl fmt::Debug for TaskStep<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStep")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}
