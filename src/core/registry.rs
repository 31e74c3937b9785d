use crate::core::executor::TaskExecutor;
use crate::core::params::{ParamDef, TaskRef, resolve_params};
use crate::core::{Params, TaskStatus};
use crate::error::TaskError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Defines the behavior of a registered task.
///
/// Behaviors receive the executor bound to one target (for perception, nested task
/// calls and the running flag) and the already-resolved parameters.
/// Any `Fn(&TaskExecutor, &Params) -> Result<TaskStatus, TaskError>` closure is a `TaskLogic`.
pub trait TaskLogic: Send + Sync + 'static {
    fn run(&self, ctx: &TaskExecutor, params: &Params) -> Result<TaskStatus, TaskError>;
}

impl<F> TaskLogic for F
where
    F: Fn(&TaskExecutor, &Params) -> Result<TaskStatus, TaskError> + Send + Sync + 'static,
{
    fn run(&self, ctx: &TaskExecutor, params: &Params) -> Result<TaskStatus, TaskError> {
        self(ctx, params)
    }
}

/// A named, parameterized unit of behavior.
///
/// Built once with the `with_*` methods, then frozen inside a [`TaskRegistry`].
#[derive(Clone)]
pub struct TaskDefinition {
    name: String,
    description: String,
    params: Vec<ParamDef>,
    pre_tasks: Vec<TaskRef>,
    post_tasks: Vec<TaskRef>,
    behavior: Arc<dyn TaskLogic>,
}

impl TaskDefinition {
    pub fn new<L: TaskLogic>(name: impl Into<String>, behavior: L) -> Self {
        TaskDefinition {
            name: name.into(),
            description: String::new(),
            params: Vec::new(),
            pre_tasks: Vec::new(),
            post_tasks: Vec::new(),
            behavior: Arc::new(behavior),
        }
    }

    pub fn with_params(mut self, params: Vec<ParamDef>) -> Self {
        self.params = params;
        self
    }

    pub fn with_pre_tasks<I, R>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<TaskRef>,
    {
        self.pre_tasks = tasks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_post_tasks<I, R>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<TaskRef>,
    {
        self.post_tasks = tasks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params(&self) -> &[ParamDef] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamDef> {
        self.params.iter().find(|def| def.name == name)
    }

    pub fn pre_tasks(&self) -> &[TaskRef] {
        &self.pre_tasks
    }

    pub fn post_tasks(&self) -> &[TaskRef] {
        &self.post_tasks
    }

    pub fn behavior(&self) -> &dyn TaskLogic {
        self.behavior.as_ref()
    }

    /// Parameters as the behavior will see them, see [`resolve_params`].
    pub fn resolve_params(&self, provided: &Params, label: &str) -> Params {
        resolve_params(&self.params, provided, label)
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("pre_tasks", &self.pre_tasks)
            .field("post_tasks", &self.post_tasks)
            .finish_non_exhaustive()
    }
}

/// Mapping from task name to [`TaskDefinition`].
///
/// Populated during a single-threaded initialization phase, then shared read-only
/// (usually as `Arc<TaskRegistry>`) by every executor. Registering a name that
/// already exists replaces the earlier definition, which is how declarative
/// definitions override built-in tasks.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    tasks: HashMap<String, Arc<TaskDefinition>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `definition`, returning the definition it replaced, if any.
    pub fn register(&mut self, definition: TaskDefinition) -> Option<Arc<TaskDefinition>> {
        let name = definition.name.clone();
        let previous = self.tasks.insert(name.clone(), Arc::new(definition));
        if previous.is_some() {
            log::info!("Task `{}` was already registered, overriding it.", name);
        } else {
            log::debug!("Registered task `{}`", name);
        }
        previous
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<TaskDefinition>> {
        self.tasks.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Arc<TaskDefinition>> {
        self.tasks.values()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}
