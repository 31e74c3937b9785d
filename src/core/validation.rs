use crate::core::registry::TaskRegistry;
use crate::core::task_config::TaskConfig;

/// Represents an issue found while checking a task configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    /// The configuration will fail when it reaches this point.
    Error(String),
    /// The configuration runs, but not quite as written.
    Warning(String),
}

/// The result of a configuration validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Error(msg.into()));
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Warning(msg.into()));
    }

    pub fn is_safe(&self) -> bool {
        !self.issues.iter().any(|i| matches!(i, ValidationIssue::Error(_)))
    }

    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| matches!(i, ValidationIssue::Warning(_)))
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().filter_map(|i| match i {
            ValidationIssue::Error(msg) => Some(msg.as_str()),
            ValidationIssue::Warning(_) => None,
        })
    }

    /// Logs every issue under `label`.
    pub fn log_summary(&self, label: &str) {
        if self.is_safe() && !self.has_warnings() {
            log::info!("[{}] task configuration is valid", label);
            return;
        }

        for issue in &self.issues {
            match issue {
                ValidationIssue::Error(msg) => log::error!("[{}] {}", label, msg),
                ValidationIssue::Warning(msg) => log::warn!("[{}] {}", label, msg),
            }
        }
    }
}

/// Checks `config` against the tasks of `registry` without running anything.
///
/// Unregistered tasks are errors. Parameters the task does not declare, values
/// that would fall back to their default, and pre/post tasks that are not
/// registered are warnings.
pub fn validate_config(registry: &TaskRegistry, config: &TaskConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    for (index, invocation) in config.tasks.iter().enumerate() {
        let position = index + 1;
        let Some(definition) = registry.resolve(&invocation.name) else {
            result.add_error(format!(
                "task #{} `{}` is not registered",
                position, invocation.name
            ));
            continue;
        };

        let mut keys: Vec<&String> = invocation.params.keys().collect();
        keys.sort();
        for key in keys {
            match definition.param(key) {
                None if !definition.params().is_empty() => result.add_warning(format!(
                    "task #{} `{}` does not declare parameter `{}`",
                    position, invocation.name, key
                )),
                None => {}
                Some(def) => {
                    if let Err(reason) = def.coerce(&invocation.params[key]) {
                        result.add_warning(format!(
                            "task #{} `{}` parameter `{}` will use its default: {}",
                            position, invocation.name, key, reason
                        ));
                    }
                }
            }
        }

        for hook in definition.pre_tasks().iter().chain(definition.post_tasks()) {
            if !registry.contains(hook.name()) {
                result.add_warning(format!(
                    "task `{}` refers to unregistered pre/post task `{}`",
                    invocation.name,
                    hook.name()
                ));
            }
        }
    }

    result
}
