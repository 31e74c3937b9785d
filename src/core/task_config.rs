use crate::core::Params;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One operator-authored automation script: tasks run in order, fail-stop.
///
/// ```json
/// { "name": "daily", "tasks": [ { "name": "click_button", "params": { "threshold": 0.8 } } ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<TaskInvocation>,
}

/// A task name with the parameters it is invoked with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInvocation {
    pub name: String,
    #[serde(default)]
    pub params: Params,
}

impl TaskConfig {
    pub fn new(name: impl Into<String>) -> Self {
        TaskConfig {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    /// Appends a task invocation.
    pub fn task(mut self, name: impl Into<String>, params: Params) -> Self {
        self.tasks.push(TaskInvocation {
            name: name.into(),
            params,
        });
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_task_config() {
        let config = TaskConfig::from_json(
            r#"{
                "name": "daily",
                "tasks": [
                    {"name": "click_button", "params": {"template_path": "buttons/ok.png", "threshold": 0.8}},
                    {"name": "wait"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.name, "daily");
        assert_eq!(config.len(), 2);
        assert_eq!(config.tasks[0].params["threshold"], json!(0.8));
        assert!(config.tasks[1].params.is_empty());
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        assert!(matches!(
            TaskConfig::from_json("{\"tasks\": 3}"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            TaskConfig::load("/no/such/config.json"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_builder_preserves_order() {
        let config = TaskConfig::new("c")
            .task("a", Params::new())
            .task("b", Params::new());
        let names: Vec<&str> = config.tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
