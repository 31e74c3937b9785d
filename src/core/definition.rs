//! Tasks described as data.
//!
//! A declarative task is a JSON document with a name, optional pre/post tasks, a
//! parameter schema and a list of steps. Each step names one of the [`StepAction`]s;
//! at run time the steps become a [`TaskFlow`](crate::core::flow::TaskFlow) bound to
//! the executing target.
//!
//! ```json
//! {
//!   "name": "collect_reward",
//!   "pre_tasks": ["dismiss_popup"],
//!   "param_defs": [{"name": "reward", "type": "str", "default": "img/reward.png"}],
//!   "steps": [
//!     {"name": "open", "action": "click_img", "img_path": "img/mail.png", "retry": 3},
//!     {"name": "claim", "action": "click_img", "img_path": "${reward}", "timeout": 10},
//!     {"name": "back", "action": "exist_task", "task": "go_home"}
//!   ]
//! }
//! ```

use crate::core::executor::TaskExecutor;
use crate::core::params::{ParamDef, ParamsExt, TaskRef};
use crate::core::registry::{TaskDefinition, TaskLogic, TaskRegistry};
use crate::core::step::StepResult;
use crate::core::{ParamValue, Params, TaskStatus};
use crate::error::{DefinitionError, TaskError};
use crate::perception::{PerceptionActuator, Region, Template};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Where a batch of declarative definitions comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionSource {
    Path(PathBuf),
    Inline { origin: String, text: String },
}

impl DefinitionSource {
    pub fn inline(origin: impl Into<String>, text: impl Into<String>) -> Self {
        DefinitionSource::Inline {
            origin: origin.into(),
            text: text.into(),
        }
    }

    /// Every `*.json` file of `dir`, sorted by file name.
    pub fn scan(dir: impl AsRef<Path>) -> Result<Vec<DefinitionSource>, DefinitionError> {
        let dir = dir.as_ref();
        let io_err = |source| DefinitionError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths.into_iter().map(DefinitionSource::Path).collect())
    }

    pub fn origin(&self) -> String {
        match self {
            DefinitionSource::Path(path) => path.display().to_string(),
            DefinitionSource::Inline { origin, .. } => origin.clone(),
        }
    }

    fn read(&self) -> Result<String, DefinitionError> {
        match self {
            DefinitionSource::Path(path) => {
                std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
                    path: path.clone(),
                    source,
                })
            }
            DefinitionSource::Inline { text, .. } => Ok(text.clone()),
        }
    }

    /// Parses the source, which holds either one task or an array of tasks.
    pub fn parse(&self) -> Result<Vec<DeclarativeTask>, DefinitionError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            Many(Vec<DeclarativeTask>),
            One(Box<DeclarativeTask>),
        }

        let text = self.read()?;
        let parsed = serde_json::from_str(&text).map_err(|source| DefinitionError::Parse {
            origin: self.origin(),
            source,
        })?;
        Ok(match parsed {
            OneOrMany::Many(tasks) => tasks,
            OneOrMany::One(task) => vec![*task],
        })
    }
}

/// Registers every task of `sources` on top of `registry`.
///
/// Sources are applied in order, so a later definition replaces an earlier one
/// with the same name, built-in tasks included. The first unreadable or malformed
/// source aborts loading.
pub fn load_definitions(
    mut registry: TaskRegistry,
    sources: &[DefinitionSource],
) -> Result<TaskRegistry, DefinitionError> {
    for source in sources {
        let tasks = source.parse()?;
        log::info!("Loaded {} task(s) from {}", tasks.len(), source.origin());
        for task in tasks {
            registry.register(task.into_definition());
        }
    }
    Ok(registry)
}

/// A task made of declared steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeTask {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, alias = "pre_task")]
    pub pre_tasks: Vec<TaskRef>,
    #[serde(default, alias = "post_task")]
    pub post_tasks: Vec<TaskRef>,
    #[serde(default)]
    pub param_defs: Vec<ParamDef>,
    #[serde(default)]
    pub steps: Vec<StepDef>,
}

impl DeclarativeTask {
    pub fn into_definition(self) -> TaskDefinition {
        TaskDefinition::new(self.name.clone(), DeclaredSteps(self.steps))
            .with_description(self.description)
            .with_params(self.param_defs)
            .with_pre_tasks(self.pre_tasks)
            .with_post_tasks(self.post_tasks)
    }
}

/// One declared step.
///
/// The action's parameters come from a `params` object when present; any other
/// keys beside the named fields are parameters too, with `params` taking precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
    pub name: String,
    pub action: String,
    #[serde(default = "default_retry")]
    pub retry: u32,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    /// Task invoked by `exist_task`; the step name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(flatten)]
    pub params: Params,
}

fn default_retry() -> u32 {
    1
}

impl StepDef {
    fn timeout(&self) -> Option<Duration> {
        self.timeout
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    fn task_name(&self) -> &str {
        self.task.as_deref().unwrap_or(&self.name)
    }

    /// Parameters handed to the action, before `${}` substitution.
    fn action_params(&self) -> Params {
        let mut merged = self.params.clone();
        if let Some(ParamValue::Object(nested)) = merged.remove("params") {
            merged.extend(nested);
        } else if let Some(other) = self.params.get("params") {
            merged.insert("params".to_string(), other.clone());
        }
        merged
    }
}

/// The actions a declared step can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Clicks the first visible template; succeeds iff it clicked.
    ClickImg,
    /// Clicks the template while it is visible; succeeds once it is gone.
    ClickUntilGone,
    /// Succeeds when the template is visible.
    WaitImg,
    /// Waits `seconds`, cut short when the worker stops.
    Sleep,
    /// Runs another registered task.
    ExistTask,
}

impl FromStr for StepAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "click_img" => Ok(StepAction::ClickImg),
            "click_until_gone" => Ok(StepAction::ClickUntilGone),
            "wait_img" => Ok(StepAction::WaitImg),
            "sleep" => Ok(StepAction::Sleep),
            "exist_task" => Ok(StepAction::ExistTask),
            other => Err(format!("unknown step action `{other}`")),
        }
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepAction::ClickImg => "click_img",
            StepAction::ClickUntilGone => "click_until_gone",
            StepAction::WaitImg => "wait_img",
            StepAction::Sleep => "sleep",
            StepAction::ExistTask => "exist_task",
        };
        f.write_str(s)
    }
}

impl StepAction {
    fn perform(self, ctx: &TaskExecutor, step: &StepDef, params: &Params) -> StepResult {
        match self {
            StepAction::ClickImg => {
                let actuator = ctx.actuator()?;
                let target = ImageTarget::from_params(actuator, params)?;
                let result = actuator.find(&target.templates, target.threshold, target.region)?;
                match result.position() {
                    Some((x, y)) => {
                        log::info!("[{}] {}", ctx.target(), target.description(params));
                        actuator.click(x, y);
                        Ok(TaskStatus::Success)
                    }
                    None => Ok(TaskStatus::Failed),
                }
            }
            StepAction::ClickUntilGone => {
                let actuator = ctx.actuator()?;
                let target = ImageTarget::from_params(actuator, params)?;
                let result = actuator.find(&target.templates, target.threshold, target.region)?;
                match result.position() {
                    Some((x, y)) => {
                        log::info!("[{}] {}", ctx.target(), target.description(params));
                        actuator.click(x, y);
                        Ok(TaskStatus::Failed)
                    }
                    None => Ok(TaskStatus::Success),
                }
            }
            StepAction::WaitImg => {
                let actuator = ctx.actuator()?;
                let target = ImageTarget::from_params(actuator, params)?;
                let result = actuator.find(&target.templates, target.threshold, target.region)?;
                Ok(result.found.into())
            }
            StepAction::Sleep => {
                let duration = params.secs_param("seconds")?;
                Ok(ctx.running().wait(duration).into())
            }
            StepAction::ExistTask => Ok(ctx.execute_task(step.task_name(), params)),
        }
    }
}

/// What an image step looks for.
struct ImageTarget {
    templates: Vec<Template>,
    threshold: f64,
    region: Option<Region>,
}

impl ImageTarget {
    fn from_params(actuator: &PerceptionActuator, params: &Params) -> Result<Self, TaskError> {
        let templates: Vec<Template> = params
            .list_param("img_path")?
            .into_iter()
            .map(Template::from)
            .collect();
        let threshold = match params.get("threshold") {
            Some(_) => params.f64_param("threshold")?,
            None => actuator.default_threshold(),
        };
        let region = match params.get("region") {
            Some(value) => Some(serde_json::from_value::<Region>(value.clone()).map_err(|e| {
                TaskError::InvalidParam {
                    name: "region".to_string(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };
        Ok(ImageTarget {
            templates,
            threshold,
            region,
        })
    }

    fn description(&self, params: &Params) -> String {
        params
            .str_param("desc")
            .map(str::to_string)
            .unwrap_or_else(|_| {
                let names: Vec<String> = self.templates.iter().map(Template::name).collect();
                format!("click {}", names.join(", "))
            })
    }
}

/// Behavior of a [`DeclarativeTask`].
struct DeclaredSteps(Vec<StepDef>);

impl TaskLogic for DeclaredSteps {
    fn run(&self, ctx: &TaskExecutor, params: &Params) -> Result<TaskStatus, TaskError> {
        let mut flow = ctx.flow();
        for step in &self.0 {
            let action = match step.action.parse::<StepAction>() {
                Ok(action) => action,
                Err(reason) => {
                    log::warn!("[{}] skipping step `{}`: {}", ctx.target(), step.name, reason);
                    continue;
                }
            };
            let step_params = substitute(&step.action_params(), params);
            flow = flow.step_with(
                step.name.clone(),
                move || action.perform(ctx, step, &step_params),
                step.retry,
                step.timeout(),
            );
        }
        Ok(flow.run())
    }
}

/// Replaces `${name}` references in string values with the task's parameters.
///
/// A value that is exactly one reference takes the parameter's value as is;
/// references embedded in longer strings are replaced textually. Unknown names
/// are left untouched.
fn substitute(step_params: &Params, task_params: &Params) -> Params {
    step_params
        .iter()
        .map(|(key, value)| (key.clone(), substitute_value(value, task_params)))
        .collect()
}

fn substitute_value(value: &ParamValue, task_params: &Params) -> ParamValue {
    match value {
        ParamValue::String(s) => {
            let whole = s
                .strip_prefix("${")
                .and_then(|r| r.strip_suffix('}'))
                .filter(|name| !name.contains("${"))
                .and_then(|name| task_params.get(name));
            if let Some(found) = whole {
                return found.clone();
            }
            ParamValue::String(interpolate(s, task_params))
        }
        ParamValue::Array(items) => ParamValue::Array(
            items
                .iter()
                .map(|item| substitute_value(item, task_params))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn interpolate(s: &str, task_params: &Params) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match task_params.get(name) {
            Some(ParamValue::String(v)) => out.push_str(v),
            Some(v) => out.push_str(&v.to_string()),
            None => out.push_str(&rest[start..start + 3 + end]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Params {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_declarative_task() {
        let source = DefinitionSource::inline(
            "inline",
            r#"{
                "name": "collect",
                "pre_task": ["dismiss_popup"],
                "param_defs": [{"name": "reward", "type": "str", "default": "img/reward.png"}],
                "steps": [
                    {"name": "open", "action": "click_img", "img_path": "img/mail.png", "retry": 3},
                    {"name": "go_home", "action": "exist_task", "timeout": 2.5}
                ]
            }"#,
        );
        let tasks = source.parse().unwrap();
        assert_eq!(tasks.len(), 1);

        let task = &tasks[0];
        assert_eq!(task.pre_tasks[0].name(), "dismiss_popup");
        assert_eq!(task.param_defs[0].default, json!("img/reward.png"));
        assert_eq!(task.steps[0].retry, 3);
        assert_eq!(task.steps[0].params["img_path"], json!("img/mail.png"));
        assert_eq!(task.steps[1].retry, 1);
        assert_eq!(task.steps[1].task_name(), "go_home");
        assert_eq!(task.steps[1].timeout(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_nested_params_object_takes_precedence() {
        let step: StepDef = serde_json::from_value(json!({
            "name": "collect",
            "action": "exist_task",
            "count": 1,
            "desc": "collect",
            "params": {"count": 5, "img_path": "img/a.png"}
        }))
        .unwrap();

        let merged = step.action_params();
        assert_eq!(merged.get("count"), Some(&json!(5)));
        assert_eq!(merged.get("img_path"), Some(&json!("img/a.png")));
        assert_eq!(merged.get("desc"), Some(&json!("collect")));
        assert!(!merged.contains_key("params"));
    }

    #[test]
    fn test_parse_array_of_tasks() {
        let source = DefinitionSource::inline("batch", r#"[{"name": "a"}, {"name": "b", "steps": []}]"#);
        let names: Vec<String> = source.parse().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_source_reports_origin() {
        let err = DefinitionSource::inline("broken.json", "{\"steps\": 1}")
            .parse()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::Parse { ref origin, .. } if origin == "broken.json"));

        let err = DefinitionSource::Path("/no/such/tasks.json".into()).parse().unwrap_err();
        assert!(matches!(err, DefinitionError::Io { .. }));
    }

    #[test]
    fn test_step_actions_parse() {
        assert_eq!("click_until_gone".parse::<StepAction>(), Ok(StepAction::ClickUntilGone));
        assert_eq!(StepAction::ExistTask.to_string(), "exist_task");
        assert!("swipe".parse::<StepAction>().is_err());
    }

    #[test]
    fn test_substitution() {
        let task = params(json!({"reward": "img/gold.png", "count": 3, "mode": "fast"}));
        let step = params(json!({
            "img_path": "${reward}",
            "times": "${count}",
            "desc": "collect ${mode} x${count}",
            "list": ["${reward}", "img/x.png"],
            "unknown": "${nope}",
            "plain": 7
        }));

        let resolved = substitute(&step, &task);
        assert_eq!(resolved["img_path"], json!("img/gold.png"));
        assert_eq!(resolved["times"], json!(3));
        assert_eq!(resolved["desc"], json!("collect fast x3"));
        assert_eq!(resolved["list"], json!(["img/gold.png", "img/x.png"]));
        assert_eq!(resolved["unknown"], json!("${nope}"));
        assert_eq!(resolved["plain"], json!(7));
    }

    #[test]
    fn test_unterminated_reference_is_kept() {
        assert_eq!(interpolate("a ${b", &Params::new()), "a ${b");
    }

    #[test]
    fn test_load_definitions_overrides_in_order() {
        let first = DefinitionSource::inline("one", r#"{"name": "t", "description": "first"}"#);
        let second = DefinitionSource::inline("two", r#"{"name": "t", "description": "second"}"#);

        let registry = load_definitions(TaskRegistry::new(), &[first, second]).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("t").unwrap().description(), "second");
    }

    #[test]
    fn test_scan_sorts_json_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::write(dir.join("b.json"), "{}").unwrap();
        std::fs::write(dir.join("a.json"), "{}").unwrap();
        std::fs::write(dir.join("notes.txt"), "").unwrap();

        let sources = DefinitionSource::scan(dir).unwrap();

        assert_eq!(
            sources,
            vec![
                DefinitionSource::Path(dir.join("a.json")),
                DefinitionSource::Path(dir.join("b.json")),
            ]
        );
    }
}
