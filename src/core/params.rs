use crate::core::{ParamValue, Params};
use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The declared type of a task parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[serde(alias = "str")]
    String,
    #[serde(alias = "int")]
    Integer,
    Float,
    #[serde(alias = "bool")]
    Boolean,
    /// Strings, given as an array or a comma separated string.
    List,
    Choice,
}

/// One entry of a task's parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    #[serde(default)]
    pub default: ParamValue,
    #[serde(default, alias = "desc", skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ParamValue>,
}

impl ParamDef {
    pub fn new(name: impl Into<String>, kind: ParamKind, default: impl Into<ParamValue>) -> Self {
        ParamDef {
            name: name.into(),
            kind,
            default: default.into(),
            description: String::new(),
            options: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>, default: &str) -> Self {
        Self::new(name, ParamKind::String, default)
    }

    pub fn integer(name: impl Into<String>, default: i64) -> Self {
        Self::new(name, ParamKind::Integer, default)
    }

    pub fn float(name: impl Into<String>, default: f64) -> Self {
        Self::new(name, ParamKind::Float, default)
    }

    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, ParamKind::Boolean, default)
    }

    pub fn list(name: impl Into<String>, default: &[&str]) -> Self {
        Self::new(name, ParamKind::List, default.to_vec())
    }

    pub fn choice<I, V>(name: impl Into<String>, default: &str, options: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        let mut def = Self::new(name, ParamKind::Choice, default);
        def.options = options.into_iter().map(Into::into).collect();
        def
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Converts `value` to this parameter's kind, or explains why it cannot.
    pub fn coerce(&self, value: &ParamValue) -> Result<ParamValue, String> {
        match self.kind {
            ParamKind::String => match value {
                ParamValue::String(_) => Ok(value.clone()),
                ParamValue::Number(n) => Ok(ParamValue::String(n.to_string())),
                ParamValue::Bool(b) => Ok(ParamValue::String(b.to_string())),
                other => Err(format!("expected a string, got {other}")),
            },
            ParamKind::Integer => as_integer(value)
                .map(ParamValue::from)
                .ok_or_else(|| format!("expected an integer, got {value}")),
            ParamKind::Float => as_float(value)
                .map(ParamValue::from)
                .ok_or_else(|| format!("expected a number, got {value}")),
            ParamKind::Boolean => as_bool(value)
                .map(ParamValue::Bool)
                .ok_or_else(|| format!("expected a boolean, got {value}")),
            ParamKind::List => as_list(value)
                .map(ParamValue::from)
                .ok_or_else(|| format!("expected a list of strings, got {value}")),
            ParamKind::Choice => {
                if value.is_null() {
                    Err("expected one of the declared options, got null".to_string())
                } else if self.options.is_empty() || self.options.contains(value) {
                    Ok(value.clone())
                } else {
                    Err(format!("{value} is not one of {:?}", self.options))
                }
            }
        }
    }
}

fn as_integer(value: &ParamValue) -> Option<i64> {
    match value {
        ParamValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        ParamValue::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn as_float(value: &ParamValue) -> Option<f64> {
    match value {
        ParamValue::Number(n) => n.as_f64(),
        ParamValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_bool(value: &ParamValue) -> Option<bool> {
    match value {
        ParamValue::Bool(b) => Some(*b),
        ParamValue::Number(n) => n.as_f64().map(|f| f != 0.0),
        ParamValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_list(value: &ParamValue) -> Option<Vec<String>> {
    match value {
        ParamValue::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        ParamValue::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

/// Builds the parameters a behavior actually receives.
///
/// Declared parameters that are missing take their default. Provided values are
/// coerced to the declared kind; a value that cannot be coerced is replaced by the
/// default. Undeclared keys are passed through untouched.
pub fn resolve_params(schema: &[ParamDef], provided: &Params, label: &str) -> Params {
    let mut resolved = provided.clone();
    for def in schema {
        let value = match provided.get(&def.name) {
            None | Some(ParamValue::Null) => def.default.clone(),
            Some(value) => match def.coerce(value) {
                Ok(coerced) => coerced,
                Err(reason) => {
                    log::warn!(
                        "[{}] parameter `{}` falls back to its default: {}",
                        label,
                        def.name,
                        reason
                    );
                    def.default.clone()
                }
            },
        };
        if value.is_null() {
            resolved.remove(&def.name);
        } else {
            resolved.insert(def.name.clone(), value);
        }
    }
    resolved
}

/// A pre-task or post-task: either a bare task name or a name with parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskRef {
    Name(String),
    WithParams {
        name: String,
        #[serde(default)]
        params: Params,
    },
}

impl TaskRef {
    pub fn name(&self) -> &str {
        match self {
            TaskRef::Name(name) => name,
            TaskRef::WithParams { name, .. } => name,
        }
    }

    pub fn params(&self) -> Params {
        match self {
            TaskRef::Name(_) => Params::new(),
            TaskRef::WithParams { params, .. } => params.clone(),
        }
    }
}

impl From<&str> for TaskRef {
    fn from(name: &str) -> Self {
        TaskRef::Name(name.to_string())
    }
}

impl From<(&str, Params)> for TaskRef {
    fn from((name, params): (&str, Params)) -> Self {
        TaskRef::WithParams {
            name: name.to_string(),
            params,
        }
    }
}

/// Typed accessors used by task behaviors.
pub trait ParamsExt {
    fn str_param(&self, name: &str) -> Result<&str, TaskError>;
    fn f64_param(&self, name: &str) -> Result<f64, TaskError>;
    fn u64_param(&self, name: &str) -> Result<u64, TaskError>;
    fn bool_param(&self, name: &str) -> Result<bool, TaskError>;
    /// A non-negative number of seconds, fractions allowed.
    fn secs_param(&self, name: &str) -> Result<Duration, TaskError>;
    /// A list given either as a JSON array of strings or as a comma separated string.
    fn list_param(&self, name: &str) -> Result<Vec<String>, TaskError>;
}

fn missing(name: &str) -> TaskError {
    TaskError::InvalidParam {
        name: name.to_string(),
        reason: "missing".to_string(),
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> TaskError {
    TaskError::InvalidParam {
        name: name.to_string(),
        reason: reason.into(),
    }
}

impl ParamsExt for Params {
    fn str_param(&self, name: &str) -> Result<&str, TaskError> {
        match self.get(name) {
            Some(ParamValue::String(s)) => Ok(s),
            Some(other) => Err(invalid(name, format!("expected a string, got {other}"))),
            None => Err(missing(name)),
        }
    }

    fn f64_param(&self, name: &str) -> Result<f64, TaskError> {
        let value = self.get(name).ok_or_else(|| missing(name))?;
        as_float(value).ok_or_else(|| invalid(name, format!("expected a number, got {value}")))
    }

    fn u64_param(&self, name: &str) -> Result<u64, TaskError> {
        let value = self.get(name).ok_or_else(|| missing(name))?;
        as_integer(value)
            .and_then(|i| u64::try_from(i).ok())
            .ok_or_else(|| invalid(name, format!("expected a non-negative integer, got {value}")))
    }

    fn bool_param(&self, name: &str) -> Result<bool, TaskError> {
        let value = self.get(name).ok_or_else(|| missing(name))?;
        as_bool(value).ok_or_else(|| invalid(name, format!("expected a boolean, got {value}")))
    }

    fn secs_param(&self, name: &str) -> Result<Duration, TaskError> {
        let secs = self.f64_param(name)?;
        Duration::try_from_secs_f64(secs).map_err(|e| invalid(name, format!("{secs}: {e}")))
    }

    fn list_param(&self, name: &str) -> Result<Vec<String>, TaskError> {
        let value = self.get(name).ok_or_else(|| missing(name))?;
        as_list(value)
            .ok_or_else(|| invalid(name, format!("expected a list of strings, got {value}")))
    }
}
