//! Operator settings: tool paths, matching defaults, target bindings and timing.

use crate::error::ConfigError;
use crate::perception::DEFAULT_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The intentional waits of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Pause between two attempts of a step.
    pub step_backoff_ms: u64,
    /// Pause after a successful task, lets the UI settle.
    pub task_pacing_ms: u64,
    /// Pause between two cycles of a worker.
    pub cycle_delay_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            step_backoff_ms: 500,
            task_pacing_ms: 1_000,
            cycle_delay_ms: 3_000,
        }
    }
}

impl Timing {
    /// No waits at all, for tests and dry runs.
    pub fn immediate() -> Self {
        Timing {
            step_backoff_ms: 0,
            task_pacing_ms: 0,
            cycle_delay_ms: 0,
        }
    }

    pub fn step_backoff(&self) -> Duration {
        Duration::from_millis(self.step_backoff_ms)
    }

    pub fn task_pacing(&self) -> Duration {
        Duration::from_millis(self.task_pacing_ms)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }
}

/// Settings persisted as JSON (`config.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub adb_path: PathBuf,
    pub ldconsole_path: PathBuf,
    pub match_threshold: f64,
    /// Directory holding task configurations, one `<name>.json` each.
    pub config_dir: PathBuf,
    /// Declarative task definitions loaded at startup, in order.
    pub definition_files: Vec<PathBuf>,
    pub selected_emulators: Vec<String>,
    /// Target name -> task configuration name.
    pub emulator_bindings: HashMap<String, String>,
    pub timing: Timing,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            adb_path: PathBuf::from("adb"),
            ldconsole_path: PathBuf::from("ldconsole"),
            match_threshold: DEFAULT_THRESHOLD,
            config_dir: PathBuf::from("configs"),
            definition_files: Vec::new(),
            selected_emulators: Vec::new(),
            emulator_bindings: HashMap::new(),
            timing: Timing::default(),
        }
    }
}

impl Settings {
    /// Reads settings from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No settings at {}, using defaults", path.display());
                Ok(Settings::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Name of the task configuration bound to `target`.
    pub fn binding(&self, target: &str) -> Option<&str> {
        self.emulator_bindings.get(target).map(String::as_str)
    }

    pub fn bind(&mut self, target: impl Into<String>, config: impl Into<String>) {
        self.emulator_bindings.insert(target.into(), config.into());
    }

    /// Path of the task configuration called `name`.
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir.join(format!("{name}.json"))
    }
}
