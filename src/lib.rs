//! # Tapflow
//!
//! A task orchestration engine for automating Android emulators: screenshot,
//! template matching and taps, composed into named tasks and run per device on
//! dedicated worker threads.
//!
//! ## Features
//!
//! - **Named Tasks**: a registry of parameterized behaviors with pre-tasks and post-tasks
//! - **Step Flows**: sequenced sub-actions with per-step retry, timeout and backoff
//! - **Fail-Stop Configurations**: operator-authored task lists that stop at the first failure
//! - **Declarative Tasks**: whole tasks described in JSON, overriding built-ins by name
//! - **One Worker per Device**: targets never block each other, stopping is cooperative
//! - **ADB Transport**: feature-gated (`adb`, on by default); a replay transport covers dry runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tapflow::prelude::*;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(TaskRegistry::with_builtins());
//! let transport = Arc::new(AdbTransport::new("adb").with_serial("LDPlayer", "emulator-5554"));
//! let executor = TaskExecutor::new("LDPlayer", registry)
//!     .with_actuator(PerceptionActuator::new("LDPlayer", transport));
//!
//! let config = TaskConfig::from_json(
//!     r#"{"name": "daily", "tasks": [{"name": "click_button", "params": {"template_path": "buttons/ok.png"}}]}"#,
//! ).unwrap();
//!
//! let mut worker = WorkerSupervisor::new(Arc::new(executor), config);
//! worker.start().unwrap();
//! // ...
//! worker.stop();
//! worker.join();
//! ```
//!
//! ## Module Organization
//!
//! - [`step`] and [`flow`]: the retry/timeout state machine
//! - [`registry`], [`params`] and [`builtin`]: task definitions
//! - [`executor`]: runs tasks and task configurations against one target
//! - [`definition`]: declarative task definitions
//! - [`perception`]: screenshots, template matching and taps
//! - [`worker`]: one thread per target
//! - [`config`]: operator settings

// ============================================================================
// Core Module
// ============================================================================

mod core;

pub mod config;
pub mod error;
pub mod perception;
pub mod worker;

pub use crate::core::{builtin, definition, executor, flow, params, registry, step, task_config, telemetry, validation};

// ============================================================================
// Public Re-exports
// ============================================================================

pub use crate::core::{ParamValue, Params, TaskStatus};

pub use crate::core::definition::{DeclarativeTask, DefinitionSource, StepAction, StepDef, load_definitions};
pub use crate::core::executor::{MAX_NESTING, RunningFlag, TaskExecutor};
pub use crate::core::flow::TaskFlow;
pub use crate::core::params::{ParamDef, ParamKind, ParamsExt, TaskRef};
pub use crate::core::registry::{TaskDefinition, TaskLogic, TaskRegistry};
pub use crate::core::step::{StepResult, StepState, TaskStep};
pub use crate::core::task_config::{TaskConfig, TaskInvocation};
pub use crate::core::telemetry::{MemoryTelemetry, Telemetry, TraceEntry};
pub use crate::core::validation::{ValidationIssue, ValidationResult, validate_config};

pub use config::{Settings, Timing};
pub use error::{
    CaptureError, ConfigError, DefinitionError, PerceptionError, TaskError, TemplateError,
    TransportError, WorkerError,
};
#[cfg(feature = "adb")]
pub use perception::adb::AdbTransport;
pub use perception::replay::ReplayTransport;
pub use perception::{MatchResult, PerceptionActuator, Region, Template, Transport};
pub use worker::{WorkerPool, WorkerStatus, WorkerSupervisor};

// ============================================================================
// Prelude Modules - Convenient Bulk Imports
// ============================================================================

/// The main prelude: everything needed to define tasks and run workers.
///
/// # Example
/// ```rust
/// use tapflow::prelude::*;
/// ```
pub mod prelude {
    #[cfg(feature = "adb")]
    pub use super::AdbTransport;
    pub use super::{
        // Perception
        PerceptionActuator,
        ReplayTransport,
        Template,
        Transport,
        // Tasks
        ParamDef,
        Params,
        ParamsExt,
        TaskConfig,
        TaskDefinition,
        TaskError,
        TaskExecutor,
        TaskFlow,
        TaskLogic,
        TaskRegistry,
        TaskStatus,
        TaskStep,
        // Workers
        WorkerPool,
        WorkerStatus,
        WorkerSupervisor,
    };
}

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
