use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by the command channel that talks to a target.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command `{command}` exited with status {status}: {stderr}")]
    Status {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("target `{0}` is unavailable")]
    Unavailable(String),

    #[error("replay frame could not be encoded: {0}")]
    Frame(String),
}

/// The transport could not produce a decodable screenshot.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture on target `{target}` failed: {source}")]
    Transport {
        target: String,
        #[source]
        source: TransportError,
    },

    #[error("screenshot from target `{target}` could not be decoded: {source}")]
    Decode {
        target: String,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to load template `{path}`: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Genuine faults of a perception call. A template that is simply not on
/// screen is not an error, see [`MatchResult`](crate::perception::MatchResult).
#[derive(Debug, Error)]
pub enum PerceptionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Error returned by a task behavior. The executor converts it into a failed task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Perception(#[from] PerceptionError),

    #[error("context for `{0}` has no bound actuator")]
    NoActuator(String),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("{0}")]
    Message(String),
}

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read task definition `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed task definition in `{origin}`: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("a worker is already running for target `{0}`")]
    AlreadyRunning(String),

    #[error("failed to spawn worker thread for `{target}`: {source}")]
    Spawn {
        target: String,
        #[source]
        source: std::io::Error,
    },
}
