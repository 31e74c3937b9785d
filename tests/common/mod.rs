#![allow(dead_code)]

use image::{GrayImage, Luma};
use log::{LevelFilter, Log, Metadata, Record};
use std::sync::{Mutex, Once, PoisonError};
use tapflow::{Params, TaskError, TaskExecutor, TaskStatus};

struct CaptureLogger {
    lines: Mutex<Vec<String>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.args().to_string());
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    lines: Mutex::new(Vec::new()),
};
static INIT: Once = Once::new();

/// Installs the capturing logger once per test binary.
pub fn init_logging() {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).expect("no other logger installed");
        log::set_max_level(LevelFilter::Debug);
    });
}

/// Captured lines logged for `target`. Tests use distinct targets, so parallel
/// tests do not see each other's lines.
pub fn lines_for(target: &str) -> Vec<String> {
    let prefix = format!("[{target}]");
    LOGGER
        .lines
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .filter(|line| line.starts_with(&prefix))
        .cloned()
        .collect()
}

/// Deterministic pseudo-random texture.
pub fn noise(width: u32, height: u32, seed: u32) -> GrayImage {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    GrayImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        Luma([(state >> 24) as u8])
    })
}

/// `screen` with `patch` pasted at `(x, y)`.
pub fn paste(screen: &GrayImage, patch: &GrayImage, x: u32, y: u32) -> GrayImage {
    let mut out = screen.clone();
    image::imageops::replace(&mut out, patch, i64::from(x), i64::from(y));
    out
}

pub fn succeed(_: &TaskExecutor, _: &Params) -> Result<TaskStatus, TaskError> {
    Ok(TaskStatus::Success)
}

pub fn fail(_: &TaskExecutor, _: &Params) -> Result<TaskStatus, TaskError> {
    Ok(TaskStatus::Failed)
}
