//! Tasks available in every registry built with [`TaskRegistry::with_builtins`].

use crate::core::executor::TaskExecutor;
use crate::core::params::{ParamDef, ParamsExt};
use crate::core::registry::{TaskDefinition, TaskRegistry};
use crate::core::{Params, TaskStatus};
use crate::error::TaskError;
use crate::perception::{DEFAULT_THRESHOLD, Template};
use std::time::{Duration, Instant};

pub const CLICK_BUTTON: &str = "click_button";
pub const WAIT: &str = "wait";
pub const WAIT_IMAGE: &str = "wait_image";
pub const MULTIPLE_CLICKS: &str = "multiple_clicks";
pub const AUTO_CLICK: &str = "auto_click";

impl TaskRegistry {
    /// A registry holding the built-in tasks.
    pub fn with_builtins() -> Self {
        let mut registry = TaskRegistry::new();
        register_builtins(&mut registry);
        registry
    }
}

pub fn register_builtins(registry: &mut TaskRegistry) {
    registry.register(
        TaskDefinition::new(CLICK_BUTTON, click_button)
            .with_description("Click a button if it is on screen")
            .with_params(vec![
                ParamDef::string("template_path", "buttons/button1.png").describe("button template"),
                ParamDef::float("threshold", DEFAULT_THRESHOLD).describe("match threshold (0-1)"),
            ]),
    );
    registry.register(
        TaskDefinition::new(WAIT, wait)
            .with_description("Wait a number of seconds")
            .with_params(vec![ParamDef::integer("seconds", 1).describe("seconds to wait")]),
    );
    registry.register(
        TaskDefinition::new(WAIT_IMAGE, wait_image)
            .with_description("Wait until an image is on screen")
            .with_params(vec![
                ParamDef::string("template_path", "").describe("image template"),
                ParamDef::float("threshold", DEFAULT_THRESHOLD),
                ParamDef::float("timeout", 30.0).describe("seconds before giving up"),
                ParamDef::float("interval", 1.0).describe("seconds between checks"),
            ]),
    );
    registry.register(
        TaskDefinition::new(MULTIPLE_CLICKS, multiple_clicks)
            .with_description("Click images one after the other")
            .with_params(vec![
                ParamDef::list("images", &[]).describe("templates, in click order"),
                ParamDef::float("click_timeout", 5.0).describe("seconds to wait for each image"),
                ParamDef::float("check_interval", 1.0),
                ParamDef::boolean("wait_miss", false)
                    .describe("wait for each image to disappear after the click"),
                ParamDef::float("threshold", DEFAULT_THRESHOLD),
            ]),
    );
    registry.register(
        TaskDefinition::new(AUTO_CLICK, auto_click)
            .with_description("Keep clicking any of the templates until stopped")
            .with_params(vec![
                ParamDef::list("templates", &[]),
                ParamDef::float("threshold", DEFAULT_THRESHOLD),
                ParamDef::float("interval", 1.0).describe("seconds between two screen scans"),
            ]),
    );
}

fn click_button(ctx: &TaskExecutor, params: &Params) -> Result<TaskStatus, TaskError> {
    let actuator = ctx.actuator()?;
    let template = Template::from(params.str_param("template_path")?);
    let threshold = params.f64_param("threshold")?;
    let clicked = actuator.find_and_click(&[template], threshold)?;
    Ok(clicked.into())
}

fn wait(ctx: &TaskExecutor, params: &Params) -> Result<TaskStatus, TaskError> {
    let seconds = params.u64_param("seconds")?;
    log::info!("[{}] waiting {}s", ctx.target(), seconds);
    Ok(ctx.running().wait(Duration::from_secs(seconds)).into())
}

fn wait_image(ctx: &TaskExecutor, params: &Params) -> Result<TaskStatus, TaskError> {
    let actuator = ctx.actuator()?;
    let templates = [Template::from(params.str_param("template_path")?)];
    let threshold = params.f64_param("threshold")?;
    let seen = poll(
        ctx,
        params.secs_param("timeout")?,
        params.secs_param("interval")?,
        || Ok(actuator.find(&templates, threshold, None)?.found),
    )?;
    if !seen {
        log::warn!("[{}] {} did not appear", ctx.target(), templates[0].name());
    }
    Ok(seen.into())
}

fn multiple_clicks(ctx: &TaskExecutor, params: &Params) -> Result<TaskStatus, TaskError> {
    let actuator = ctx.actuator()?;
    let timeout = params.secs_param("click_timeout")?;
    let interval = params.secs_param("check_interval")?;
    let wait_miss = params.bool_param("wait_miss")?;
    let threshold = params.f64_param("threshold")?;

    for image in params.list_param("images")? {
        let templates = [Template::from(image.as_str())];

        let clicked = poll(ctx, timeout, interval, || {
            let result = actuator.find(&templates, threshold, None)?;
            match result.position() {
                Some((x, y)) => {
                    log::info!("[{}] click {}", ctx.target(), image);
                    actuator.click(x, y);
                    Ok(true)
                }
                None => Ok(false),
            }
        })?;
        if !clicked {
            log::warn!("[{}] {} did not appear in time", ctx.target(), image);
            return Ok(TaskStatus::Failed);
        }

        if wait_miss {
            let gone = poll(ctx, timeout, interval, || {
                Ok(!actuator.find(&templates, threshold, None)?.found)
            })?;
            if !gone {
                log::warn!("[{}] {} did not disappear in time", ctx.target(), image);
                return Ok(TaskStatus::Failed);
            }
        }
    }
    Ok(TaskStatus::Success)
}

/// Runs until the executor's running flag is cleared, clicking every template
/// visible on each scan.
fn auto_click(ctx: &TaskExecutor, params: &Params) -> Result<TaskStatus, TaskError> {
    let actuator = ctx.actuator()?;
    let templates: Vec<Template> = params
        .list_param("templates")?
        .into_iter()
        .map(Template::from)
        .collect();
    let threshold = params.f64_param("threshold")?;
    let interval = params.secs_param("interval")?;

    if templates.is_empty() {
        return Err(TaskError::InvalidParam {
            name: "templates".to_string(),
            reason: "no template to look for".to_string(),
        });
    }

    log::info!("[{}] auto click started with {} template(s)", ctx.target(), templates.len());
    while ctx.is_running() {
        for template in &templates {
            match actuator.find_and_click(std::slice::from_ref(template), threshold) {
                Ok(true) => log::info!("[{}] clicked {}", ctx.target(), template.name()),
                Ok(false) => {}
                Err(e) => log::warn!("[{}] scan for {} failed: {}", ctx.target(), template.name(), e),
            }
            if !ctx.is_running() {
                break;
            }
        }
        ctx.running().wait(interval);
    }
    log::info!("[{}] auto click stopped", ctx.target());
    Ok(TaskStatus::Success)
}

/// Calls `check` until it returns true, the timeout elapses or the worker stops.
///
/// A failed check is logged and polled again on the next interval.
fn poll<F>(ctx: &TaskExecutor, timeout: Duration, interval: Duration, mut check: F) -> Result<bool, TaskError>
where
    F: FnMut() -> Result<bool, TaskError>,
{
    let started = Instant::now();
    loop {
        match check() {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => log::warn!("[{}] check failed, polling again: {}", ctx.target(), e),
        }
        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() || !ctx.running().wait(interval.min(remaining)) {
            return Ok(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timing;
    use crate::perception::replay::ReplayTransport;
    use crate::error::TransportError;
    use crate::perception::{PerceptionActuator, Transport};
    use image::{GrayImage, Luma};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn params(value: serde_json::Value) -> Params {
        serde_json::from_value(value).unwrap()
    }

    fn blank() -> GrayImage {
        GrayImage::from_pixel(40, 30, Luma([0]))
    }

    fn with_button(path: &std::path::Path) -> GrayImage {
        let mut button = GrayImage::new(6, 6);
        for (x, y, px) in button.enumerate_pixels_mut() {
            *px = Luma([((x * 37 + y * 91) % 255) as u8]);
        }
        button.save(path).unwrap();

        let mut screen = blank();
        image::imageops::replace(&mut screen, &button, 20, 10);
        screen
    }

    fn executor(frames: Vec<GrayImage>) -> (TaskExecutor, Arc<ReplayTransport>) {
        let transport = Arc::new(ReplayTransport::new(frames));
        let actuator = PerceptionActuator::new("emu-builtin", transport.clone());
        let executor = TaskExecutor::new("emu-builtin", Arc::new(TaskRegistry::with_builtins()))
            .with_timing(Timing::immediate())
            .with_actuator(actuator);
        (executor, transport)
    }

    fn button_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().join("button.png")
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = TaskRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec![AUTO_CLICK, CLICK_BUTTON, MULTIPLE_CLICKS, WAIT, WAIT_IMAGE]
        );
        assert_eq!(registry.resolve(WAIT).unwrap().param("seconds").unwrap().default, json!(1));
    }

    #[test]
    fn test_click_button_succeeds_only_when_clicked() {
        let dir = tempfile::tempdir().unwrap();
        let path = button_path(&dir);
        let screen = with_button(&path);
        let (executor, transport) = executor(vec![blank(), screen]);
        let p = params(json!({"template_path": path.to_str().unwrap()}));

        assert_eq!(executor.execute_task(CLICK_BUTTON, &p), TaskStatus::Failed);
        assert_eq!(executor.execute_task(CLICK_BUTTON, &p), TaskStatus::Success);

        assert_eq!(transport.taps(), vec![(23, 13)]);
    }

    #[test]
    fn test_wait_image_polls_until_visible() {
        let dir = tempfile::tempdir().unwrap();
        let path = button_path(&dir);
        let screen = with_button(&path);
        let (executor, transport) = executor(vec![blank(), blank(), screen]);
        let p = params(json!({
            "template_path": path.to_str().unwrap(),
            "timeout": 5,
            "interval": 0
        }));

        assert_eq!(executor.execute_task(WAIT_IMAGE, &p), TaskStatus::Success);
        assert_eq!(transport.capture_count(), 3);
    }

    /// Fails the first capture, then replays frames.
    struct FirstCaptureFails {
        inner: Arc<ReplayTransport>,
        failed: AtomicBool,
    }

    impl Transport for FirstCaptureFails {
        fn capture(&self, target: &str) -> Result<Vec<u8>, TransportError> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(TransportError::Unavailable(target.to_string()));
            }
            self.inner.capture(target)
        }

        fn tap(&self, target: &str, x: u32, y: u32) -> Result<(), TransportError> {
            self.inner.tap(target, x, y)
        }
    }

    #[test]
    fn test_wait_image_survives_a_failed_capture() {
        let dir = tempfile::tempdir().unwrap();
        let path = button_path(&dir);
        let screen = with_button(&path);
        let replay = Arc::new(ReplayTransport::new(vec![screen]));
        let transport = Arc::new(FirstCaptureFails {
            inner: replay.clone(),
            failed: AtomicBool::new(false),
        });
        let executor = TaskExecutor::new("emu-flaky", Arc::new(TaskRegistry::with_builtins()))
            .with_timing(Timing::immediate())
            .with_actuator(PerceptionActuator::new("emu-flaky", transport));
        let p = params(json!({
            "template_path": path.to_str().unwrap(),
            "timeout": 5,
            "interval": 0
        }));

        assert_eq!(executor.execute_task(WAIT_IMAGE, &p), TaskStatus::Success);
        assert_eq!(replay.capture_count(), 1);
    }

    #[test]
    fn test_multiple_clicks_times_out_on_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = button_path(&dir);
        let screen = with_button(&path);
        let (executor, transport) = executor(vec![screen, blank()]);
        let p = params(json!({
            "images": [path.to_str().unwrap(), path.to_str().unwrap()],
            "click_timeout": 0.05,
            "check_interval": 0.01
        }));

        assert_eq!(executor.execute_task(MULTIPLE_CLICKS, &p), TaskStatus::Failed);
        assert_eq!(transport.taps().len(), 1);
    }

    #[test]
    fn test_multiple_clicks_waits_for_disappearance() {
        let dir = tempfile::tempdir().unwrap();
        let path = button_path(&dir);
        let screen = with_button(&path);
        let (executor, transport) = executor(vec![screen.clone(), screen, blank()]);
        let p = params(json!({
            "images": path.to_str().unwrap(),
            "click_timeout": 5,
            "check_interval": 0,
            "wait_miss": true
        }));

        assert_eq!(executor.execute_task(MULTIPLE_CLICKS, &p), TaskStatus::Success);
        assert_eq!(transport.taps().len(), 1);
        assert_eq!(transport.capture_count(), 3);
    }

    #[test]
    fn test_auto_click_returns_when_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let path = button_path(&dir);
        let screen = with_button(&path);
        let (executor, transport) = executor(vec![screen]);
        let running = executor.running().clone();
        let p = params(json!({"templates": path.to_str().unwrap(), "interval": 0.01}));

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            running.stop();
        });
        assert_eq!(executor.execute_task(AUTO_CLICK, &p), TaskStatus::Success);
        stopper.join().unwrap();

        assert!(!transport.taps().is_empty());
    }

    #[test]
    fn test_wait_without_actuator() {
        let executor = TaskExecutor::new("dry", Arc::new(TaskRegistry::with_builtins()))
            .with_timing(Timing::immediate());
        assert_eq!(executor.execute_task(WAIT, &params(json!({"seconds": 0}))), TaskStatus::Success);
        assert_eq!(executor.execute_task(CLICK_BUTTON, &Params::new()), TaskStatus::Failed);
    }
}
