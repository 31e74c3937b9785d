//! Runs a task configuration against two replayed devices, no emulator needed.
//!
//! This example demonstrates:
//! - Registering a task in code next to the built-in ones
//! - Loading a declarative task definition
//! - Driving two targets from one shared registry with a `WorkerPool`
//! - Reading back what happened from the telemetry and the replayed taps
//!
//! Run with `RUST_LOG=info cargo run --example dry_run`.

use image::{GrayImage, Luma};
use std::sync::Arc;
use std::time::Duration;
use tapflow::prelude::*;
use tapflow::{DefinitionSource, MemoryTelemetry, Timing, load_definitions};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Scripted screens
// ============================================================================

/// A textured square standing in for the "claim" button.
fn claim_button() -> GrayImage {
    GrayImage::from_fn(16, 16, |x, y| Luma([((x * 53 + y * 97 + x * y * 7) % 251) as u8]))
}

fn screen_with_button(x: u32, y: u32) -> GrayImage {
    let mut screen = GrayImage::from_pixel(320, 180, Luma([30]));
    image::imageops::replace(&mut screen, &claim_button(), i64::from(x), i64::from(y));
    screen
}

fn empty_screen() -> GrayImage {
    GrayImage::from_pixel(320, 180, Luma([30]))
}

// ============================================================================
// A task written in code
// ============================================================================

fn claim(ctx: &TaskExecutor, params: &Params) -> Result<TaskStatus, TaskError> {
    let actuator = ctx.actuator()?;
    let button = Template::image("claim", claim_button());
    let attempts = params.u64_param("attempts")?;

    let mut flow = ctx
        .flow()
        .step_with(
            "find claim button",
            || Ok(actuator.find_and_click(std::slice::from_ref(&button), 0.9)?.into()),
            u32::try_from(attempts).unwrap_or(u32::MAX),
            Some(Duration::from_secs(10)),
        );
    Ok(flow.run())
}

const DECLARATIVE: &str = r#"{
    "name": "daily_round",
    "post_tasks": ["wait"],
    "steps": [
        {"name": "claim", "action": "exist_task", "task": "claim", "attempts": 5},
        {"name": "settle", "action": "sleep", "seconds": 0.2}
    ]
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Registry: built-ins, one code task, one declarative task
    let mut registry = TaskRegistry::with_builtins();
    registry.register(
        TaskDefinition::new("claim", claim)
            .with_description("Click the claim button once it shows up")
            .with_params(vec![ParamDef::integer("attempts", 3)]),
    );
    let registry = Arc::new(load_definitions(
        registry,
        &[DefinitionSource::inline("daily_round.json", DECLARATIVE)],
    )?);

    let config = TaskConfig::from_json(
        r#"{"name": "daily", "tasks": [{"name": "daily_round"}, {"name": "wait", "params": {"seconds": 0}}]}"#,
    )?;
    tapflow::validate_config(&registry, &config).log_summary("dry-run");

    // Two devices, each with its own scripted screens
    let telemetry = Arc::new(MemoryTelemetry::new());
    let timing = Timing {
        step_backoff_ms: 100,
        task_pacing_ms: 100,
        cycle_delay_ms: 500,
    };

    let mut pool = WorkerPool::new();
    let mut transports = Vec::new();
    for (target, screens) in [
        ("emulator-0", vec![empty_screen(), screen_with_button(40, 60)]),
        ("emulator-1", vec![empty_screen(), empty_screen(), screen_with_button(200, 100)]),
    ] {
        let transport = Arc::new(ReplayTransport::new(screens));
        let executor = TaskExecutor::new(target, Arc::clone(&registry))
            .with_timing(timing)
            .with_telemetry(telemetry.clone())
            .with_actuator(PerceptionActuator::new(target, transport.clone()));
        pool.start(Arc::new(executor), config.clone())?;
        transports.push((target, transport));
    }

    std::thread::sleep(Duration::from_secs(3));
    pool.shutdown();

    // What happened
    for (target, status) in pool.statuses() {
        let cycles = pool.get(&target).map_or(0, WorkerSupervisor::cycles);
        println!("{target}: {status} after {cycles} cycle(s)");
    }
    for (target, transport) in &transports {
        println!("{target}: taps {:?}", transport.taps());
    }
    for trace in telemetry.get_traces().iter().take(12) {
        println!(
            "{} {:<12} {:<10} {:>5}ms",
            trace.target,
            trace.task,
            trace.status.to_string(),
            trace.elapsed_ms
        );
    }

    Ok(())
}
