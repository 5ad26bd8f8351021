use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rusty_nozzle::args::Args;
use rusty_nozzle::camera::{DeviceId, SourceOptions};
use rusty_nozzle::config::AppConfig;
use rusty_nozzle::controls::ChainList;
use rusty_nozzle::output::HeadlessSink;
use rusty_nozzle::presentation::{FrameSink, OverlayStyle, Presenter, RefreshTimer};
use rusty_nozzle::{AlgorithmRegistry, PipelineWorker};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if args.list {
        return list_cameras();
    }

    let registry = AlgorithmRegistry::global();
    if args.list_algorithms {
        println!("{}", "Available algorithms:".bold());
        for name in registry.available() {
            let unit = registry
                .resolve(&name)
                .with_context(|| format!("Failed to load {name}"))?;
            let settings: Vec<&str> = unit.settings().iter().map(|s| s.name()).collect();
            println!("  {:<22} {}", name.green(), settings.join(", ").dimmed());
        }
        return Ok(());
    }

    let config = AppConfig::load(&args.config)?;

    let device: DeviceId = args
        .device
        .as_deref()
        .unwrap_or(&config.source.device)
        .parse()?;
    let options = SourceOptions {
        width: config.source.width,
        height: config.source.height,
        fps: args.fps.unwrap_or(config.source.fps),
    };
    let chain = args.chain.clone().unwrap_or_else(|| config.pipeline.chain.clone());

    let mut worker = PipelineWorker::open_device(registry, &device, options)
        .with_context(|| format!("Failed to open video source {device}"))?;
    let (width, height) = worker.resolution();
    println!(
        "{}",
        format!("Opened {} ({}x{})", worker.source_name(), width, height).green()
    );

    let skipped = worker.set_chain(&chain);
    for err in &skipped {
        println!("{}", format!("Skipping chain entry: {err}").yellow());
    }
    println!("Chain: {}", chain.join(" -> "));

    let chain = ChainList::new(&chain);
    let style = config.overlay_style();

    let result = if args.headless || !cfg!(feature = "gui") {
        if !args.headless {
            warn!("built without the `gui` feature, running headless");
        }
        run_headless(&worker, &args, &config, chain, style)
    } else {
        run_window(&worker, &args, &config, chain, style)
    };

    // Orderly shutdown: the timer is already cancelled, stop and wait for the worker.
    worker.join();
    result
}

fn run_headless(
    worker: &PipelineWorker,
    args: &Args,
    config: &AppConfig,
    chain: ChainList,
    style: OverlayStyle,
) -> Result<()> {
    let sink = HeadlessSink::new(args.snapshot.clone());
    let mut presenter = Presenter::new(sink, style, chain);
    present_loop(&mut presenter, worker, config.display.refresh_hz, args.frames)?;
    presenter.sink().finish()?;
    Ok(())
}

#[cfg(feature = "gui")]
fn run_window(
    worker: &PipelineWorker,
    args: &Args,
    config: &AppConfig,
    chain: ChainList,
    style: OverlayStyle,
) -> Result<()> {
    use rusty_nozzle::output::WindowOutput;

    let (width, height) = worker.resolution();
    let window = WindowOutput::new(&config.display.window_title, width as usize, height as usize)?;
    println!("Controls: [Up/Down] select  [ [ ] ] move  [Del] remove  [A] add  [,/.] setting  [Left/Right] adjust  [Space] toggle  [O] overlay  [Esc] quit");
    let mut presenter = Presenter::new(window, style, chain);
    present_loop(&mut presenter, worker, config.display.refresh_hz, args.frames)
}

#[cfg(not(feature = "gui"))]
fn run_window(
    worker: &PipelineWorker,
    args: &Args,
    config: &AppConfig,
    chain: ChainList,
    style: OverlayStyle,
) -> Result<()> {
    run_headless(worker, args, config, chain, style)
}

/// Tick the presenter on the refresh timer until the sink closes, the frame
/// budget is spent, or the worker dies.
fn present_loop<S: FrameSink>(
    presenter: &mut Presenter<S>,
    worker: &PipelineWorker,
    refresh_hz: u32,
    max_frames: Option<u64>,
) -> Result<()> {
    let mut timer = RefreshTimer::from_rate(refresh_hz);
    timer.arm(Instant::now());

    loop {
        if let Some(wait) = timer.time_until(Instant::now()) {
            thread::sleep(wait);
        }
        if !timer.poll(Instant::now()) {
            continue;
        }

        presenter.tick(worker)?;

        let mut close = false;
        for command in presenter.sink_mut().commands() {
            close |= presenter.command(command, worker).close;
        }

        let done = max_frames.is_some_and(|n| presenter.rendered() >= n);
        if close || done || !presenter.sink().is_open() {
            break;
        }
        if !worker.is_running() {
            warn!("pipeline worker is no longer running");
            break;
        }
        timer.arm(Instant::now());
    }

    timer.cancel();
    let stats = worker.stats();
    info!(
        rendered = presenter.rendered(),
        frames_read = stats.frames_read,
        stage_faults = stats.stage_faults,
        "presentation stopped"
    );
    Ok(())
}

#[cfg(feature = "camera")]
fn list_cameras() -> Result<()> {
    let cameras = rusty_nozzle::camera::list_cameras()?;
    println!("{}", "Available Cameras:".bold());
    println!("{:<5} | {:<30}", "Index", "Name");
    println!("{}", "-".repeat(40));
    for (index, name) in cameras {
        println!("{:<5} | {:<30}", index.green(), name);
    }
    Ok(())
}

#[cfg(not(feature = "camera"))]
fn list_cameras() -> Result<()> {
    println!(
        "{}",
        "Camera support is not compiled in (enable the `camera` feature).".yellow()
    );
    println!("Use --device <image file | directory | synthetic> instead.");
    Ok(())
}
