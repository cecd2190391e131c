//! Cadence CLI
//!
//! Play animation scenes on the real clock, or simulate them step by step.

use anyhow::{bail, Result};
use cadence_animation::{State, TimerConfig, UnifiedTimer};
use cadence_core::{EventLoop, ManualClock};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod scene;

use config::SceneConfig;
use scene::{describe, kind_label, Scene};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cadence animation timing engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a scene in real time
    Run {
        /// Scene file
        scene: PathBuf,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Play a scene on a simulated clock and print its timeline
    Simulate {
        /// Scene file
        scene: PathBuf,

        /// Simulated time to stop at
        #[arg(long, default_value = "1000")]
        until_ms: u64,

        /// Time between printed rows
        #[arg(long, default_value = "50")]
        step_ms: u64,
    },

    /// Show the default timer configuration
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run { scene, timeout_ms } => cmd_run(&scene, timeout_ms),
        Commands::Simulate {
            scene,
            until_ms,
            step_ms,
        } => cmd_simulate(&scene, until_ms, step_ms),
        Commands::Info => cmd_info(),
    }
}

fn cmd_run(path: &Path, timeout_ms: Option<u64>) -> Result<()> {
    let config = SceneConfig::load(path)?;
    let event_loop = EventLoop::current();
    UnifiedTimer::instance().configure(&config.timer);

    let scene = Scene::build(&config);
    scene.trace_events();
    info!(
        "Playing {} ({} animations)",
        path.display(),
        scene.entries().len()
    );

    // Quit once every top-level animation has come to a stop
    let remaining = Rc::new(Cell::new(scene.top_level().count()));
    for entry in scene.top_level() {
        let remaining = remaining.clone();
        let event_loop = Rc::downgrade(&event_loop);
        entry.animation.on_state_changed(move |new_state, _| {
            if new_state != State::Stopped {
                return;
            }
            remaining.set(remaining.get().saturating_sub(1));
            if remaining.get() == 0 {
                if let Some(event_loop) = event_loop.upgrade() {
                    event_loop.quit();
                }
            }
        });
    }

    let timed_out = Rc::new(Cell::new(false));
    if let Some(timeout) = timeout_ms {
        let timed_out = timed_out.clone();
        let handle = Rc::downgrade(&event_loop);
        event_loop.single_shot(timeout, move || {
            timed_out.set(true);
            if let Some(event_loop) = handle.upgrade() {
                event_loop.quit();
            }
        });
    }

    let started = event_loop.now_ms();
    scene.schedule(&event_loop);
    event_loop.run();

    if timed_out.get() {
        bail!("Scene still running after {}ms", event_loop.now_ms() - started);
    }
    info!("Scene finished after {}ms", event_loop.now_ms() - started);
    Ok(())
}

fn cmd_simulate(path: &Path, until_ms: u64, step_ms: u64) -> Result<()> {
    if step_ms == 0 {
        bail!("--step-ms must be at least 1");
    }
    let config = SceneConfig::load(path)?;

    let clock = Rc::new(ManualClock::new());
    let event_loop = EventLoop::current();
    event_loop.set_clock(clock.clone());
    UnifiedTimer::instance().configure(&config.timer);

    let scene = Scene::build(&config);
    scene.schedule(&event_loop);

    let headers: Vec<String> = scene
        .entries()
        .iter()
        .map(|e| format!("{}({})", e.name, kind_label(e.animation.kind())))
        .collect();
    let width = headers.iter().map(String::len).max().unwrap_or(0).max(12);

    print!("{:>8}", "time");
    for header in &headers {
        print!("  {:>width$}", header);
    }
    println!();

    let mut time = 0;
    loop {
        event_loop.run_until(time);
        print!("{:>8}", time);
        for entry in scene.entries() {
            print!("  {:>width$}", describe(&entry.animation));
        }
        println!();

        if scene.all_stopped() && time >= scene.last_start() {
            break;
        }
        if time >= until_ms {
            break;
        }
        time = (time + step_ms).min(until_ms);
    }

    Ok(())
}

#[derive(Serialize)]
struct Defaults {
    timer: TimerConfig,
}

fn cmd_info() -> Result<()> {
    println!("Cadence animation timing engine");
    println!("===============================");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Default scene settings:");
    println!();
    print!(
        "{}",
        toml::to_string_pretty(&Defaults {
            timer: TimerConfig::default(),
        })?
    );

    Ok(())
}
