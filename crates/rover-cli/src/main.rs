//! `rover-cli` – runs the rover control core against the simulated arena.
//!
//! The binary:
//!
//! 1. Loads `~/.rover/config.toml` (or `$ROVER_CONFIG`), writing the
//!    defaults on first run.
//! 2. Takes the rover name from the first argument, falling back to the
//!    configured `name`.
//! 3. Starts the simulated sensor producer on its own thread and the
//!    controller loop on a Tokio runtime, then sends the configured start
//!    mode code.
//! 4. Stops both on **Ctrl-C** between ticks and prints a short summary.

mod config;
mod sim_driver;

use std::sync::Arc;

use colored::Colorize;
use tokio::sync::watch;
use tracing::warn;

use rover_middleware::{EventBus, Topic};
use rover_perception::{SensorAggregator, TargetClassifier};
use rover_runtime::{ControlContext, RoverLoop, init_tracing};
use rover_types::{Event, EventPayload};

use crate::sim_driver::SimDriver;

fn main() {
    let _tracing = init_tracing("rover");

    print_banner();

    let cfg = load_config();
    let name = std::env::args().nth(1).unwrap_or_else(|| cfg.name.clone());
    println!("  Rover name: {}", name.bold());

    // ── Shared state ──────────────────────────────────────────────────────
    let bus = EventBus::default();
    let sensors = Arc::new(SensorAggregator::new(cfg.sensor_settings()));
    let targets = Arc::new(TargetClassifier::default());
    let (stop_tx, stop_rx) = watch::channel(false);

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the rover …".yellow().bold());
        let _ = stop_tx.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the rover will run until killed");
    }

    // ── Controller and sensor producer ────────────────────────────────────
    let rover = RoverLoop::new(
        cfg.loop_config(&name),
        bus.clone(),
        Arc::clone(&sensors),
        Arc::clone(&targets),
    );
    let driver = SimDriver::new(&cfg.sim, &bus, sensors, targets);
    let sim = match sim_driver::spawn(driver, cfg.tick_period(), stop_rx.clone()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to start the sim thread".red());
            std::process::exit(1);
        }
    };

    let start = Event::new(format!("{name}::cli"), EventPayload::ModeCode(cfg.start_mode));
    if let Err(e) = bus.publish_to(Topic::Operator, start) {
        warn!(error = %e, "start mode not sent");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to start the Tokio runtime".red());
            std::process::exit(1);
        }
    };
    println!("  {} Press Ctrl-C to stop.\n", "Running.".green().bold());
    let ctx = runtime.block_on(rover.run(ControlContext::default(), stop_rx));

    // ── Summary ───────────────────────────────────────────────────────────
    println!();
    println!("  Ticks:  {}", ctx.ticks());
    println!("  Mode:   {:?}", ctx.mode());
    if let Some(stack) = ctx.stack() {
        println!("  Stack:  {:?}", stack.kinds());
    }
    match sim.join() {
        Ok(arena) => println!(
            "  Cubes:  {} delivered, {} left",
            arena.delivered().to_string().green().bold(),
            arena.remaining_cubes()
        ),
        Err(_) => warn!("sim thread panicked"),
    }
}

fn load_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   ____                        "#.bold().cyan());
    println!("{}", r#"  / __ \____ _   _____  _____  "#.bold().cyan());
    println!("{}", r#" / /_/ / __ \ | / / _ \/ ___/  "#.bold().cyan());
    println!("{}", r#"/ _, _/ /_/ / |/ /  __/ /      "#.bold().cyan());
    println!("{}", r#"/_/ |_|\____/|___/\___/_/       "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Rover".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Search-and-retrieve control core");
    println!();
}
