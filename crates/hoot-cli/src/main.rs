//! `hootscape` – the owl companion daemon.
//!
//! 1. Loads `~/.hootscape/config.toml` (or `--config`), `.env` and `HOOT_*`
//!    overrides, then command-line flags on top.
//! 2. Opens the owl (serial board or simulation) and starts the movement
//!    scheduler.
//! 3. Greets with the `welcome` macro.
//! 4. Serves `POST /owl/command` and the event monitor until Ctrl-C, then
//!    lets the current gesture finish and parks the owl.

mod config;
mod speaker;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use hoot_cockpit::{CockpitServer, EventMonitor};
use hoot_hal::{OwlActuator, SimOwl};
use hoot_middleware::{EventBus, handler_fn};
use hoot_runtime::{CommandDispatcher, MacroRegistry, MovementScheduler, init_tracing};
use hoot_types::{Command, topics};
use tracing::{info, warn};

use config::{ActuatorKind, Config};

#[derive(Parser, Debug)]
#[command(name = "hootscape", version)]
#[command(about = "Command core of the HootScape owl companion robot")]
struct Args {
    /// Config file (default `~/.hootscape/config.toml`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port of the HTTP command endpoint.
    #[arg(long)]
    port: Option<u16>,

    /// Port of the WebSocket event monitor.
    #[arg(long)]
    monitor_port: Option<u16>,

    /// Device that performs the gestures.
    #[arg(long, value_enum)]
    actuator: Option<ActuatorKind>,

    /// Serial device of the owl board.
    #[arg(long)]
    robot_port: Option<String>,

    /// Skip the welcome greeting.
    #[arg(long)]
    no_greeting: bool,

    /// Write the effective configuration to the config file and exit.
    #[arg(long)]
    write_config: bool,
}

impl Args {
    fn apply(&self, cfg: &mut Config) {
        if let Some(port) = self.port {
            cfg.http_port = port;
        }
        if let Some(port) = self.monitor_port {
            cfg.monitor_port = port;
        }
        if let Some(kind) = self.actuator {
            cfg.actuator = kind;
        }
        if let Some(path) = &self.robot_port {
            cfg.robot_port = path.clone();
        }
        if self.no_greeting {
            cfg.greet_on_startup = false;
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Before the runtime exists: the OTLP exporter is synchronous.
    let _guard = init_tracing("hootscape");

    let path = args.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = config::load_or_default(&path)?;
    args.apply(&mut cfg);

    if args.write_config {
        config::save_to(&cfg, &path)?;
        println!("  {} config written to {}", "✓".green().bold(), path.display().to_string().bold());
        return Ok(());
    }

    print_banner(&cfg);
    let actuator = open_actuator(&cfg)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start Tokio runtime")?;
    runtime.block_on(run(cfg, actuator))
}

async fn run(cfg: Config, actuator: Box<dyn OwlActuator>) -> Result<()> {
    let bus = EventBus::default();
    let _speaker = bus.subscribe(topics::TEXT_RECEIVED, speaker::LoggingSpeaker);
    let _failures = bus.subscribe(topics::MOVEMENT_FAILED, handler_fn(speaker::log_movement_failure));

    let macros = Arc::new(MacroRegistry::with_definitions(cfg.macro_definitions()?)?);
    info!(macros = ?macros.names(), "macro registry loaded");

    let scheduler = MovementScheduler::spawn(actuator, bus.clone(), cfg.scheduler_config());
    let dispatcher = Arc::new(CommandDispatcher::new(bus, macros, scheduler));

    if cfg.greet_on_startup {
        match dispatcher.handle(Command::run_macro("welcome")) {
            Ok(receipt) => info!(steps = receipt.steps_enqueued, "greeting queued"),
            Err(e) => warn!("greeting skipped: {e}"),
        }
    }

    let host: IpAddr = cfg
        .http_host
        .parse()
        .with_context(|| format!("invalid http_host '{}'", cfg.http_host))?;
    let http = CockpitServer::new(Arc::clone(&dispatcher))
        .with_host(host)
        .with_port(cfg.http_port);
    let monitor = EventMonitor::new(Arc::clone(&dispatcher))
        .with_host(host)
        .with_port(cfg.monitor_port);
    let monitor_enabled = cfg.monitor_enabled;

    tokio::select! {
        result = http.run() => result?,
        result = async move {
            if monitor_enabled {
                monitor.run().await
            } else {
                std::future::pending().await
            }
        } => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            println!();
            println!("{}", "⚠  Ctrl-C received – parking the owl …".yellow().bold());
        }
    }

    dispatcher.scheduler().shutdown().await;
    info!("hootscape stopped");
    Ok(())
}

fn open_actuator(cfg: &Config) -> Result<Box<dyn OwlActuator>> {
    match cfg.actuator {
        ActuatorKind::Sim => {
            info!("using simulated owl");
            Ok(Box::new(SimOwl::new("sim-owl").realtime()))
        }
        ActuatorKind::Serial => open_serial(cfg),
    }
}

#[cfg(feature = "serial")]
fn open_serial(cfg: &Config) -> Result<Box<dyn OwlActuator>> {
    use hoot_hal::{SerialOwl, SerialSettings};

    let settings = SerialSettings {
        path: cfg.robot_port.clone(),
        baud_rate: cfg.robot_baudrate,
        timeout: std::time::Duration::from_millis(cfg.robot_timeout_ms),
        speed: cfg.robot_speed,
    };
    let owl = SerialOwl::open(&settings)
        .with_context(|| format!("cannot reach the owl on {}", settings.path))?;
    Ok(Box::new(owl))
}

#[cfg(not(feature = "serial"))]
fn open_serial(_cfg: &Config) -> Result<Box<dyn OwlActuator>> {
    anyhow::bail!("built without the `serial` feature; run with --actuator sim")
}

fn print_banner(cfg: &Config) {
    println!();
    println!("{}", r#"   ,_,   "#.bold().yellow());
    println!("{}", r#"  (O,O)  "#.bold().yellow());
    println!("{}", r#"  (   )  "#.bold().yellow());
    println!("{}", r#"  -"-"-  "#.bold().yellow());
    println!(
        "  {} {}",
        "HootScape".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!(
        "  commands: http://{}:{}/owl/command   actuator: {}",
        cfg.http_host,
        cfg.http_port,
        cfg.actuator.to_string().bold()
    );
    println!();
}
