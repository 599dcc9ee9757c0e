//! # EVO Worker Supervisor Binary
//!
//! Worker-side harness: loads the worker configuration, publishes this
//! process's pid to the shared registry, and drives the supervisor's timers
//! on a single-threaded runtime until the drain sequence ends the process.
//!
//! # Usage
//!
//! ```bash
//! # Worker slot 2 of the group described in worker.toml
//! evo_worker --config /etc/evo/worker.toml --worker-id 2
//!
//! # Verbose JSON logs, registry in a custom directory
//! evo_worker -c worker.toml -w 0 --registry-dir /tmp/evo_workers -v --json
//! ```

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use clap::Parser;
use evo_common::prelude::*;
use evo_worker::drain::DrainReason;
use evo_worker::host::WorkerHost;
use evo_worker::registry::FsPidRegistry;
use evo_worker::supervisor::{Collaborators, WorkerSupervisor};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// EVO Worker - per-process health and drain supervisor
#[derive(Parser, Debug)]
#[command(name = "evo_worker")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Worker health monitoring with graceful drain and peer CPU watchdog")]
struct Args {
    /// Path to the worker configuration file (worker.toml).
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Slot index of this worker within the group.
    #[arg(short, long)]
    worker_id: u32,

    /// Directory of the shared worker pid registry.
    #[arg(long, default_value = DEFAULT_REGISTRY_DIR)]
    registry_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

/// Host side of this harness; records the exit request.
#[derive(Clone)]
struct ProcessHost {
    exit_requested: Rc<Cell<bool>>,
}

impl WorkerHost for ProcessHost {
    fn deny_new_requests(&mut self, worker_id: u32) {
        info!(worker_id, "routing to worker stopped");
    }

    fn terminate_process(&mut self) {
        self.exit_requested.set(true);
    }
}

fn main() {
    if let Err(e) = run() {
        error!("worker supervisor failed: {}", e);
        std::process::exit(1);
    }
    info!("worker supervisor exiting");
    std::process::exit(0);
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = WorkerConfig::load(&args.config);
    setup_tracing(&args, config.as_ref().ok());
    let config = config.map_err(|e| match e {
        ConfigError::FileNotFound => format!("{}: {e}", args.config.display()),
        other => other.to_string(),
    })?;

    info!("EVO worker v{} starting...", env!("CARGO_PKG_VERSION"));
    let settings = config.resolve(args.worker_id)?;

    let host = ProcessHost {
        exit_requested: Rc::new(Cell::new(false)),
    };
    let registry = FsPidRegistry::open(&args.registry_dir)?;
    let mut supervisor = WorkerSupervisor::new(
        settings,
        std::process::id(),
        Collaborators::system(host.clone(), registry),
    );
    supervisor.start(Instant::now())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(event_loop(&mut supervisor))?;

    info!(
        worker_id = supervisor.settings().worker_id,
        reason = ?supervisor.drain_reason(),
        exit_requested = host.exit_requested.get(),
        total_requests = supervisor.total_requests(),
        "worker drained"
    );
    Ok(())
}

/// Sleep until the next timer deadline, deliver due timers, repeat.
/// A shutdown signal starts a graceful drain instead of exiting at once.
async fn event_loop(supervisor: &mut WorkerSupervisor) -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;

    while let Some(deadline) = supervisor.next_deadline() {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline.into()) => {
                supervisor.run_due(Instant::now());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C)");
                supervisor.begin_drain(DrainReason::Signal, Instant::now());
            }
            _ = sigterm.recv() => {
                info!("Received shutdown signal (SIGTERM)");
                supervisor.begin_drain(DrainReason::Signal, Instant::now());
            }
        }
        if supervisor.is_terminated() {
            break;
        }
    }
    Ok(())
}

/// Setup tracing subscriber from CLI arguments and the loaded config.
fn setup_tracing(args: &Args, config: Option<&WorkerConfig>) {
    let filter = match config {
        _ if args.verbose => EnvFilter::from_default_env().add_directive(Level::DEBUG.into()),
        Some(config) if config.debug => {
            EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
        }
        Some(config) => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.shared.log_level.as_directive())),
        None => EnvFilter::from_default_env().add_directive(Level::INFO.into()),
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_line_number(true)
            .init();
    }
}
