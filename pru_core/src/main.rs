//! # PRU Core simulation binary
//!
//! Runs the orchestration core against the simulation board and an
//! in-process transport. Real firmware builds replace the transport, config
//! source, board, and reset controller with the target's implementations;
//! everything above that boundary is this crate.

use clap::Parser;
use pru_core::orchestrator::Orchestrator;
use pru_core::rt::rt_setup;
use pru_hal::board::SimBoard;
use pru_hal::reset::SimReset;
use pru_hal::storage::FileConfigSource;
use pru_hal::transport::ScriptTransport;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// PRU Core — real-time machine-control bridge (simulation)
#[derive(Parser, Debug)]
#[command(name = "pru_core")]
#[command(version)]
#[command(about = "Real-time orchestration core, simulation build")]
struct Args {
    /// Path to the JSON configuration document.
    #[arg(default_value = "config/default.json")]
    config: PathBuf,

    /// CPU core to pin the control loop to (rt builds).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (rt builds).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("PRU Core v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("PRU Core shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    rt_setup(args.cpu_core, args.rt_priority)?;

    let (transport, _transport_handle) = ScriptTransport::new();
    let config_source = FileConfigSource::new(&args.config);
    let board = Arc::new(SimBoard::new());
    let reset = Arc::new(SimReset::new());
    let reset_latch = reset.requested();

    let mut orchestrator = Orchestrator::new(
        Box::new(transport),
        Box::new(config_source),
        board,
        reset,
    );

    // SIGINT asserts the external reset request line; the state machine
    // takes Running→SysReset from there.
    let reset_request = orchestrator.reset_request();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        reset_request.store(true, Ordering::SeqCst);
    })?;

    orchestrator.run();

    if reset_latch.load(Ordering::SeqCst) {
        info!("System reset latched; a hardware build would reboot here");
    }
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
