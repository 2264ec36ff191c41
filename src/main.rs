//! Framegrab CLI
//!
//! Runs the acquisition pipeline against the emulated camera transport;
//! a vendor backend plugs in through the same transport trait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use framegrab::{cli::Args, CancelToken, CaptureSupervisor, MockTransport};
use tracing::{error, info, warn};

const EXIT_FATAL: i32 = 1;
/// 128 + SIGINT, the conventional code for an interrupted process.
const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let args = Args::parse();

    // Initialize logging; --verbose raises the default level.
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    info!("framegrab v{}", framegrab::VERSION);

    let simulate = args.simulate;
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return EXIT_FATAL;
        }
    };

    info!(cameras = simulate, "using emulated camera transport");
    let transport = MockTransport::with_devices(simulate);

    let cancel = CancelToken::new();
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        let interrupted = Arc::clone(&interrupted);
        let handler = ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
            cancel.cancel();
        });
        if let Err(e) = handler {
            error!(error = %e, "failed to install signal handler");
            return EXIT_FATAL;
        }
    }

    let mut supervisor = match CaptureSupervisor::new(Box::new(transport), config) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return EXIT_FATAL;
        }
    };

    if let Err(e) = supervisor.start() {
        error!(error = %e, "failed to start capture");
        return EXIT_FATAL;
    }

    match supervisor.run(&cancel) {
        Ok(()) if interrupted.load(Ordering::SeqCst) => {
            warn!("interrupted by user, capture stopped");
            EXIT_INTERRUPTED
        }
        Ok(()) => {
            info!("capture stopped");
            0
        }
        Err(e) => {
            error!(error = %e, "capture failed");
            EXIT_FATAL
        }
    }
}
