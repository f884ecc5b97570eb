//! Simulated peer binary
//!
//! Loads configuration, connects to the node under test and optionally
//! arms the Byzantine injector.

use clap::Parser;
use mimic::{Config, EventKind, Peer, Step};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Simulated consensus network peer
#[derive(Parser, Debug)]
#[command(name = "mimic", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Node host (overrides node.host)
    #[arg(long)]
    host: Option<String>,

    /// Node port (overrides node.port)
    #[arg(long)]
    port: Option<u16>,

    /// Exchange Status only, without answering the first header request
    #[arg(long)]
    without_sync: bool,

    /// Double vote at this step with the configured byzantine secret
    #[arg(long, value_name = "STEP")]
    double_vote: Option<Step>,

    /// Double propose with the configured byzantine secret
    #[arg(long)]
    double_proposal: bool,
}

fn exit_with(message: &str, e: impl std::fmt::Display) -> ! {
    error!("{}: {}", message, e);
    std::process::exit(1);
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    let (mut config, loaded_paths) = if let Some(config_path) = &args.config {
        match Config::load_file(config_path) {
            Ok(config) => (config, vec![config_path.clone()]),
            Err(e) => exit_with(
                &format!("Failed to load configuration from {}", config_path.display()),
                e,
            ),
        }
    } else {
        match Config::load() {
            Ok(result) => result,
            Err(e) => exit_with("Failed to load configuration", e),
        }
    };

    if loaded_paths.is_empty() {
        info!("No config files found, using defaults");
    } else {
        for path in &loaded_paths {
            info!(path = %path.display(), "Loaded config file");
        }
    }

    if args.host.is_some() {
        config.node.host = args.host.clone();
    }
    if args.port.is_some() {
        config.node.port = args.port;
    }

    let byzantine = match config.byzantine_identity() {
        Ok(identity) => identity,
        Err(e) => exit_with("Invalid byzantine secret", e),
    };
    if (args.double_vote.is_some() || args.double_proposal) && byzantine.is_none() {
        exit_with("Injector requested", "byzantine.secret is not configured");
    }

    let mut peer = Peer::new(config);

    // Log every arrival, including the node's first Status.
    for kind in EventKind::ALL {
        let mut subscription = peer.events().subscribe(kind);
        tokio::spawn(async move {
            while let Some(message) = subscription.recv().await {
                info!(kind = %kind, extension = message.extension(), "Arrived");
            }
        });
    }

    info!(addr = %peer.config().node.addr(), "Connecting");
    let established = if args.without_sync {
        peer.establish_without_sync(None).await
    } else {
        peer.establish(None).await
    };
    if let Err(e) = established {
        exit_with("Failed to establish session", e);
    }

    if let Some(identity) = &byzantine {
        if let Some(step) = args.double_vote {
            if let Err(e) = peer.start_double_vote(identity.clone(), step).await {
                exit_with("Failed to arm double vote", e);
            }
        }
        if args.double_proposal {
            if let Err(e) = peer.start_double_proposal(identity.clone()).await {
                exit_with("Failed to arm double proposal", e);
            }
        }
    }

    info!("Peer running, press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    if let Err(e) = peer.end().await {
        warn!("Error during shutdown: {}", e);
    }
    info!(
        arrived = peer.arrived_extension_messages().len(),
        "Peer shutdown complete"
    );
}
