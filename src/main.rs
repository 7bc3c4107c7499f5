//! Station Link - Main Entry Point
//!
//! Loads the configuration, opens the frame source when streaming, and runs
//! the station until SIGINT or SIGTERM.

use clap::{Args, Parser, Subcommand};
use station_link::capture::build_frame_source;
use station_link::clock::{Clock, SystemClock};
use station_link::config::StationConfig;
use station_link::observability::{init_default_logging, metrics};
use station_link::station::{run_relay_station, run_stream_station, LinkMode};
use station_link::transport::WsConnector;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Resilient WebSocket link between a camera station and its control server
///
/// Without a subcommand the station streams, so `station-link RPI1` is the
/// same as `station-link stream RPI1`.
#[derive(Parser)]
#[command(name = "station-link")]
#[command(about = "Connects a camera station to its remote control server")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    station: StationArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug)]
struct StationArgs {
    /// Station identity, overriding the configuration file
    #[arg(env = "STATION_ID")]
    station_id: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish camera frames to the server (default)
    Stream(StationArgs),
    /// Receive remote commands and acknowledge them
    Relay(StationArgs),
    /// Validate configuration
    Config {
        /// Show resolved configuration and endpoint candidates
        #[arg(long)]
        show: bool,

        #[command(flatten)]
        station: StationArgs,
    },
}

impl Cli {
    /// Subcommand to run, streaming when none was given
    fn into_command(self) -> Commands {
        self.command.unwrap_or(Commands::Stream(self.station))
    }
}

impl Commands {
    fn station_id(&self) -> Option<String> {
        match self {
            Commands::Stream(args) | Commands::Relay(args) => args.station_id.clone(),
            Commands::Config { station, .. } => station.station_id.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose > 0 && std::env::var("LOG_LEVEL").is_err() {
        let level = if cli.verbose > 1 { "TRACE" } else { "DEBUG" };
        std::env::set_var("LOG_LEVEL", level);
    }
    init_default_logging();

    info!("Starting station-link v{}", env!("CARGO_PKG_VERSION"));

    let config_path = cli.config.clone();
    let command = cli.into_command();
    let config = match load_configuration(config_path.as_deref()).and_then(|config| {
        config
            .with_station_id(command.station_id())
            .map_err(Into::into)
    }) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match command {
        Commands::Stream(_) => run_station(config, LinkMode::Stream).await,
        Commands::Relay(_) => run_station(config, LinkMode::Relay).await,
        Commands::Config { show, .. } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: Option<&Path>,
) -> Result<StationConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(StationConfig::load_from_file(path)?)
        }
        None => {
            // Try default locations
            for path_str in ["station.toml", "config/station.toml"] {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(StationConfig::load_from_file(&path)?);
                }
            }

            info!("No configuration file found, using defaults");
            Ok(StationConfig::default())
        }
    }
}

async fn run_station(
    config: StationConfig,
    mode: LinkMode,
) -> Result<(), Box<dyn std::error::Error>> {
    // wss endpoints need a process-wide crypto provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A TLS crypto provider was already installed");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let connector = WsConnector::new(config.connect_timeout());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Set up signal handling for graceful shutdown
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    let signals = async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
        let _ = shutdown_tx.send(true);
        // Keep the sender alive until the runner has observed the flag
        std::future::pending::<()>().await;
    };

    let station = async {
        match mode {
            LinkMode::Stream => {
                let source = build_frame_source(&config.capture);
                run_stream_station(&config, source, connector, clock, shutdown_rx).await
            }
            LinkMode::Relay => run_relay_station(&config, connector, clock, shutdown_rx).await,
        }
    };

    let result = tokio::select! {
        result = station => result,
        _ = signals => Ok(()),
    };

    match serde_json::to_string(&metrics().get_metrics()) {
        Ok(snapshot) => info!(metrics = %snapshot, "Final metrics"),
        Err(e) => warn!("Failed to serialize metrics: {}", e),
    }

    Ok(result?)
}

fn handle_config_command(
    config: &StationConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);

        println!("Endpoint candidates:");
        for (index, endpoint) in config.resolve_endpoints().iter().enumerate() {
            println!("  {index}: {endpoint}");
        }
    }

    info!("Configuration validation complete");
    Ok(())
}
