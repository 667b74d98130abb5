//! sensorwatch - Main Entry Point
//!
//! Subscribes to the configured sensor topic and keeps a live board of
//! readings on stdout until interrupted.

use clap::{Parser, Subcommand};
use sensorwatch::config::{AppConfig, SessionOverrides};
use sensorwatch::display::{DisplayFormat, SensorBoard};
use sensorwatch::error::SensorResult;
use sensorwatch::observability::{init_default_logging, init_logging, LogFormat};
use sensorwatch::routing::MessageRouter;
use sensorwatch::session::{SessionCallbacks, SessionManager};
use sensorwatch::transport::mqtt::MqttTransportFactory;
use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, Level};

/// Live monitor for MQTT sensor readings
#[derive(Parser)]
#[command(name = "sensorwatch")]
#[command(about = "Live monitor for MQTT sensor readings")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "SENSORWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Broker host name
    #[arg(long, value_name = "HOST")]
    broker: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Subscription filter, e.g. "devices/+/sensor/#"
    #[arg(long)]
    topic: Option<String>,

    #[arg(long)]
    client_id: Option<String>,

    /// Disable TLS
    #[arg(long)]
    no_ssl: bool,

    /// Connect over raw TCP instead of WebSocket
    #[arg(long)]
    tcp: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print readings until interrupted
    Run {
        /// Board output: text or json
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Validate configuration
    Config {
        /// Show the merged configuration
        #[arg(long)]
        show: bool,
    },
}

impl Cli {
    fn overrides(&self) -> SessionOverrides {
        SessionOverrides {
            broker_url: self.broker.clone(),
            port: self.port,
            use_ssl: self.no_ssl.then_some(false),
            websocket: self.tcp.then_some(false),
            client_id: self.client_id.clone(),
            topic: self.topic.clone(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let logging = match cli.verbose {
        0 => init_default_logging(),
        n => {
            let level = if n == 1 { Level::DEBUG } else { Level::TRACE };
            let format = LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_default());
            init_logging(level, format, false)
        }
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    info!("Starting sensorwatch v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match &cli.command {
        Commands::Run { format } => run_monitor(config, DisplayFormat::parse(format)).await,
        Commands::Config { show } => handle_config_command(&config, *show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(cli: &Cli) -> SensorResult<AppConfig> {
    if let Some(path) = &cli.config {
        info!("Loading configuration from: {}", path.display());
        return Ok(AppConfig::load_from_file(path, cli.overrides())?);
    }

    for path_str in ["sensorwatch.toml", "config/sensorwatch.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(AppConfig::load_from_file(&path, cli.overrides())?);
        }
    }

    info!("No configuration file found, using defaults");
    Ok(AppConfig::from_overrides(
        cli.overrides(),
        Default::default(),
    )?)
}

async fn run_monitor(config: AppConfig, format: DisplayFormat) -> SensorResult<()> {
    info!(
        client_id = %config.session.client_id,
        topic = %config.session.topic,
        "Monitor starting"
    );

    let board = Arc::new(SensorBoard::new(format));
    let status_board = board.clone();
    let callbacks = SessionCallbacks::new()
        .on_status_change(move |state| status_board.show_status(state))
        .on_connect(|| info!("Connected to MQTT broker"));

    let router = Arc::new(MessageRouter::new(&config.router, board));
    let factory = MqttTransportFactory::from_config(&config.session);
    let mut session = SessionManager::new(config.session, callbacks, factory);
    session.add_message_handler(router.into_handler());

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    session.connect().await;

    tokio::select! {
        _ = session.run() => {}
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    session.disconnect().await;
    Ok(())
}

fn handle_config_command(config: &AppConfig, show: bool) -> SensorResult<()> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
