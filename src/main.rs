//! Binary entrypoint for the meshrelay CLI.
//!
//! Commands:
//! - `start [--host <host[:port]>] [--serial <path>]` - run the relay
//! - `init` - create a starter `config.toml` and the storage directory
//! - `status` - print liveness and storage state from the files on disk
//! - `send <MAN|MSSN|WP> [PAYLOAD]` - send one operator command and exit
//!
//! See the library crate docs for module-level details: `meshrelay::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::str::FromStr;

use meshrelay::config::Config;
use meshrelay::logutil::RotatingFile;
use meshrelay::meshtastic;
use meshrelay::relay::commands::{CommandExecutor, OutboundCommand};
use meshrelay::relay::telemetry::TelemetryLog;
use meshrelay::relay::RelayServer;
use meshrelay::storage::{ProcessedIds, StatusMarker};

#[derive(Parser)]
#[command(name = "meshrelay")]
#[command(about = "Ground-station relay between a vehicle on a Meshtastic mesh and ground control")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay
    Start {
        /// Meshtastic node address (host or host:port), overrides config and environment
        #[arg(long)]
        host: Option<String>,

        /// Meshtastic serial device (e.g., /dev/ttyUSB0), overrides --host
        #[arg(long)]
        serial: Option<String>,
    },
    /// Write a default configuration and create the data directory
    Init,
    /// Show connectivity and storage status
    Status,
    /// Send one command (MAN, MSSN or WP) and exit
    Send {
        /// Command type: MAN, MSSN or WP
        kind: String,
        /// Direction or mission command (not used for WP)
        payload: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start { host, serial } => {
            let mut config = load_config(pre_config, &cli.config).await?;
            if let Some(h) = host {
                config.meshtastic.host = h;
                config.meshtastic.serial_port.clear();
            }
            if let Some(s) = serial {
                config.meshtastic.serial_port = s;
            }
            info!("Starting meshrelay v{}", env!("CARGO_PKG_VERSION"));

            let mut relay = RelayServer::new(config).await?;
            if let Err(e) = relay.connect_radio().await {
                error!("Failed to open radio link: {}", e);
                return Err(e);
            }
            relay.run().await?;
        }
        Commands::Init => {
            info!("Initializing new relay configuration");
            if tokio::fs::try_exists(&cli.config).await.unwrap_or(false) {
                warn!("{} already exists; leaving it untouched", cli.config);
            } else {
                Config::create_default(&cli.config).await?;
                info!("Configuration file created at {}", cli.config);
            }
            let config = Config::load(&cli.config).await?;
            tokio::fs::create_dir_all(&config.storage.data_dir).await?;
            let telemetry = telemetry_log(&config);
            telemetry.ensure()?;
            StatusMarker::new(config.resolve(&config.storage.status_file)).write(false)?;
            info!(
                "Initialized storage at {} ({})",
                config.storage.data_dir,
                telemetry.telemetry().path().display()
            );
        }
        Commands::Status => {
            let config = load_config(pre_config, &cli.config).await?;
            show_status(&config)?;
        }
        Commands::Send { kind, payload } => {
            let config = load_config(pre_config, &cli.config).await?;
            let cmd = OutboundCommand::from_request(&kind, payload.as_deref())
                .map_err(|e| anyhow!("{}: {}", kind, e))?;
            let target = config.link_target()?;
            let link = meshtastic::connect(&target, config.heartbeat()).await?;
            let executor = CommandExecutor::from_config(&config, link.handle.clone());
            let report = executor.execute(&cmd).await;
            println!(
                "{}: sent={} failed={} skipped={}",
                cmd.kind.tag(),
                report.sent,
                report.failed,
                report.skipped
            );
            if !report.is_success() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Config from disk (or the early load) with environment overrides applied.
async fn load_config(pre: Option<Config>, path: &str) -> Result<Config> {
    let mut config = match pre {
        Some(c) => c,
        None if !std::path::Path::new(path).exists() => {
            warn!("{} not found; using built-in defaults", path);
            Config::default()
        }
        None => Config::load(path).await?,
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn telemetry_log(config: &Config) -> TelemetryLog {
    TelemetryLog::new(
        config.resolve(&config.storage.telemetry_file),
        config.location_path(),
        config.storage.max_entries,
    )
}

fn show_status(config: &Config) -> Result<()> {
    let marker = StatusMarker::new(config.resolve(&config.storage.status_file));
    let telemetry = telemetry_log(config);
    let rows = telemetry.telemetry().rows()?;
    let ids = ProcessedIds::load(config.resolve(&config.storage.processed_ids_file));

    println!("meshrelay status");
    println!("  source:        {}", config.station.source_id);
    println!("  link:          {}", config.link_target()?);
    println!(
        "  connectivity:  {}",
        marker.read().unwrap_or_else(|| "unknown".to_string())
    );
    println!(
        "  telemetry:     {} / {} rows ({})",
        rows.len(),
        telemetry.max_entries(),
        telemetry.telemetry().path().display()
    );
    if let Some(loc) = telemetry.location() {
        println!("  location log:  {}", loc.path().display());
    }
    match rows.last() {
        Some(last) => println!(
            "  last sample:   {}",
            last.iter().collect::<Vec<_>>().join(",")
        ),
        None => println!("  last sample:   none"),
    }
    println!("  processed ids: {} ({})", ids.len(), ids.path().display());
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| log::LevelFilter::from_str(&c.logging.level).ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.as_ref().and_then(|c| {
        let file = c.logging.file.as_ref()?;
        RotatingFile::open(file, c.logging.rotate_kb.saturating_mul(1024)).ok()
    });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // When stdout is not a terminal (service mode) only the file gets the line
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                // One write per line so a rollover never splits it.
                let _ = guard.write_all(format!("{}\n", line).as_bytes());
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
