//! Binary entrypoint for the Meshtrack CLI.
//!
//! Commands:
//! - `ping` - read GPS fixes and send them to a mesh node
//! - `listen` - log received text messages with timing
//! - `map [input] [output]` - render the message log as an HTML map
//! - `init` - write a starter `meshtrack.toml`
//!
//! See the library crate docs for module-level details: `meshtrack::`.
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::{Path, PathBuf};
use tokio::sync::watch;

use meshtrack::config::{Config, CONFIG_ENV, DEFAULT_CONFIG_PATH};
use meshtrack::mapper;

#[derive(Parser)]
#[command(name = "meshtrack")]
#[command(about = "Relay GPS fixes over a Meshtastic mesh, log received positions and map them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (default: $MESHTRACK_CONFIG, then meshtrack.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Read GPS fixes and send them over the mesh
    Ping {
        /// Meshtastic radio port (e.g., /dev/ttyUSB0)
        #[arg(short, long)]
        port: Option<String>,
        /// GPS receiver port (e.g., /dev/ttyACM0)
        #[arg(short, long)]
        gps_port: Option<String>,
        /// Destination node ID, node number or "broadcast"
        #[arg(short, long)]
        target: Option<String>,
        /// Seconds between sends
        #[arg(short, long)]
        interval: Option<f64>,
        /// Message template, e.g. "GPS {lat:.6f},{lon:.6f}"
        #[arg(long)]
        template: Option<String>,
        /// LoRa modem preset to apply after connecting
        #[arg(long)]
        radio_mode: Option<String>,
        /// Send without requesting acknowledgements
        #[arg(long)]
        no_ack: bool,
    },
    /// Log received text messages
    Listen {
        /// Meshtastic radio port (e.g., /dev/ttyUSB0)
        #[arg(short, long)]
        port: Option<String>,
        /// Message log path
        #[arg(short, long)]
        output: Option<String>,
        /// JSON-lines trace of every received packet
        #[arg(long)]
        raw_output: Option<String>,
        /// LoRa modem preset to apply after connecting
        #[arg(long)]
        radio_mode: Option<String>,
    },
    /// Render the message log as an HTML map
    Map {
        /// Message log to read
        input: Option<String>,
        /// HTML file to write
        output: Option<String>,
        /// Page title
        #[arg(long)]
        title: Option<String>,
    },
    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .or_else(|| std::env::var(CONFIG_ENV).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
        .into()
}

async fn run(cli: Cli) -> Result<()> {
    let path = config_path(&cli);

    if let Commands::Init { force } = cli.command {
        init_logging(None, cli.verbose);
        if path.exists() && !force {
            return Err(anyhow!(
                "{} already exists (use --force to overwrite)",
                path.display()
            ));
        }
        Config::create_default(&path).await?;
        info!("Configuration file created at {}", path.display());
        return Ok(());
    }

    let loaded = async {
        let mut config = Config::load(&path).await?;
        config.apply_env_overrides()?;
        Ok::<_, anyhow::Error>(config)
    }
    .await;
    init_logging(loaded.as_ref().ok(), cli.verbose);
    let mut config = loaded?;
    info!("Meshtrack v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Ping {
            port,
            gps_port,
            target,
            interval,
            template,
            radio_mode,
            no_ack,
        } => {
            if port.is_some() {
                config.meshtastic.port = port;
            }
            if gps_port.is_some() {
                config.gps.port = gps_port;
            }
            if let Some(t) = target {
                config.pinger.target_node = t;
            }
            if let Some(i) = interval {
                config.pinger.send_interval_seconds = i;
            }
            if let Some(t) = template {
                config.pinger.message_template = t;
            }
            if let Some(m) = radio_mode {
                config.meshtastic.radio_mode = m;
            }
            if no_ack {
                config.meshtastic.want_ack = false;
            }
            ping(config, shutdown_signal()).await
        }
        Commands::Listen {
            port,
            output,
            raw_output,
            radio_mode,
        } => {
            if port.is_some() {
                config.meshtastic.port = port;
            }
            if let Some(o) = output {
                config.listener.output_path = o;
            }
            if raw_output.is_some() {
                config.listener.raw_packet_path = raw_output;
            }
            if let Some(m) = radio_mode {
                config.meshtastic.radio_mode = m;
            }
            listen(config, shutdown_signal()).await
        }
        Commands::Map {
            input,
            output,
            title,
        } => {
            let input = input.unwrap_or(config.mapper.input_path);
            let output = output.unwrap_or(config.mapper.output_path);
            let title = title.unwrap_or(config.mapper.title);
            let count = mapper::write_map(Path::new(&input), Path::new(&output), &title)
                .with_context(|| format!("Failed to build map from {}", input))?;
            println!("Map with {} points written to {}", count, output);
            Ok(())
        }
        Commands::Init { .. } => Ok(()),
    }
}

/// Flips to true on Ctrl-C.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = tx.send(true);
            }
            Err(e) => {
                log::warn!("Cannot listen for Ctrl-C: {}", e);
                // Keep the sender alive so receivers do not see a closed channel.
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

#[cfg(all(feature = "serial", feature = "meshtastic-proto"))]
async fn connect_radio(config: &Config, port: &str) -> Result<meshtrack::meshtastic::MeshtasticDevice> {
    use meshtrack::meshtastic::{MeshtasticDevice, ModemPreset};
    use std::time::Duration;

    let preset = ModemPreset::resolve(&config.meshtastic.radio_mode)?;
    let mut device = MeshtasticDevice::connect(
        port,
        config.meshtastic.baud_rate,
        Duration::from_secs(config.meshtastic.connect_timeout_seconds),
    )
    .await
    .with_context(|| format!("Failed to connect to Meshtastic radio on {}", port))?;
    if let Some(preset) = preset {
        if let Err(e) = device.apply_modem_preset(preset) {
            log::warn!("Could not apply radio mode '{}': {}", config.meshtastic.radio_mode, e);
        }
    }
    Ok(device)
}

#[cfg(all(feature = "serial", feature = "meshtastic-proto"))]
async fn ping(config: Config, shutdown: watch::Receiver<bool>) -> Result<()> {
    use meshtrack::gps::{GpsError, SerialGpsReader};
    use meshtrack::meshtastic::{Destination, TransportError};
    use meshtrack::pinger::{Pinger, PingerSettings};
    use meshtrack::ports;
    use std::time::Duration;

    config.validate_for_pinger()?;

    let claimed: Vec<&str> = config.meshtastic.port.as_deref().into_iter().collect();
    let gps_port = config
        .gps
        .port
        .clone()
        .or_else(|| ports::auto_detect_gps_port(&claimed))
        .ok_or(GpsError::NoPort)?;
    let radio_port = config
        .meshtastic
        .port
        .clone()
        .or_else(|| ports::auto_detect_radio_port(&[gps_port.as_str()]))
        .ok_or(TransportError::NoPort)?;
    info!("GPS on {}, radio on {}", gps_port, radio_port);

    let gps = SerialGpsReader::open(&gps_port, config.gps.baud_rate)
        .with_context(|| format!("Failed to open GPS receiver on {}", gps_port))?;
    let device = connect_radio(&config, &radio_port).await?;

    let settings = PingerSettings {
        destination: Destination::parse(&config.pinger.target_node),
        template: config.template()?,
        want_ack: config.meshtastic.want_ack,
        interval: Duration::from_secs_f64(config.pinger.send_interval_seconds),
        gps_timeout: Duration::from_secs_f64(config.gps.timeout_seconds),
    };
    let mut pinger = Pinger::new(gps, device, settings);
    let result = pinger.run(shutdown).await;
    let (_, device) = pinger.into_parts();
    device.close().await;
    result
}

#[cfg(all(feature = "serial", feature = "meshtastic-proto"))]
async fn listen(config: Config, shutdown: watch::Receiver<bool>) -> Result<()> {
    use meshtrack::listener::{run_listener, PacketHandler};
    use meshtrack::meshtastic::TransportError;
    use meshtrack::ports;
    use meshtrack::storage::{with_default_suffix, LogStore, TraceSink};
    use std::sync::Arc;

    let radio_port = config
        .meshtastic
        .port
        .clone()
        .or_else(|| ports::auto_detect_radio_port(&[]))
        .ok_or(TransportError::NoPort)?;

    let output = with_default_suffix(&config.listener.output_path);
    let mut handler = PacketHandler::new(LogStore::new(&output), config.listener.dedup_window);
    if let Some(raw) = &config.listener.raw_packet_path {
        let raw = with_default_suffix(raw);
        info!("Tracing raw packets to {}", raw.display());
        handler = handler.with_trace(TraceSink::new(raw));
    }

    let mut device = connect_radio(&config, &radio_port).await?;
    info!("Logging messages to {}", output.display());
    let result = run_listener(&mut device, Arc::new(handler), shutdown).await;
    device.close().await;
    result
}

#[cfg(not(all(feature = "serial", feature = "meshtastic-proto")))]
async fn ping(_config: Config, _shutdown: watch::Receiver<bool>) -> Result<()> {
    Err(anyhow!("ping requires the 'serial' and 'meshtastic-proto' features"))
}

#[cfg(not(all(feature = "serial", feature = "meshtastic-proto")))]
async fn listen(_config: Config, _shutdown: watch::Receiver<bool>) -> Result<()> {
    Err(anyhow!("listen requires the 'serial' and 'meshtastic-proto' features"))
}

fn init_logging(config: Option<&Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins; otherwise the configured level
    let base_level = match verbosity {
        0 => config
            .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let file = config
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    if let Some(f) = file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Foreground runs also echo to the console
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
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
