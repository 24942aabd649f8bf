//! # Configuration Management Module
//!
//! TOML configuration for all three roles, with serde defaults for every field so a
//! partial file (or no file at all) is enough to get started.
//!
//! ## Configuration Structure
//!
//! - [`MeshtasticConfig`] - radio port, baud rate, modem preset, acknowledgements
//! - [`GpsConfig`] - receiver port, baud rate, fix timeout
//! - [`PingerConfig`] - destination, send interval, message template
//! - [`ListenerConfig`] - message log, raw packet trace, dedup window
//! - [`MapperConfig`] - mapper input/output and page title
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshtrack::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load("meshtrack.toml").await?;
//!     config.apply_env_overrides()?;
//!     config.validate_for_pinger()?;
//!     println!("Sending to {}", config.pinger.target_node);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [meshtastic]
//! port = "/dev/ttyUSB0"
//! radio_mode = "longfast"
//!
//! [gps]
//! port = "/dev/ttyACM0"
//! timeout_seconds = 15.0
//!
//! [pinger]
//! target_node = "!a1b2c3d4"
//! send_interval_seconds = 60.0
//! message_template = "GPS {lat:.6f},{lon:.6f} snr {snr}"
//! ```
//!
//! ## Environment Integration
//!
//! Precedence is CLI args > environment (`MESHTRACK_*`) > config file > defaults.
//! Empty environment values are ignored.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::codec::{self, Template};
use crate::listener::DEFAULT_DEDUP_WINDOW;
use crate::mapper::DEFAULT_TITLE;
use crate::meshtastic::ModemPreset;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "MESHTRACK_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "meshtrack.toml";
pub const DEFAULT_TEMPLATE: &str = "GPS {lat:.6f},{lon:.6f} sats {satellites} hdop {hdop:.1f} {time}";
/// Enrichment keys every pinger send provides in addition to the fix keys.
pub const ENRICHMENT_KEYS: &[&str] = &["snr", "radio_snr"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub meshtastic: MeshtasticConfig,
    #[serde(default)]
    pub gps: GpsConfig,
    #[serde(default)]
    pub pinger: PingerConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub mapper: MapperConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshtasticConfig {
    /// Serial port of the radio; auto-detected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default = "default_radio_baud")]
    pub baud_rate: u32,
    /// Modem preset name or number; empty leaves the radio alone.
    #[serde(default = "default_radio_mode")]
    pub radio_mode: String,
    #[serde(default = "default_true")]
    pub want_ack: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default = "default_gps_baud")]
    pub baud_rate: u32,
    #[serde(default = "default_gps_timeout")]
    pub timeout_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingerConfig {
    /// Node ID, node number or `broadcast`. Required for `ping`.
    #[serde(default)]
    pub target_node: String,
    #[serde(default = "default_interval")]
    pub send_interval_seconds: f64,
    #[serde(default = "default_template")]
    pub message_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_listener_output")]
    pub output_path: String,
    /// JSON-lines trace of every received packet; disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_packet_path: Option<String>,
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperConfig {
    #[serde(default = "default_mapper_input")]
    pub input_path: String,
    #[serde(default = "default_mapper_output")]
    pub output_path: String,
    #[serde(default = "default_title")]
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_radio_baud() -> u32 {
    crate::meshtastic::DEFAULT_RADIO_BAUDRATE
}
fn default_radio_mode() -> String {
    ModemPreset::LongFast.key().to_string()
}
fn default_connect_timeout() -> u64 {
    20
}
fn default_gps_baud() -> u32 {
    crate::gps::DEFAULT_GPS_BAUDRATE
}
fn default_gps_timeout() -> f64 {
    15.0
}
fn default_interval() -> f64 {
    60.0
}
fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}
fn default_listener_output() -> String {
    "meshtastic_messages.log".to_string()
}
fn default_dedup_window() -> usize {
    DEFAULT_DEDUP_WINDOW
}
fn default_mapper_input() -> String {
    "meshtastic_messages.txt".to_string()
}
fn default_mapper_output() -> String {
    "meshtastic_map.html".to_string()
}
fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MeshtasticConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_radio_baud(),
            radio_mode: default_radio_mode(),
            want_ack: true,
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_gps_baud(),
            timeout_seconds: default_gps_timeout(),
        }
    }
}

impl Default for PingerConfig {
    fn default() -> Self {
        Self {
            target_node: String::new(),
            send_interval_seconds: default_interval(),
            message_template: default_template(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            output_path: default_listener_output(),
            raw_packet_path: None,
            dedup_window: default_dedup_window(),
        }
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            input_path: default_mapper_input(),
            output_path: default_mapper_output(),
            title: default_title(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{} must be a boolean, got '{}'", name, other)),
    }
}

fn parse_seconds(name: &str, value: &str) -> Result<f64> {
    let secs: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a number of seconds, got '{}'", name, value))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(anyhow!("{} must be a non-negative number, got '{}'", name, value));
    }
    Ok(secs)
}

impl Config {
    /// Load configuration from a file. A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("Config file {} not found, using defaults", path.display());
                return Ok(Config::default());
            }
            Err(e) => return Err(anyhow!("Failed to read config file {}: {}", path.display(), e)),
        };
        toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path.display(), e))
    }

    /// Create a default configuration file
    pub async fn create_default(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(&Config::default())
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path.display(), e))?;
        Ok(())
    }

    /// Apply `MESHTRACK_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup; blank values are skipped.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MESHTRACK_RADIO_PORT") {
            self.meshtastic.port = Some(v);
        }
        if let Some(v) = get("MESHTRACK_GPS_PORT") {
            self.gps.port = Some(v);
        }
        if let Some(v) = get("MESHTRACK_TARGET_NODE") {
            self.pinger.target_node = v;
        }
        if let Some(v) = get("MESHTRACK_INTERVAL") {
            self.pinger.send_interval_seconds = parse_seconds("MESHTRACK_INTERVAL", &v)?;
        }
        if let Some(v) = get("MESHTRACK_GPS_TIMEOUT") {
            self.gps.timeout_seconds = parse_seconds("MESHTRACK_GPS_TIMEOUT", &v)?;
        }
        if let Some(v) = get("MESHTRACK_TEMPLATE") {
            self.pinger.message_template = v;
        }
        if let Some(v) = get("MESHTRACK_RADIO_MODE") {
            self.meshtastic.radio_mode = v;
        }
        if let Some(v) = get("MESHTRACK_WANT_ACK") {
            self.meshtastic.want_ack = parse_flag("MESHTRACK_WANT_ACK", &v)?;
        }
        if let Some(v) = get("MESHTRACK_OUTPUT") {
            self.listener.output_path = v;
        }
        if let Some(v) = get("MESHTRACK_RAW_OUTPUT") {
            self.listener.raw_packet_path = Some(v);
        }
        Ok(())
    }

    /// The parsed message template.
    pub fn template(&self) -> Result<Template> {
        Template::parse(&self.pinger.message_template)
            .map_err(|e| anyhow!("Invalid message_template: {}", e))
    }

    /// Everything `ping` needs before touching hardware.
    pub fn validate_for_pinger(&self) -> Result<()> {
        if self.pinger.target_node.trim().is_empty() {
            return Err(anyhow!(
                "pinger.target_node is required (set it in the config or MESHTRACK_TARGET_NODE)"
            ));
        }
        let template = self.template()?;
        codec::dry_run(&template, ENRICHMENT_KEYS)
            .map_err(|e| anyhow!("Invalid message_template: {}", e))?;
        if !positive_seconds(self.pinger.send_interval_seconds) {
            return Err(anyhow!("pinger.send_interval_seconds must be a positive number"));
        }
        if !positive_seconds(self.gps.timeout_seconds) {
            return Err(anyhow!("gps.timeout_seconds must be a positive number"));
        }
        ModemPreset::resolve(&self.meshtastic.radio_mode)?;
        Ok(())
    }
}

/// Above zero and representable as a `Duration`.
fn positive_seconds(value: f64) -> bool {
    value.is_finite() && value > 0.0 && std::time::Duration::try_from_secs_f64(value).is_ok()
}
