//! # Meshtastic Device Communication Module
//!
//! The radio transport used by the pinger and the listener: a Meshtastic node
//! attached over USB/UART, spoken to with length-prefixed protobuf frames.
//!
//! ## Pieces
//!
//! - [`Destination`] - where a text goes: broadcast, a node number or a node ID string
//! - [`ModemPreset`] - named LoRa modem presets and their wire values
//! - [`RadioLink`] - send + signal-strength seam used by the pinger
//! - [`NodeDb`] - what we know about other nodes (SNR, last heard)
//! - [`framing`] - `0x94 0xC3 <len>` stream framing
//! - `MeshtasticDevice` (features `serial` + `meshtastic-proto`) - the hardware link;
//!   also a [`crate::listener::PacketFeed`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "serial", feature = "meshtastic-proto"))]
//! # async fn demo() -> anyhow::Result<()> {
//! use meshtrack::meshtastic::{Destination, MeshtasticDevice, RadioLink};
//! use std::time::Duration;
//!
//! let mut device = MeshtasticDevice::connect("/dev/ttyUSB0", 115200, Duration::from_secs(20)).await?;
//! device.send_text("hello mesh", &Destination::parse("broadcast"), false)?;
//! device.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```toml
//! [meshtastic]
//! port = "/dev/ttyUSB0"   # omit to auto-detect
//! baud_rate = 115200
//! radio_mode = "longfast"
//! want_ack = true
//! ```

pub mod framing;

#[cfg(feature = "meshtastic-proto")]
pub mod convert;
#[cfg(all(feature = "serial", feature = "meshtastic-proto"))]
mod device;

#[cfg(all(feature = "serial", feature = "meshtastic-proto"))]
pub use device::MeshtasticDevice;

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Node number of the broadcast address.
pub const BROADCAST_NUM: u32 = 0xffff_ffff;
/// SNR value reported for nodes that have never been heard directly.
pub const SNR_UNKNOWN: f32 = -128.0;
pub const DEFAULT_RADIO_BAUDRATE: u32 = 115_200;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("radio is not connected (node number not yet known)")]
    NotConnected,

    #[error("cannot resolve node id '{0}' to a node number")]
    NodeIdUnknown(String),

    #[error("unknown radio mode '{name}'. Valid preset names: {valid}")]
    UnknownRadioMode { name: String, valid: String },

    #[error("radio did not finish configuration within {seconds}s")]
    ConnectTimeout { seconds: u64 },

    #[error("radio has not reported its LoRa configuration")]
    ConfigUnavailable,

    #[error("frame of {0} bytes exceeds the protocol limit")]
    FrameTooLarge(usize),

    #[error("unable to detect Meshtastic radio port; set meshtastic.port")]
    NoPort,

    #[error("radio io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serial")]
    #[error("radio serial error: {0}")]
    Serial(#[from] serialport::Error),

    #[cfg(feature = "meshtastic-proto")]
    #[error("protobuf encode error: {0}")]
    Encode(#[from] prost::EncodeError),
}

/// Target of an outgoing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Broadcast,
    Node(u32),
    /// A node ID such as `!a1b2c3d4` or `0xa1b2c3d4`.
    NodeId(String),
}

impl Destination {
    /// Empty, `broadcast` and `all` mean broadcast; all digits is a node number;
    /// anything else is kept as a node ID.
    pub fn parse(target: &str) -> Self {
        let t = target.trim();
        if t.is_empty() || t.eq_ignore_ascii_case("broadcast") || t.eq_ignore_ascii_case("all") {
            return Destination::Broadcast;
        }
        if t.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = t.parse::<u32>() {
                return Destination::Node(n);
            }
        }
        Destination::NodeId(t.to_string())
    }

    /// Numeric node address, when it can be derived without a node database.
    ///
    /// Node IDs use their last eight hex digits after any `0x` or `!` prefix.
    pub fn node_num(&self) -> Option<u32> {
        match self {
            Destination::Broadcast => Some(BROADCAST_NUM),
            Destination::Node(n) => Some(*n),
            Destination::NodeId(id) => {
                let lower = id.to_ascii_lowercase();
                let hex = lower.strip_prefix("0x").unwrap_or(&lower);
                let hex = hex.trim_start_matches('!');
                if !hex.is_ascii() {
                    return None;
                }
                let tail = &hex[hex.len().saturating_sub(8)..];
                if tail.is_empty() {
                    return None;
                }
                u32::from_str_radix(tail, 16).ok()
            }
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Destination::Broadcast)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Broadcast => f.write_str("broadcast"),
            Destination::Node(n) => write!(f, "{}", n),
            Destination::NodeId(id) => f.write_str(id),
        }
    }
}

/// LoRa modem presets (`Config.LoRaConfig.ModemPreset`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemPreset {
    LongFast = 0,
    LongSlow = 1,
    VeryLongSlow = 2,
    MediumSlow = 3,
    MediumFast = 4,
    ShortSlow = 5,
    ShortFast = 6,
    LongModerate = 7,
    ShortTurbo = 8,
}

impl ModemPreset {
    pub const ALL: [ModemPreset; 9] = [
        ModemPreset::LongFast,
        ModemPreset::LongSlow,
        ModemPreset::VeryLongSlow,
        ModemPreset::MediumSlow,
        ModemPreset::MediumFast,
        ModemPreset::ShortSlow,
        ModemPreset::ShortFast,
        ModemPreset::LongModerate,
        ModemPreset::ShortTurbo,
    ];

    pub fn value(self) -> i32 {
        self as i32
    }

    /// Normalised lookup key, e.g. `longfast`.
    pub fn key(self) -> &'static str {
        match self {
            ModemPreset::LongFast => "longfast",
            ModemPreset::LongSlow => "longslow",
            ModemPreset::VeryLongSlow => "verylongslow",
            ModemPreset::MediumSlow => "mediumslow",
            ModemPreset::MediumFast => "mediumfast",
            ModemPreset::ShortSlow => "shortslow",
            ModemPreset::ShortFast => "shortfast",
            ModemPreset::LongModerate => "longmoderate",
            ModemPreset::ShortTurbo => "shortturbo",
        }
    }

    /// Resolve a user-supplied radio mode to its wire value.
    ///
    /// Case and punctuation are ignored (`Long-Fast`, `LONG_FAST` and `longfast`
    /// agree). Digits are taken as a raw preset number. Empty input means "leave
    /// the radio alone".
    pub fn resolve(text: &str) -> Result<Option<i32>, TransportError> {
        let key: String = text
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        if key.is_empty() {
            return Ok(None);
        }
        if key.bytes().all(|b| b.is_ascii_digit()) {
            return key.parse::<i32>().map(Some).map_err(|_| TransportError::UnknownRadioMode {
                name: text.to_string(),
                valid: Self::valid_names(),
            });
        }
        Self::ALL
            .iter()
            .find(|p| p.key() == key)
            .map(|p| Some(p.value()))
            .ok_or_else(|| TransportError::UnknownRadioMode {
                name: text.to_string(),
                valid: Self::valid_names(),
            })
    }

    fn valid_names() -> String {
        let mut names: Vec<&str> = Self::ALL.iter().map(|p| p.key()).collect();
        names.sort_unstable();
        names.join(", ")
    }
}

/// Returned by a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryHandle {
    pub packet_id: u32,
}

/// Outgoing side of the radio, as the pinger needs it.
pub trait RadioLink {
    fn send_text(
        &mut self,
        text: &str,
        destination: &Destination,
        want_ack: bool,
    ) -> Result<DeliveryHandle, TransportError>;

    /// Last known SNR of `destination`; `None` when unknown. Never blocks.
    fn snr_for(&self, destination: &Destination) -> Option<f32>;

    /// SNR of the most recently heard node.
    fn latest_snr(&self) -> Option<f32>;
}

/// What we know about one remote node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeRecord {
    pub user_id: Option<String>,
    pub long_name: Option<String>,
    pub snr: Option<f32>,
    /// Epoch seconds.
    pub last_heard: u32,
}

/// Node database keyed by node number.
#[derive(Debug, Default)]
pub struct NodeDb {
    nodes: HashMap<u32, NodeRecord>,
}

fn usable_snr(snr: f32) -> Option<f32> {
    (snr.is_finite() && snr != SNR_UNKNOWN).then_some(snr)
}

impl NodeDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, num: u32) -> Option<&NodeRecord> {
        self.nodes.get(&num)
    }

    /// Merge node-info from the device's node list.
    pub fn update_info(&mut self, num: u32, user_id: Option<String>, long_name: Option<String>, snr: f32, last_heard: u32) {
        let rec = self.nodes.entry(num).or_default();
        if user_id.is_some() {
            rec.user_id = user_id;
        }
        if long_name.is_some() {
            rec.long_name = long_name;
        }
        if let Some(snr) = usable_snr(snr) {
            rec.snr = Some(snr);
        }
        rec.last_heard = rec.last_heard.max(last_heard);
    }

    /// Record a packet heard from `num`.
    pub fn observe(&mut self, num: u32, snr: f32, heard_at: u32) {
        let rec = self.nodes.entry(num).or_default();
        if let Some(snr) = usable_snr(snr) {
            rec.snr = Some(snr);
        }
        rec.last_heard = rec.last_heard.max(heard_at);
    }

    /// Node number for `destination`, consulting known user IDs for node ID strings.
    pub fn resolve(&self, destination: &Destination) -> Option<u32> {
        if let Destination::NodeId(id) = destination {
            if let Some((num, _)) = self
                .nodes
                .iter()
                .find(|(_, r)| r.user_id.as_deref() == Some(id.as_str()))
            {
                return Some(*num);
            }
        }
        destination.node_num()
    }

    pub fn snr_for(&self, destination: &Destination) -> Option<f32> {
        if destination.is_broadcast() {
            return None;
        }
        self.resolve(destination)
            .and_then(|num| self.nodes.get(&num))
            .and_then(|r| r.snr)
    }

    /// SNR of the node heard most recently (ties go to the higher node number).
    pub fn latest_snr(&self) -> Option<f32> {
        self.nodes
            .iter()
            .filter_map(|(num, r)| r.snr.map(|s| (r.last_heard, *num, s)))
            .max_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)))
            .map(|(_, _, snr)| snr)
    }
}
