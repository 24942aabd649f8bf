//! # Meshtrack - GPS Position Relay for Meshtastic Networks
//!
//! Meshtrack carries GPS positions across a Meshtastic LoRa mesh and puts them on a
//! map. It has three roles:
//!
//! - **Pinger**: reads fixes from a serial GPS receiver and sends them as text
//!   messages, each tagged with its send time (`tx=<epoch>`).
//! - **Listener**: logs every received text message with send time, receive time and
//!   transit delay, dropping duplicate deliveries.
//! - **Mapper**: turns the message log into a self-contained Leaflet HTML map.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshtrack::listener::PacketHandler;
//! use meshtrack::storage::LogStore;
//! use meshtrack::mapper;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     // Something that delivers packets (the serial radio) calls handle_inbound.
//!     let _handler = PacketHandler::new(LogStore::new("messages.txt"), 200);
//!
//!     let points = mapper::write_map(Path::new("messages.txt"), Path::new("map.html"), mapper::DEFAULT_TITLE)?;
//!     println!("{} points", points);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`gps`] - NMEA parsing and fix acquisition
//! - [`codec`] - message templates, send-time tag and sent-time recovery
//! - [`pinger`] - the acquire/send loop
//! - [`listener`] - dedup, text extraction and log entries for received packets
//! - [`storage`] - append-only message log and raw packet trace
//! - [`mapper`] - log parsing and HTML map rendering
//! - [`meshtastic`] - serial Meshtastic transport
//! - [`protobuf`] - Meshtastic wire messages
//! - [`ports`] - serial port auto-detection
//! - [`config`] - configuration file and environment overrides
//!
//! ## Architecture
//!
//! ```text
//! GPS receiver ─▶ pinger ─▶ meshtastic ─▶ (mesh) ─▶ meshtastic ─▶ listener ─▶ log ─▶ mapper ─▶ HTML
//! ```

pub mod codec;
pub mod config;
pub mod gps;
pub mod listener;
pub mod logutil;
pub mod mapper;
pub mod meshtastic;
pub mod metrics;
pub mod pinger;
pub mod ports;
pub mod protobuf; // always declared; the message module is feature gated
pub mod storage;
