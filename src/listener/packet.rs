//! Loosely-typed view of a received packet.
//!
//! Transports disagree on where they put things (firmware revisions nest the text
//! payload at different depths), so the listener works on a small dynamic value tree
//! rather than on the wire structs directly.
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;

use crate::codec::SentTimeRaw;

/// Port classifier name used for plain text messages.
pub const TEXT_MESSAGE_PORT: &str = "TEXT_MESSAGE_APP";
/// Numeric port number of text messages on the wire.
pub const TEXT_MESSAGE_PORT_NUM: i64 = 1;

/// A dynamically shaped packet field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PacketValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<PacketValue>),
    Map(BTreeMap<String, PacketValue>),
}

impl PacketValue {
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, PacketValue)>,
    {
        PacketValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, key: &str) -> Option<&PacketValue> {
        match self {
            PacketValue::Map(m) => m.get(key),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, PacketValue>> {
        match self {
            PacketValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// False for null, zero, and empty strings, byte strings and containers.
    pub fn is_truthy(&self) -> bool {
        match self {
            PacketValue::Null => false,
            PacketValue::Bool(b) => *b,
            PacketValue::Int(i) => *i != 0,
            PacketValue::Float(f) => *f != 0.0,
            PacketValue::Text(s) => !s.is_empty(),
            PacketValue::Bytes(b) => !b.is_empty(),
            PacketValue::List(l) => !l.is_empty(),
            PacketValue::Map(m) => !m.is_empty(),
        }
    }

    /// Plain-text rendering of scalars; containers render as trace JSON.
    pub fn to_text(&self) -> String {
        match self {
            PacketValue::Null => "None".to_string(),
            PacketValue::Bool(b) => b.to_string(),
            PacketValue::Int(i) => i.to_string(),
            PacketValue::Float(f) => f.to_string(),
            PacketValue::Text(s) => s.clone(),
            PacketValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            PacketValue::List(_) | PacketValue::Map(_) => self.to_trace_json().to_string(),
        }
    }

    /// JSON for the raw-packet trace: bytes become UTF-8 text when valid, hex otherwise.
    pub fn to_trace_json(&self) -> JsonValue {
        match self {
            PacketValue::Null => JsonValue::Null,
            PacketValue::Bool(b) => JsonValue::Bool(*b),
            PacketValue::Int(i) => JsonValue::from(*i),
            PacketValue::Float(f) => JsonValue::from(*f),
            PacketValue::Text(s) => JsonValue::String(s.clone()),
            PacketValue::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => JsonValue::String(s.to_string()),
                Err(_) => JsonValue::String(hex(b)),
            },
            PacketValue::List(items) => JsonValue::Array(items.iter().map(Self::to_trace_json).collect()),
            PacketValue::Map(m) => {
                let obj: JsonMap<String, JsonValue> =
                    m.iter().map(|(k, v)| (k.clone(), v.to_trace_json())).collect();
                JsonValue::Object(obj)
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl From<bool> for PacketValue {
    fn from(v: bool) -> Self {
        PacketValue::Bool(v)
    }
}

impl From<i64> for PacketValue {
    fn from(v: i64) -> Self {
        PacketValue::Int(v)
    }
}

impl From<u32> for PacketValue {
    fn from(v: u32) -> Self {
        PacketValue::Int(i64::from(v))
    }
}

impl From<i32> for PacketValue {
    fn from(v: i32) -> Self {
        PacketValue::Int(i64::from(v))
    }
}

impl From<f64> for PacketValue {
    fn from(v: f64) -> Self {
        PacketValue::Float(v)
    }
}

impl From<f32> for PacketValue {
    fn from(v: f32) -> Self {
        PacketValue::Float(f64::from(v))
    }
}

impl From<&str> for PacketValue {
    fn from(v: &str) -> Self {
        PacketValue::Text(v.to_string())
    }
}

impl From<String> for PacketValue {
    fn from(v: String) -> Self {
        PacketValue::Text(v)
    }
}

impl From<Vec<u8>> for PacketValue {
    fn from(v: Vec<u8>) -> Self {
        PacketValue::Bytes(v)
    }
}

impl From<&[u8]> for PacketValue {
    fn from(v: &[u8]) -> Self {
        PacketValue::Bytes(v.to_vec())
    }
}

/// A packet as delivered by the transport: top-level fields such as `id`, `from`,
/// `to`, `decoded`, `payload`, `rx_snr`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundPacket {
    fields: BTreeMap<String, PacketValue>,
}

impl InboundPacket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: BTreeMap<String, PacketValue>) -> Self {
        Self { fields }
    }

    /// Builder-style field setter.
    pub fn with(mut self, key: &str, value: impl Into<PacketValue>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<PacketValue>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PacketValue> {
        self.fields.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn id(&self) -> Option<&PacketValue> {
        self.get("id")
    }

    pub fn from_node(&self) -> Option<&PacketValue> {
        self.get("from")
    }

    pub fn decoded(&self) -> Option<&PacketValue> {
        self.get("decoded")
    }

    /// `decoded` when it is a mapping.
    pub fn decoded_map(&self) -> Option<&BTreeMap<String, PacketValue>> {
        self.decoded().and_then(PacketValue::as_map)
    }

    /// First truthy value among `keys` of the decoded mapping.
    pub fn decoded_first(&self, keys: &[&str]) -> Option<&PacketValue> {
        let map = self.decoded_map()?;
        keys.iter().filter_map(|k| map.get(*k)).find(|v| v.is_truthy())
    }

    /// The declared port classifier, ignoring empty or zero values.
    pub fn port(&self) -> Option<&PacketValue> {
        self.decoded_map()
            .and_then(|m| m.get("portnum"))
            .filter(|v| v.is_truthy())
    }

    /// True unless the packet declares a port other than the text-message port.
    pub fn is_text_port(&self) -> bool {
        match self.port() {
            None => true,
            Some(PacketValue::Text(name)) => name.eq_ignore_ascii_case(TEXT_MESSAGE_PORT),
            Some(PacketValue::Int(n)) => *n == TEXT_MESSAGE_PORT_NUM,
            Some(other) => other.to_text().eq_ignore_ascii_case(TEXT_MESSAGE_PORT),
        }
    }

    /// Send-time metadata: `decoded.timestamp`, `decoded.time`, then top-level `timestamp`.
    pub fn sent_time_metadata(&self) -> Option<SentTimeRaw<'_>> {
        let raw = self
            .decoded_first(&["timestamp", "time"])
            .or_else(|| self.get("timestamp").filter(|v| v.is_truthy()))?;
        match raw {
            PacketValue::Int(i) => Some(SentTimeRaw::Epoch(*i as f64)),
            PacketValue::Float(f) => Some(SentTimeRaw::Epoch(*f)),
            PacketValue::Text(s) => Some(SentTimeRaw::Text(s)),
            _ => None,
        }
    }

    pub fn to_trace_json(&self) -> JsonValue {
        let obj: JsonMap<String, JsonValue> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_trace_json()))
            .collect();
        JsonValue::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_packet(port: PacketValue) -> InboundPacket {
        InboundPacket::new().with(
            "decoded",
            PacketValue::map([("portnum", port), ("text", "hi".into())]),
        )
    }

    #[test]
    fn port_classifier_accepts_name_number_or_absence() {
        assert!(text_packet("TEXT_MESSAGE_APP".into()).is_text_port());
        assert!(text_packet("text_message_app".into()).is_text_port());
        assert!(text_packet(PacketValue::Int(1)).is_text_port());
        assert!(text_packet(PacketValue::Null).is_text_port());
        assert!(InboundPacket::new().is_text_port());
        assert!(!text_packet("POSITION_APP".into()).is_text_port());
        assert!(!text_packet(PacketValue::Int(3)).is_text_port());
    }

    #[test]
    fn sent_time_lookup_order() {
        let p = InboundPacket::new()
            .with("timestamp", 30i64)
            .with("decoded", PacketValue::map([("time", PacketValue::Int(20))]));
        assert_eq!(p.sent_time_metadata(), Some(SentTimeRaw::Epoch(20.0)));

        let p = InboundPacket::new()
            .with("timestamp", "2024-01-01T00:00:00Z")
            .with("decoded", PacketValue::map([("time", PacketValue::Int(0))]));
        assert_eq!(
            p.sent_time_metadata(),
            Some(SentTimeRaw::Text("2024-01-01T00:00:00Z"))
        );
    }

    #[test]
    fn trace_json_renders_bytes_readably() {
        let p = InboundPacket::new()
            .with("id", 7u32)
            .with("payload", vec![0xffu8, 0x00])
            .with("decoded", PacketValue::map([("payload", PacketValue::from(b"hi".as_slice()))]));
        let json = p.to_trace_json();
        assert_eq!(json["id"], 7);
        assert_eq!(json["payload"], "ff00");
        assert_eq!(json["decoded"]["payload"], "hi");
    }
}
