//! Text recovery from packets of varying shape.
//!
//! Each strategy is a pure function tried in order; the first non-empty result
//! wins. New firmware quirks get a new strategy rather than another branch.
use super::packet::{InboundPacket, PacketValue};

pub type Strategy = fn(&InboundPacket) -> Option<String>;

/// Extraction strategies in priority order.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("decoded", decoded_direct),
    ("decoded.text", decoded_text),
    ("decoded.payload", decoded_payload),
    ("decoded.payload.payload", decoded_nested_payload),
    ("payload", top_level_payload),
];

/// Run the strategy chain.
pub fn extract_text(packet: &InboundPacket) -> Option<String> {
    STRATEGIES
        .iter()
        .filter_map(|(name, strategy)| strategy(packet).map(|t| (*name, t)))
        .find(|(_, text)| !text.is_empty())
        .map(|(name, text)| {
            log::trace!("text recovered via {}", name);
            text
        })
}

/// Text or bytes as-is; a mapping yields its `text`, else its `payload`/`data` bytes.
fn decode_value(value: &PacketValue) -> Option<String> {
    match value {
        PacketValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        PacketValue::Text(s) => Some(s.clone()),
        PacketValue::Map(m) => {
            if let Some(text) = m.get("text").filter(|v| !matches!(v, PacketValue::Null)) {
                return Some(text.to_text());
            }
            match first_truthy(value, &["payload", "data"]) {
                Some(PacketValue::Bytes(b)) => Some(String::from_utf8_lossy(b).into_owned()),
                _ => None,
            }
        }
        _ => None,
    }
}

fn first_truthy<'a>(value: &'a PacketValue, keys: &[&str]) -> Option<&'a PacketValue> {
    keys.iter()
        .filter_map(|k| value.get(k))
        .find(|v| v.is_truthy())
}

fn decoded_direct(packet: &InboundPacket) -> Option<String> {
    packet.decoded().and_then(decode_value)
}

fn decoded_text(packet: &InboundPacket) -> Option<String> {
    packet
        .decoded_map()?
        .get("text")
        .filter(|v| !matches!(v, PacketValue::Null))
        .map(PacketValue::to_text)
}

fn decoded_payload(packet: &InboundPacket) -> Option<String> {
    packet
        .decoded_first(&["payload", "data"])
        .and_then(decode_value)
}

/// Some firmware builds wrap the bytes one level deeper, as
/// `decoded.payload.payload`. Only seen on hardware traces.
fn decoded_nested_payload(packet: &InboundPacket) -> Option<String> {
    match packet.decoded_map()?.get("payload")? {
        nested @ PacketValue::Map(_) => decode_value(nested),
        _ => None,
    }
}

fn top_level_payload(packet: &InboundPacket) -> Option<String> {
    ["payload", "data"]
        .iter()
        .filter_map(|k| packet.get(k))
        .find(|v| v.is_truthy())
        .and_then(decode_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_decoded(decoded: PacketValue) -> InboundPacket {
        InboundPacket::new().with("decoded", decoded)
    }

    #[test]
    fn decoded_may_be_plain_text_or_bytes() {
        assert_eq!(extract_text(&with_decoded("hello".into())).as_deref(), Some("hello"));
        assert_eq!(
            extract_text(&with_decoded(PacketValue::from(b"bytes".as_slice()))).as_deref(),
            Some("bytes")
        );
    }

    #[test]
    fn text_key_beats_payload() {
        let p = with_decoded(PacketValue::map([
            ("text", PacketValue::from("from text")),
            ("payload", PacketValue::from(b"from payload".as_slice())),
        ]));
        assert_eq!(extract_text(&p).as_deref(), Some("from text"));
    }

    #[test]
    fn payload_then_data() {
        let p = with_decoded(PacketValue::map([("data", PacketValue::from(b"via data".as_slice()))]));
        assert_eq!(extract_text(&p).as_deref(), Some("via data"));
        let p = with_decoded(PacketValue::map([("payload", PacketValue::from("as text"))]));
        assert_eq!(extract_text(&p).as_deref(), Some("as text"));
    }

    #[test]
    fn double_wrapped_payload() {
        let inner = PacketValue::map([("payload", PacketValue::from(b"deep".as_slice()))]);
        let p = with_decoded(PacketValue::map([("payload", inner)]));
        assert_eq!(extract_text(&p).as_deref(), Some("deep"));
    }

    #[test]
    fn top_level_fallback_and_lossy_utf8() {
        let p = InboundPacket::new().with("payload", vec![b'o', b'k', 0xff]);
        assert_eq!(extract_text(&p).as_deref(), Some("ok\u{fffd}"));
    }

    #[test]
    fn nothing_recoverable() {
        assert_eq!(extract_text(&InboundPacket::new()), None);
        let p = with_decoded(PacketValue::map([("portnum", PacketValue::from("TEXT_MESSAGE_APP"))]));
        assert_eq!(extract_text(&p), None);
        let p = with_decoded(PacketValue::map([("payload", PacketValue::Int(5))]));
        assert_eq!(extract_text(&p), None);
    }
}
