//! Bounded memory of recently seen packets.
use std::collections::{HashSet, VecDeque};

use super::packet::{InboundPacket, PacketValue};

/// Packets remembered by a listener unless configured otherwise.
pub const DEFAULT_DEDUP_WINDOW: usize = 200;

/// Deterministic identity of a packet.
///
/// The serialized tuple `(id, from, to, port, decoded.text, payload)` itself, not a
/// hash of it, so small identifier spaces cannot collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(packet: &InboundPacket) -> Result<Self, serde_json::Error> {
        let decoded = packet.decoded_map();
        let port = decoded.and_then(|m| m.get("portnum"));
        let text = decoded.and_then(|m| m.get("text"));
        let payload = match decoded {
            Some(m) => m.get("payload"),
            None => packet.get("payload"),
        };
        let key: (
            Option<&PacketValue>,
            Option<&PacketValue>,
            Option<&PacketValue>,
            Option<&PacketValue>,
            Option<&PacketValue>,
            Option<&PacketValue>,
        ) = (packet.id(), packet.from_node(), packet.get("to"), port, text, payload);
        serde_json::to_string(&key).map(Fingerprint)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// FIFO of the most recent fingerprints plus a set for membership tests.
///
/// The queue and the set always hold the same fingerprints.
#[derive(Debug)]
pub struct DedupWindow {
    capacity: usize,
    order: VecDeque<Fingerprint>,
    seen: HashSet<Fingerprint>,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity + 1),
            seen: HashSet::with_capacity(capacity + 1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.seen.contains(fp)
    }

    /// Record `fp`; returns false if it was already in the window.
    pub fn insert(&mut self, fp: Fingerprint) -> bool {
        if self.seen.contains(&fp) {
            return false;
        }
        self.seen.insert(fp.clone());
        self.order.push_back(fp);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(n: usize) -> Fingerprint {
        Fingerprint(format!("[{}]", n))
    }

    #[test]
    fn duplicate_is_rejected() {
        let mut w = DedupWindow::new(3);
        assert!(w.insert(fp(1)));
        assert!(!w.insert(fp(1)));
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn oldest_is_evicted_and_set_stays_consistent() {
        let mut w = DedupWindow::new(3);
        for n in 0..5 {
            assert!(w.insert(fp(n)));
            assert!(w.len() <= 3);
            assert_eq!(w.order.len(), w.seen.len());
        }
        assert!(!w.contains(&fp(0)));
        assert!(!w.contains(&fp(1)));
        assert!(w.contains(&fp(4)));
        assert!(w.insert(fp(0)));
    }

    #[test]
    fn fingerprint_distinguishes_text_from_bytes() {
        let a = InboundPacket::new()
            .with("id", 1i64)
            .with("decoded", PacketValue::map([("payload", PacketValue::from("hi"))]));
        let b = InboundPacket::new()
            .with("id", 1i64)
            .with("decoded", PacketValue::map([("payload", PacketValue::from(b"hi".as_slice()))]));
        assert_ne!(Fingerprint::of(&a).unwrap(), Fingerprint::of(&b).unwrap());
    }

    #[test]
    fn fingerprint_ignores_fields_outside_the_key() {
        let a = InboundPacket::new().with("id", 9i64).with("rx_snr", 1.5f64);
        let b = InboundPacket::new().with("id", 9i64).with("rx_snr", -3.0f64);
        assert_eq!(Fingerprint::of(&a).unwrap(), Fingerprint::of(&b).unwrap());
    }
}
