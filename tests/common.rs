//! Test utilities & fixtures shared by the integration tests.

use meshtrack::listener::{InboundPacket, PacketCallback, PacketFeed, PacketValue};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// A GGA sentence with a valid fix near Munich.
#[allow(dead_code)]
pub const GGA_MUNICH: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

/// A text-port packet the way the radio transport hands it over.
#[allow(dead_code)]
pub fn text_packet(id: u32, from: u32, text: &str) -> InboundPacket {
    InboundPacket::new()
        .with("id", id)
        .with("from", from)
        .with("to", 0xffff_ffffu32)
        .with(
            "decoded",
            PacketValue::map([
                ("portnum", PacketValue::from("TEXT_MESSAGE_APP")),
                ("payload", PacketValue::from(text.as_bytes())),
                ("text", PacketValue::from(text)),
            ]),
        )
}

/// Lines of a file, or nothing if it does not exist yet.
#[allow(dead_code)]
pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Transport stand-in: the test drives delivery through [`FeedHandle`].
#[allow(dead_code)]
pub struct FakeFeed {
    shared: Arc<FeedShared>,
}

#[allow(dead_code)]
pub struct FeedShared {
    callback: Mutex<Option<PacketCallback>>,
    packets: broadcast::Sender<InboundPacket>,
}

#[allow(dead_code)]
pub type FeedHandle = Arc<FeedShared>;

#[allow(dead_code)]
impl FakeFeed {
    pub fn new() -> Self {
        let (packets, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(FeedShared {
                callback: Mutex::new(None),
                packets,
            }),
        }
    }

    pub fn handle(&self) -> FeedHandle {
        Arc::clone(&self.shared)
    }
}

#[allow(dead_code)]
impl FeedShared {
    /// True once a listener installed its callback and subscribed.
    pub fn ready(&self) -> bool {
        self.callback.lock().unwrap().is_some() && self.packets.receiver_count() > 0
    }

    /// Deliver on both paths, like a transport that double-reports.
    pub fn deliver_twice(&self, packet: &InboundPacket) {
        if let Some(cb) = self.callback.lock().unwrap().as_ref() {
            cb(packet);
        }
        let _ = self.packets.send(packet.clone());
    }

    /// Deliver through the callback only.
    pub fn deliver_direct(&self, packet: &InboundPacket) {
        if let Some(cb) = self.callback.lock().unwrap().as_ref() {
            cb(packet);
        }
    }
}

impl PacketFeed for FakeFeed {
    fn on_receive(&mut self, callback: PacketCallback) {
        *self.shared.callback.lock().unwrap() = Some(callback);
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundPacket> {
        self.shared.packets.subscribe()
    }
}
