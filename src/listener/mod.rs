//! # Listener - Received Message Logging
//!
//! Takes packets from the radio transport and appends the text messages among them
//! to the message log with send/receive timing.
//!
//! The transport hands packets over on two independent paths, a direct callback and
//! a broadcast subscription, and the same physical packet may arrive on both. Both
//! paths feed one [`PacketHandler`], whose dedup window makes repeated delivery
//! harmless.
//!
//! - [`packet`] - loosely typed packet view
//! - [`dedup`] - fingerprint and bounded dedup window
//! - [`extract`] - text recovery strategy chain
//! - [`PacketHandler::handle_inbound`] - the per-packet pipeline

pub mod dedup;
pub mod extract;
mod handler;
pub mod packet;

use chrono::Utc;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

pub use dedup::{DedupWindow, Fingerprint, DEFAULT_DEDUP_WINDOW};
pub use extract::extract_text;
pub use handler::PacketHandler;
pub use packet::{InboundPacket, PacketValue};

/// Direct-delivery callback registered with a transport.
pub type PacketCallback = Box<dyn Fn(&InboundPacket) + Send + Sync>;

/// A source of received packets.
pub trait PacketFeed {
    /// Install the direct callback, replacing any previous one.
    fn on_receive(&mut self, callback: PacketCallback);

    /// A fresh subscription to the broadcast of received packets.
    fn subscribe(&self) -> broadcast::Receiver<InboundPacket>;
}

fn deliver(handler: &PacketHandler, packet: &InboundPacket) {
    if let Err(e) = handler.handle_inbound(packet, Utc::now()) {
        error!("Failed to log received message: {}", e);
    }
}

/// File I/O; keep it off the async workers.
async fn log_blocking(handler: &Arc<PacketHandler>, packet: InboundPacket) -> anyhow::Result<()> {
    let handler = Arc::clone(handler);
    tokio::task::spawn_blocking(move || deliver(&handler, &packet)).await?;
    Ok(())
}

/// Consume both delivery paths until `shutdown` flips to true.
///
/// Append failures are logged per packet; the loop keeps running.
pub async fn run_listener<F>(
    feed: &mut F,
    handler: Arc<PacketHandler>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    F: PacketFeed + ?Sized,
{
    // The callback runs on the transport's reader; it only queues, the loop below logs.
    let (direct_tx, mut direct) = mpsc::unbounded_channel::<InboundPacket>();
    feed.on_receive(Box::new(move |packet| {
        // Fails only once the listener has stopped.
        let _ = direct_tx.send(packet.clone());
    }));
    let mut events = feed.subscribe();
    info!("Listener active, waiting for messages...");

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            Some(packet) = direct.recv() => {
                log_blocking(&handler, packet).await?;
            }
            received = events.recv() => match received {
                Ok(packet) => log_blocking(&handler, packet).await?,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Listener lagged behind the packet broadcast, {} packets skipped", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("Packet broadcast closed; stopping listener");
                    break;
                }
            },
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
    info!("Listener stopped ({})", crate::metrics::snapshot());
    Ok(())
}
