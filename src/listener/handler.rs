use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Mutex;

use super::dedup::{DedupWindow, Fingerprint};
use super::extract::extract_text;
use super::packet::InboundPacket;
use crate::codec::{decode_sent_time, delay_seconds};
use crate::logutil::escape_log;
use crate::metrics;
use crate::storage::{LogEntry, LogStore, StorageError, TraceSink};

/// Receive-side packet pipeline: dedup, trace, filter, extract, time, append.
///
/// Safe to call from several transport threads at once; the dedup window and the
/// log file are each behind a mutex.
pub struct PacketHandler {
    dedup: Mutex<DedupWindow>,
    store: Mutex<LogStore>,
    trace: Option<TraceSink>,
}

impl PacketHandler {
    pub fn new(store: LogStore, window: usize) -> Self {
        Self {
            dedup: Mutex::new(DedupWindow::new(window)),
            store: Mutex::new(store),
            trace: None,
        }
    }

    pub fn with_trace(mut self, sink: TraceSink) -> Self {
        self.trace = Some(sink);
        self
    }

    /// Process one packet observed at `now`.
    ///
    /// `Ok(None)` means the packet was dropped on purpose (duplicate, non-text port,
    /// no recoverable text). Only a failed log append is an error.
    pub fn handle_inbound(
        &self,
        packet: &InboundPacket,
        now: DateTime<Utc>,
    ) -> Result<Option<LogEntry>, StorageError> {
        match Fingerprint::of(packet) {
            Ok(fp) => {
                let fresh = match self.dedup.lock() {
                    Ok(mut window) => window.insert(fp),
                    Err(poisoned) => poisoned.into_inner().insert(fp),
                };
                if !fresh {
                    debug!("Duplicate packet ignored (id={:?})", packet.id());
                    metrics::inc_duplicates_dropped();
                    return Ok(None);
                }
            }
            // Without a key the packet is handled as new.
            Err(e) => warn!("Could not fingerprint packet: {}", e),
        }
        metrics::inc_packets_seen();
        self.trace(packet);

        if !packet.is_text_port() {
            debug!("Ignoring non-text port {:?}", packet.port());
            metrics::inc_non_text_dropped();
            return Ok(None);
        }

        let message = match extract_text(packet) {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                debug!(
                    "Ignoring packet without text (keys={:?})",
                    packet.keys().collect::<Vec<_>>()
                );
                metrics::inc_empty_dropped();
                return Ok(None);
            }
        };

        let entry = match decode_sent_time(&message, packet.sent_time_metadata(), now) {
            Some((sent_at, source)) => LogEntry {
                delay_s: Some(delay_seconds(source, sent_at, now)),
                sent_at: Some(sent_at),
                received_at: now,
                message,
            },
            None => LogEntry::unsent(message, now),
        };

        {
            let mut store = match self.store.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            store.append(&entry)?;
        }
        metrics::inc_entries_logged();
        info!(
            "Received message: {} (delay_s={})",
            escape_log(&entry.message),
            entry
                .delay_s
                .map_or_else(|| "n/a".to_string(), |d| format!("{:.3}", d))
        );
        Ok(Some(entry))
    }

    fn trace(&self, packet: &InboundPacket) {
        let Some(sink) = &self.trace else {
            return;
        };
        if let Err(e) = sink.record(&packet.to_trace_json()) {
            warn!("Failed to write raw packet trace to {}: {}", sink.path().display(), e);
        }
    }
}
