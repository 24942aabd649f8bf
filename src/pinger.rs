//! # Pinger - GPS to Radio Loop
//!
//! Acquire a fix, render it through the message template with signal-strength
//! enrichment, tag it with the send time and hand it to the radio. Then wait for the
//! configured interval and repeat.
//!
//! Fix timeouts, template failures and send failures end only the current cycle.

use chrono::Utc;
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::watch;

use crate::codec::{self, FieldValue, Fields, Template};
use crate::gps::{acquire_fix, GpsError, GpsSource};
use crate::logutil::escape_log;
use crate::meshtastic::{DeliveryHandle, Destination, RadioLink};
use crate::metrics;

/// Everything a pinger needs besides its two devices.
#[derive(Debug, Clone)]
pub struct PingerSettings {
    pub destination: Destination,
    pub template: Template,
    pub want_ack: bool,
    pub interval: Duration,
    pub gps_timeout: Duration,
}

/// Result of one acquire-and-send attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Sent { handle: DeliveryHandle, text: String },
    NoFix,
    Cancelled,
    TemplateFailed,
    SendFailed,
}

pub struct Pinger<G, R> {
    gps: G,
    radio: R,
    settings: PingerSettings,
}

impl<G: GpsSource, R: RadioLink> Pinger<G, R> {
    pub fn new(gps: G, radio: R, settings: PingerSettings) -> Self {
        Self { gps, radio, settings }
    }

    pub fn settings(&self) -> &PingerSettings {
        &self.settings
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Give the devices back, e.g. to close the radio link.
    pub fn into_parts(self) -> (G, R) {
        (self.gps, self.radio)
    }

    /// `snr` of the destination and `radio_snr` of the last heard node.
    pub fn enrichment(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            "snr".into(),
            FieldValue::reading(self.radio.snr_for(&self.settings.destination).map(f64::from)),
        );
        fields.insert(
            "radio_snr".into(),
            FieldValue::reading(self.radio.latest_snr().map(f64::from)),
        );
        fields
    }

    /// One acquire-and-send attempt. Only unexpected GPS failures come back as `Err`.
    pub fn cycle<C: Fn() -> bool>(&mut self, cancelled: C) -> Result<CycleOutcome, GpsError> {
        let fix = match acquire_fix(&mut self.gps, self.settings.gps_timeout, cancelled) {
            Ok(fix) => fix,
            Err(GpsError::Timeout { seconds }) => {
                metrics::inc_fix_timeouts();
                warn!("No GPS fix within {:.1}s; retrying next cycle", seconds);
                return Ok(CycleOutcome::NoFix);
            }
            Err(GpsError::Cancelled) => return Ok(CycleOutcome::Cancelled),
            Err(e) => return Err(e),
        };
        metrics::inc_fixes_acquired();

        let text = match codec::encode(&self.settings.template, &fix, &self.enrichment(), Utc::now()) {
            Ok(text) => text,
            Err(e) => {
                error!("Message template failed, skipping send: {}", e);
                return Ok(CycleOutcome::TemplateFailed);
            }
        };

        match self
            .radio
            .send_text(&text, &self.settings.destination, self.settings.want_ack)
        {
            Ok(handle) => {
                metrics::inc_messages_sent();
                info!(
                    "Sent to {}: {}",
                    self.settings.destination,
                    escape_log(&text)
                );
                debug!("Packet id {}", handle.packet_id);
                Ok(CycleOutcome::Sent { handle, text })
            }
            Err(e) => {
                metrics::inc_send_failures();
                error!("Send to {} failed: {}", self.settings.destination, e);
                Ok(CycleOutcome::SendFailed)
            }
        }
    }

    /// Run cycles until `shutdown` flips to true.
    ///
    /// GPS reads block, so they run under `block_in_place`; this needs the
    /// multi-threaded runtime.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            "Pinger started: target={} interval={:.1}s gps_timeout={:.1}s",
            self.settings.destination,
            self.settings.interval.as_secs_f64(),
            self.settings.gps_timeout.as_secs_f64()
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            let flag = shutdown.clone();
            let outcome = tokio::task::block_in_place(|| self.cycle(|| *flag.borrow()));
            match outcome {
                Ok(CycleOutcome::Cancelled) => break,
                Ok(_) => {}
                Err(e) => error!("GPS read failed: {}", e),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Pinger stopped. {}", metrics::snapshot());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meshtastic::TransportError;
    use std::collections::VecDeque;

    struct ScriptedGps(VecDeque<String>);

    impl GpsSource for ScriptedGps {
        fn read_sentence(&mut self, timeout: Duration) -> Result<String, GpsError> {
            self.0.pop_front().ok_or(GpsError::Timeout {
                seconds: timeout.as_secs_f64(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingRadio {
        sent: Vec<(String, Destination, bool)>,
        snr: Option<f32>,
        fail: bool,
    }

    impl RadioLink for RecordingRadio {
        fn send_text(&mut self, text: &str, destination: &Destination, want_ack: bool) -> Result<DeliveryHandle, TransportError> {
            if self.fail {
                return Err(TransportError::NotConnected);
            }
            self.sent.push((text.to_string(), destination.clone(), want_ack));
            Ok(DeliveryHandle { packet_id: self.sent.len() as u32 })
        }
        fn snr_for(&self, _destination: &Destination) -> Option<f32> {
            self.snr
        }
        fn latest_snr(&self) -> Option<f32> {
            None
        }
    }

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";

    fn settings(template: &str) -> PingerSettings {
        PingerSettings {
            destination: Destination::parse("!a1b2c3d4"),
            template: Template::parse(template).unwrap(),
            want_ack: true,
            interval: Duration::from_millis(10),
            gps_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn sends_rendered_tagged_text() {
        let gps = ScriptedGps(vec!["garbage".to_string(), GGA.to_string()].into());
        let radio = RecordingRadio {
            snr: Some(6.25),
            ..Default::default()
        };
        let mut p = Pinger::new(gps, radio, settings("GPS {lat:.3f},{lon:.3f} snr {snr} r {radio_snr}"));
        let outcome = p.cycle(|| false).unwrap();
        let CycleOutcome::Sent { text, .. } = &outcome else {
            panic!("expected a send, got {:?}", outcome);
        };
        assert!(text.starts_with("GPS 48.117,11.517 snr 6.25 r n/a tx="), "{}", text);
        assert!(codec::parse_tx_epoch(&text).is_some());
        let (_, dest, ack) = &p.radio().sent[0];
        assert_eq!(dest, &Destination::NodeId("!a1b2c3d4".into()));
        assert!(*ack);
    }

    #[test]
    fn timeout_is_not_an_error() {
        let mut p = Pinger::new(ScriptedGps(VecDeque::new()), RecordingRadio::default(), settings("GPS {lat}"));
        assert_eq!(p.cycle(|| false).unwrap(), CycleOutcome::NoFix);
        assert!(p.radio().sent.is_empty());
    }

    #[test]
    fn template_and_send_failures_skip_the_cycle() {
        let gps = ScriptedGps(vec![GGA.to_string()].into());
        let mut p = Pinger::new(gps, RecordingRadio::default(), settings("GPS {altitude}"));
        assert_eq!(p.cycle(|| false).unwrap(), CycleOutcome::TemplateFailed);

        let gps = ScriptedGps(vec![GGA.to_string()].into());
        let radio = RecordingRadio {
            fail: true,
            ..Default::default()
        };
        let mut p = Pinger::new(gps, radio, settings("GPS {lat}"));
        assert_eq!(p.cycle(|| false).unwrap(), CycleOutcome::SendFailed);
    }

    #[test]
    fn cancellation_is_reported() {
        let gps = ScriptedGps(vec![GGA.to_string()].into());
        let mut p = Pinger::new(gps, RecordingRadio::default(), settings("GPS {lat}"));
        assert_eq!(p.cycle(|| true).unwrap(), CycleOutcome::Cancelled);
    }
}
