mod common;

use common::GGA_MUNICH;
use meshtrack::codec::{parse_tx_epoch, Template};
use meshtrack::gps::{GpsError, GpsSource};
use meshtrack::meshtastic::{DeliveryHandle, Destination, RadioLink, TransportError};
use meshtrack::pinger::{Pinger, PingerSettings};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// A receiver that always has a fix ready.
struct SteadyGps;

impl GpsSource for SteadyGps {
    fn read_sentence(&mut self, _timeout: Duration) -> Result<String, GpsError> {
        Ok(GGA_MUNICH.to_string())
    }
}

/// A receiver that never produces a line.
struct SilentGps;

impl GpsSource for SilentGps {
    fn read_sentence(&mut self, timeout: Duration) -> Result<String, GpsError> {
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
        Err(GpsError::Timeout {
            seconds: timeout.as_secs_f64(),
        })
    }
}

#[derive(Clone, Default)]
struct SharedRadio {
    sent: Arc<Mutex<Vec<String>>>,
}

impl RadioLink for SharedRadio {
    fn send_text(&mut self, text: &str, _destination: &Destination, _want_ack: bool) -> Result<DeliveryHandle, TransportError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(text.to_string());
        Ok(DeliveryHandle {
            packet_id: sent.len() as u32,
        })
    }

    fn snr_for(&self, _destination: &Destination) -> Option<f32> {
        Some(-3.5)
    }

    fn latest_snr(&self) -> Option<f32> {
        Some(9.0)
    }
}

fn settings() -> PingerSettings {
    PingerSettings {
        destination: Destination::parse("1234"),
        template: Template::parse("GPS {lat:.5f},{lon:.5f} snr {snr:.1f} radio {radio_snr:.1f}").unwrap(),
        want_ack: false,
        interval: Duration::from_millis(20),
        gps_timeout: Duration::from_millis(200),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn run_sends_every_interval_until_shutdown() {
    let radio = SharedRadio::default();
    let sent = Arc::clone(&radio.sent);
    let mut pinger = Pinger::new(SteadyGps, radio, settings());
    let (stop_tx, stop_rx) = watch::channel(false);

    let watched = Arc::clone(&sent);
    let stopper = async move {
        for _ in 0..200 {
            if watched.lock().unwrap().len() >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        stop_tx.send(true).unwrap();
    };
    let (result, _) = tokio::join!(pinger.run(stop_rx), stopper);
    result.unwrap();

    let sent = sent.lock().unwrap();
    assert!(sent.len() >= 3, "{:?}", *sent);
    for text in sent.iter() {
        assert!(text.starts_with("GPS 48.11730,11.51667 snr -3.5 radio 9.0 tx="), "{}", text);
        assert!(parse_tx_epoch(text).is_some());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_fixes_do_not_stop_the_loop() {
    let radio = SharedRadio::default();
    let sent = Arc::clone(&radio.sent);
    let mut pinger = Pinger::new(SilentGps, radio, settings());
    let (stop_tx, stop_rx) = watch::channel(false);

    let stopper = async move {
        tokio::time::sleep(Duration::from_millis(600)).await;
        stop_tx.send(true).unwrap();
    };
    let (result, _) = tokio::join!(pinger.run(stop_rx), stopper);
    result.unwrap();
    assert!(sent.lock().unwrap().is_empty());
}
