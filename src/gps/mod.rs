//! # GPS Fix Acquisition
//!
//! Turns a stream of NMEA sentences from a serial GPS receiver into [`GpsFix`] values.
//!
//! - [`nmea`] - pure sentence parser (`parse_sentence`), no I/O
//! - [`GpsSource`] - the sentence source seam; [`SerialGpsReader`] is the hardware implementation
//! - [`acquire_fix`] - read sentences until one parses into a fix or the deadline passes
//!
//! ```rust,no_run
//! # #[cfg(feature = "serial")]
//! # fn demo() -> Result<(), meshtrack::gps::GpsError> {
//! use meshtrack::gps::{acquire_fix, SerialGpsReader};
//! use std::time::Duration;
//!
//! let mut reader = SerialGpsReader::open("/dev/ttyACM0", 9600)?;
//! let fix = acquire_fix(&mut reader, Duration::from_secs(15), || false)?;
//! println!("{:.6},{:.6}", fix.lat, fix.lon);
//! # Ok(())
//! # }
//! ```

pub mod nmea;

use chrono::{DateTime, Utc};
use log::{debug, trace};
use std::time::{Duration, Instant};
use thiserror::Error;

pub use nmea::{parse_sentence, parse_sentence_at};

pub const DEFAULT_GPS_BAUDRATE: u32 = 9600;

/// Longest slice a single `read_sentence` call may block, so cancellation is observed promptly.
const POLL_SLICE: Duration = Duration::from_secs(1);

/// A single position reading.
///
/// Only constructed by the parser for sentences that carry a usable position
/// (valid status, non-zero fix quality, both coordinates present).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    /// Signed decimal degrees, south negative.
    pub lat: f64,
    /// Signed decimal degrees, west negative.
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
    pub hdop: Option<f64>,
    pub satellites: Option<u32>,
    pub fix_quality: Option<u8>,
}

#[derive(Debug, Error)]
pub enum GpsError {
    #[error("timed out waiting for GPS fix after {seconds:.1}s")]
    Timeout { seconds: f64 },

    #[error("fix acquisition cancelled")]
    Cancelled,

    #[error("unable to detect GPS port; set gps.port or attach a receiver that identifies as GPS/GNSS")]
    NoPort,

    #[error("gps io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serial")]
    #[error("gps serial error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Source of raw NMEA sentences.
pub trait GpsSource {
    /// Return the next non-empty line, or [`GpsError::Timeout`] if none arrives within `timeout`.
    fn read_sentence(&mut self, timeout: Duration) -> Result<String, GpsError>;
}

/// Read sentences until one yields a fix.
///
/// Unparseable sentences are skipped silently. `cancelled` is polled at least once per
/// second; when it returns true the call ends with [`GpsError::Cancelled`].
pub fn acquire_fix<S, C>(source: &mut S, timeout: Duration, cancelled: C) -> Result<GpsFix, GpsError>
where
    S: GpsSource + ?Sized,
    C: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if cancelled() {
            return Err(GpsError::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(GpsError::Timeout {
                seconds: timeout.as_secs_f64(),
            });
        }
        let slice = (deadline - now).min(POLL_SLICE);
        match source.read_sentence(slice) {
            Ok(sentence) => {
                trace!("NMEA: {}", crate::logutil::escape_log(&sentence));
                if let Some(fix) = parse_sentence(&sentence) {
                    debug!(
                        "GPS fix acquired: lat={:.6} lon={:.6} q={:?}",
                        fix.lat, fix.lon, fix.fix_quality
                    );
                    return Ok(fix);
                }
            }
            Err(GpsError::Timeout { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(feature = "serial")]
pub use serial_reader::SerialGpsReader;

#[cfg(feature = "serial")]
mod serial_reader {
    use super::{GpsError, GpsSource};
    use log::{debug, info};
    use serialport::{ClearBuffer, SerialPort};
    use std::io::{ErrorKind, Read};
    use std::time::{Duration, Instant};

    /// Drop a partial line that grows past any sane NMEA length (82 chars by the standard).
    const MAX_LINE: usize = 512;

    /// Line reader over a serial GPS receiver.
    pub struct SerialGpsReader {
        port_name: String,
        port: Box<dyn SerialPort>,
        buf: Vec<u8>,
    }

    impl SerialGpsReader {
        pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, GpsError> {
            info!("Opening GPS receiver on {} at {} baud", port_name, baud_rate);
            let port = serialport::new(port_name, baud_rate)
                .timeout(Duration::from_secs(1))
                .open()?;
            // Stale sentences from before we started are useless for a live fix.
            if let Err(e) = port.clear(ClearBuffer::Input) {
                debug!("GPS input buffer clear failed on {}: {}", port_name, e);
            }
            Ok(Self {
                port_name: port_name.to_string(),
                port,
                buf: Vec::with_capacity(128),
            })
        }

        pub fn port_name(&self) -> &str {
            &self.port_name
        }

        fn take_line(&mut self) -> Option<String> {
            while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                // ASCII only; receivers occasionally emit binary noise at boot.
                let text: String = line
                    .iter()
                    .filter(|b| b.is_ascii())
                    .map(|&b| b as char)
                    .collect();
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
            None
        }
    }

    impl GpsSource for SerialGpsReader {
        fn read_sentence(&mut self, timeout: Duration) -> Result<String, GpsError> {
            let deadline = Instant::now() + timeout;
            let mut chunk = [0u8; 256];
            loop {
                if let Some(line) = self.take_line() {
                    return Ok(line);
                }
                let now = Instant::now();
                if now >= deadline {
                    return Err(GpsError::Timeout {
                        seconds: timeout.as_secs_f64(),
                    });
                }
                self.port.set_timeout(deadline - now)?;
                match self.port.read(&mut chunk) {
                    Ok(0) => {}
                    Ok(n) => {
                        self.buf.extend_from_slice(&chunk[..n]);
                        if self.buf.len() > MAX_LINE && !self.buf.contains(&b'\n') {
                            self.buf.clear();
                        }
                    }
                    Err(ref e) if e.kind() == ErrorKind::TimedOut => {}
                    Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => return Err(GpsError::Io(e)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<&'static str>);

    impl GpsSource for Scripted {
        fn read_sentence(&mut self, timeout: Duration) -> Result<String, GpsError> {
            self.0
                .pop_front()
                .map(str::to_string)
                .ok_or(GpsError::Timeout {
                    seconds: timeout.as_secs_f64(),
                })
        }
    }

    #[test]
    fn skips_noise_until_a_fix_arrives() {
        let mut src = Scripted(VecDeque::from(vec![
            "garbage",
            "$GPGSV,3,1,11,03,03,111,00",
            "$GPGGA,123519,4807.038,N,01131.000,E,0,08,0.9,545.4,M,46.9,M,,*46",
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47",
        ]));
        let fix = acquire_fix(&mut src, Duration::from_secs(5), || false).expect("fix");
        assert_eq!(fix.satellites, Some(8));
        assert!(src.0.is_empty());
    }

    #[test]
    fn times_out_without_a_fix() {
        let mut src = Scripted(VecDeque::new());
        let err = acquire_fix(&mut src, Duration::from_millis(30), || false).unwrap_err();
        assert!(matches!(err, GpsError::Timeout { .. }));
    }

    #[test]
    fn cancellation_wins_over_waiting() {
        let mut src = Scripted(VecDeque::new());
        let err = acquire_fix(&mut src, Duration::from_secs(30), || true).unwrap_err();
        assert!(matches!(err, GpsError::Cancelled));
    }
}
