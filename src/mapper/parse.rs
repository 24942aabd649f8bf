//! Message log parsing for the map renderer.
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::codec::timing::parse_iso;
use crate::storage::NOT_AVAILABLE;

use super::MapError;

/// Lines of interest start with this marker.
pub const MESSAGE_MARKER: &str = "message:";

/// A log line carrying a `GPS <lat>,<lon>` token.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsLogMessage {
    pub lat: f64,
    pub lon: f64,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub delay_seconds: Option<f64>,
    pub satellites: Option<u32>,
    pub hdop: Option<f64>,
    pub raw_message: String,
}

struct Patterns {
    gps: Regex,
    sent_at: Regex,
    received_at: Regex,
    delay: Regex,
    sats: Regex,
    hdop: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        gps: Regex::new(r"GPS\s+(-?\d+\.\d+),(-?\d+\.\d+)").expect("gps regex"),
        sent_at: Regex::new(r"sent_at:\s+([^|]+)").expect("sent_at regex"),
        received_at: Regex::new(r"received_at:\s+([^|]+)").expect("received_at regex"),
        delay: Regex::new(r"delay_s:\s+([^|]+)").expect("delay regex"),
        sats: Regex::new(r"sats\s+(\d+)").expect("sats regex"),
        hdop: Regex::new(r"hdop\s+([\d.]+)").expect("hdop regex"),
    })
}

fn capture<'a>(re: &Regex, line: &'a str) -> Option<&'a str> {
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty() && *s != NOT_AVAILABLE)
}

/// Parse one log line; `None` for lines that are not GPS messages.
pub fn parse_line(line: &str) -> Option<GpsLogMessage> {
    let line = line.trim();
    if !line.starts_with(MESSAGE_MARKER) {
        return None;
    }
    let p = patterns();
    let gps = p.gps.captures(line)?;
    let lat = gps.get(1)?.as_str().parse::<f64>().ok()?;
    let lon = gps.get(2)?.as_str().parse::<f64>().ok()?;

    Some(GpsLogMessage {
        lat,
        lon,
        sent_at: capture(&p.sent_at, line).and_then(parse_iso),
        received_at: capture(&p.received_at, line).and_then(parse_iso),
        delay_seconds: capture(&p.delay, line).and_then(|s| s.parse().ok()),
        satellites: capture(&p.sats, line).and_then(|s| s.parse().ok()),
        hdop: capture(&p.hdop, line).and_then(|s| s.parse().ok()),
        raw_message: line.to_string(),
    })
}

/// Every GPS message in `path`, in file order. A missing file has none.
pub fn parse_file(path: &Path) -> Result<Vec<GpsLogMessage>, MapError> {
    let content = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(MapError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    Ok(content.lines().filter_map(parse_line).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_reference_line() {
        let m = parse_line(
            "message: GPS 48.1173,11.5167 sats 8 hdop 0.9 | sent_at: n/a | received_at: 2024-01-01T00:00:00 | delay_s: n/a",
        )
        .expect("gps line");
        assert_eq!(m.lat, 48.1173);
        assert_eq!(m.lon, 11.5167);
        assert_eq!(m.satellites, Some(8));
        assert_eq!(m.hdop, Some(0.9));
        assert_eq!(m.sent_at, None);
        assert_eq!(m.delay_seconds, None);
        assert_eq!(m.received_at, Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn parses_full_timing() {
        let m = parse_line(
            "message: GPS -33.5,-70.25 tx=1704067199.000 | sent_at: 2024-01-01T00:00:00.000Z | received_at: 2024-01-01T01:00:02.500+01:00 | delay_s: 2.500",
        )
        .unwrap();
        assert_eq!(m.lat, -33.5);
        assert_eq!(m.lon, -70.25);
        assert_eq!(m.sent_at, Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(
            m.received_at,
            Some(Utc.timestamp_millis_opt(1_704_067_202_500).unwrap())
        );
        assert_eq!(m.delay_seconds, Some(2.5));
        assert_eq!(m.satellites, None);
    }

    #[test]
    fn skips_lines_without_marker_or_position() {
        assert!(parse_line("GPS 1.0,2.0").is_none());
        assert!(parse_line("message: hello | sent_at: n/a | received_at: 2024-01-01T00:00:00 | delay_s: n/a").is_none());
        assert!(parse_line("message: GPS 1,2").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse_file(&dir.path().join("absent.txt")).unwrap().is_empty());
    }
}
