//! Recovering the send time of a received message.
//!
//! Three sources are tried, most trustworthy first:
//!
//! 1. a `tx=<epoch>` tag written by [`super::append_tx_tag`]
//! 2. timestamp metadata carried by the packet itself
//! 3. an `HH:MM:SS` token at the very end of the text, placed on the receive date
use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Where a reconstructed send time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentTimeSource {
    TxTag,
    Metadata,
    MessageTail,
}

/// Packet timestamp metadata before interpretation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SentTimeRaw<'a> {
    /// Seconds since the Unix epoch.
    Epoch(f64),
    /// An ISO-8601 string, or a string of digits holding epoch seconds.
    Text(&'a str),
}

fn tx_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\btx=(\d+(?:\.\d+)?)").expect("valid tx tag regex"))
}

/// Epoch seconds from the first `tx=` tag in `text`.
pub fn parse_tx_epoch(text: &str) -> Option<f64> {
    tx_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

pub fn epoch_to_utc(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() {
        return None;
    }
    let secs = epoch.floor();
    let nanos = ((epoch - secs) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(secs as i64, nanos).single()
}

/// Interpret packet metadata as an absolute time.
///
/// Strings of digits are epoch seconds. Other strings must be ISO-8601; naive
/// forms (no offset) are taken as UTC.
pub fn parse_sent_metadata(raw: SentTimeRaw<'_>) -> Option<DateTime<Utc>> {
    match raw {
        SentTimeRaw::Epoch(v) => epoch_to_utc(v),
        SentTimeRaw::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if s.bytes().all(|b| b.is_ascii_digit()) {
                return s.parse::<f64>().ok().and_then(epoch_to_utc);
            }
            parse_iso(s)
        }
    }
}

/// ISO-8601 with `Z`, an explicit offset, or no zone at all (UTC assumed).
pub fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// An `HH:MM:SS` final token, placed on `received_at`'s calendar date.
///
/// No day correction is applied: a message sent just before midnight and
/// received after it reconstructs to the later day.
pub fn parse_tail_time(text: &str, received_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let token = text.split_whitespace().last()?;
    if token.len() != 8 {
        return None;
    }
    let tod = NaiveTime::parse_from_str(token, "%H:%M:%S").ok()?;
    Some(received_at.date_naive().and_time(tod).and_utc())
}

/// Best available send time, tried in order of trust.
pub fn decode_sent_time(
    text: &str,
    metadata: Option<SentTimeRaw<'_>>,
    received_at: DateTime<Utc>,
) -> Option<(DateTime<Utc>, SentTimeSource)> {
    if let Some(at) = parse_tx_epoch(text).and_then(epoch_to_utc) {
        return Some((at, SentTimeSource::TxTag));
    }
    if let Some(at) = metadata.and_then(parse_sent_metadata) {
        return Some((at, SentTimeSource::Metadata));
    }
    parse_tail_time(text, received_at).map(|at| (at, SentTimeSource::MessageTail))
}

/// Seconds between send and receive.
///
/// A tx tag comes from a trusted sender clock, so negative skew clamps to zero.
/// The other sources are coarse enough that only the magnitude is meaningful.
pub fn delay_seconds(source: SentTimeSource, sent_at: DateTime<Utc>, received_at: DateTime<Utc>) -> f64 {
    let diff = (received_at - sent_at).num_microseconds().unwrap_or(i64::MAX) as f64 / 1e6;
    match source {
        SentTimeSource::TxTag => diff.max(0.0),
        SentTimeSource::Metadata | SentTimeSource::MessageTail => diff.abs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, h, m, s).unwrap()
    }

    #[test]
    fn tx_tag_is_found_anywhere() {
        assert_eq!(parse_tx_epoch("GPS 1,2 tx=1716208800.250"), Some(1716208800.25));
        assert_eq!(parse_tx_epoch("tx=42 trailing"), Some(42.0));
        assert_eq!(parse_tx_epoch("ctx=42"), None);
        assert_eq!(parse_tx_epoch("no tag"), None);
    }

    #[test]
    fn metadata_accepts_epoch_digits_and_iso_forms() {
        let expected = at(12, 0, 0);
        let epoch = expected.timestamp().to_string();
        assert_eq!(parse_sent_metadata(SentTimeRaw::Text(&epoch)), Some(expected));
        assert_eq!(
            parse_sent_metadata(SentTimeRaw::Epoch(expected.timestamp() as f64)),
            Some(expected)
        );
        assert_eq!(parse_sent_metadata(SentTimeRaw::Text("2024-05-20T12:00:00Z")), Some(expected));
        assert_eq!(parse_sent_metadata(SentTimeRaw::Text("2024-05-20T14:00:00+02:00")), Some(expected));
        assert_eq!(parse_sent_metadata(SentTimeRaw::Text("2024-05-20T12:00:00")), Some(expected));
        assert_eq!(parse_sent_metadata(SentTimeRaw::Text("yesterday")), None);
    }

    #[test]
    fn tail_time_uses_receive_date() {
        let received = at(12, 0, 10);
        assert_eq!(parse_tail_time("position 12:00:00", received), Some(at(12, 0, 0)));
        assert_eq!(parse_tail_time("position 2:00:00", received), None);
        assert_eq!(parse_tail_time("12:00:00 then more", received), None);
    }

    #[test]
    fn tx_tag_outranks_metadata_and_tail() {
        let received = at(12, 0, 10);
        let text = format!("hi 11:00:00 tx={}", at(12, 0, 5).timestamp());
        let (sent, source) =
            decode_sent_time(&text, Some(SentTimeRaw::Text("2024-05-20T10:00:00Z")), received).unwrap();
        assert_eq!(source, SentTimeSource::TxTag);
        assert_eq!(sent, at(12, 0, 5));
    }

    #[test]
    fn delay_clamps_only_for_tx_tag() {
        let received = at(12, 0, 0);
        let later = at(12, 0, 3);
        assert_eq!(delay_seconds(SentTimeSource::TxTag, later, received), 0.0);
        assert_eq!(delay_seconds(SentTimeSource::Metadata, later, received), 3.0);
        assert_eq!(delay_seconds(SentTimeSource::MessageTail, received, later), 3.0);
    }
}
