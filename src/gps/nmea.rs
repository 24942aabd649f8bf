//! NMEA 0183 sentence interpretation.
//!
//! Only the position-carrying sentence families are understood:
//!
//! - `GGA` - time, position, fix quality, satellites in use, HDOP
//! - `RMC` - time, status flag, position (the date field is not used, see below)
//! - `GLL` - position, time, status flag
//!
//! The talker prefix (`GP`, `GN`, `GL`, `GA`, `BD`, ...) is ignored. A trailing
//! `*hh` checksum is verified when present. Anything that does not parse yields
//! `None`; absence of a fix is the normal "not yet" state, never an error.
//!
//! Timestamps: sentences carry a UTC time of day only (RMC's date is ignored so every
//! family follows one rule). The time is combined with the current UTC date; a
//! result more than one minute in the future is moved back one day (the receiver
//! clock crossed midnight before the GPS did). No time of day means "now".
use chrono::{DateTime, Duration, NaiveTime, Utc};

use super::GpsFix;

/// Tolerance before a reconstructed timestamp is considered to be "tomorrow".
const FUTURE_TOLERANCE_SECS: i64 = 60;

/// Parse one raw sentence using the current wall clock for date reconstruction.
pub fn parse_sentence(raw: &str) -> Option<GpsFix> {
    parse_sentence_at(raw, Utc::now())
}

/// Parse one raw sentence, reconstructing the fix timestamp relative to `now`.
pub fn parse_sentence_at(raw: &str, now: DateTime<Utc>) -> Option<GpsFix> {
    let body = sentence_body(raw)?;
    let fields: Vec<&str> = body.split(',').collect();
    let kind = fields.first()?;
    if kind.len() < 3 || !kind.is_ascii() {
        return None;
    }
    // Talker-agnostic: the last three letters of the address name the sentence.
    match kind.get(kind.len() - 3..)? {
        "GGA" => parse_gga(&fields, now),
        "RMC" => parse_rmc(&fields, now),
        "GLL" => parse_gll(&fields, now),
        _ => None,
    }
}

/// Strip framing (`$`, `*hh`, line endings) and validate the checksum if present.
fn sentence_body(raw: &str) -> Option<&str> {
    let line = raw.trim();
    let line = line.strip_prefix('$').or_else(|| line.strip_prefix('!'))?;
    match line.split_once('*') {
        Some((body, checksum)) => {
            let expected = u8::from_str_radix(checksum.trim(), 16).ok()?;
            let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);
            (expected == actual).then_some(body)
        }
        None => Some(line),
    }
}

fn parse_gga(fields: &[&str], now: DateTime<Utc>) -> Option<GpsFix> {
    // $xxGGA,time,lat,N,lon,E,quality,numsats,hdop,alt,M,geoid,M,age,station
    let fix_quality = field(fields, 6).and_then(parse_u8);
    if fix_quality == Some(0) {
        return None;
    }
    let lat = coordinate(field(fields, 2)?, field(fields, 3)?, 'S')?;
    let lon = coordinate(field(fields, 4)?, field(fields, 5)?, 'W')?;
    Some(GpsFix {
        lat,
        lon,
        timestamp: build_timestamp(field(fields, 1).and_then(parse_time), now),
        hdop: field(fields, 8).and_then(parse_hdop),
        satellites: field(fields, 7).and_then(|s| s.parse::<u32>().ok()),
        fix_quality,
    })
}

fn parse_rmc(fields: &[&str], now: DateTime<Utc>) -> Option<GpsFix> {
    // $xxRMC,time,status,lat,N,lon,E,speed,course,date,magvar,E[,mode]
    if status_invalid(field(fields, 2)) {
        return None;
    }
    let lat = coordinate(field(fields, 3)?, field(fields, 4)?, 'S')?;
    let lon = coordinate(field(fields, 5)?, field(fields, 6)?, 'W')?;
    Some(GpsFix {
        lat,
        lon,
        timestamp: build_timestamp(field(fields, 1).and_then(parse_time), now),
        hdop: None,
        satellites: None,
        fix_quality: None,
    })
}

fn parse_gll(fields: &[&str], now: DateTime<Utc>) -> Option<GpsFix> {
    // $xxGLL,lat,N,lon,E,time,status[,mode]
    if status_invalid(field(fields, 6)) {
        return None;
    }
    let lat = coordinate(field(fields, 1)?, field(fields, 2)?, 'S')?;
    let lon = coordinate(field(fields, 3)?, field(fields, 4)?, 'W')?;
    Some(GpsFix {
        lat,
        lon,
        timestamp: build_timestamp(field(fields, 5).and_then(parse_time), now),
        hdop: None,
        satellites: None,
        fix_quality: None,
    })
}

/// Non-empty, trimmed field at `idx`.
fn field<'a>(fields: &[&'a str], idx: usize) -> Option<&'a str> {
    fields
        .get(idx)
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
}

fn status_invalid(status: Option<&str>) -> bool {
    matches!(status, Some(s) if s.eq_ignore_ascii_case("V"))
}

/// Convert `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere into signed decimal degrees.
fn coordinate(value: &str, hemisphere: &str, negative: char) -> Option<f64> {
    let raw: f64 = value.parse().ok()?;
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    if minutes >= 60.0 {
        return None;
    }
    let decimal = degrees + minutes / 60.0;
    let hemi = hemisphere.chars().next()?.to_ascii_uppercase();
    if hemi == negative {
        Some(-decimal)
    } else {
        Some(decimal)
    }
}

/// `hhmmss` with optional fractional seconds.
fn parse_time(value: &str) -> Option<NaiveTime> {
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if whole.len() != 6 || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: u32 = whole[0..2].parse().ok()?;
    let minute: u32 = whole[2..4].parse().ok()?;
    let second: u32 = whole[4..6].parse().ok()?;
    let micros = if frac.is_empty() {
        0
    } else {
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let digits: String = frac.chars().chain("000000".chars()).take(6).collect();
        digits.parse::<u32>().ok()?
    };
    NaiveTime::from_hms_micro_opt(hour, minute, second, micros)
}

fn build_timestamp(time_of_day: Option<NaiveTime>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(tod) = time_of_day else {
        return now;
    };
    let candidate = now.date_naive().and_time(tod).and_utc();
    if candidate > now + Duration::seconds(FUTURE_TOLERANCE_SECS) {
        candidate - Duration::days(1)
    } else {
        candidate
    }
}

fn parse_u8(value: &str) -> Option<u8> {
    value.parse().ok()
}

fn parse_hdop(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 12, 40, 0).unwrap()
    }

    #[test]
    fn parses_reference_gga() {
        let fix = parse_sentence_at(GGA, noon()).expect("fix");
        assert!((fix.lat - 48.1173).abs() < 1e-6);
        assert!((fix.lon - 11.516_666_7).abs() < 1e-6);
        assert_eq!(fix.satellites, Some(8));
        assert_eq!(fix.fix_quality, Some(1));
        assert_eq!(fix.hdop, Some(0.9));
        assert_eq!(
            fix.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 20, 12, 35, 19).unwrap()
        );
    }

    #[test]
    fn zero_quality_is_no_fix() {
        let s = "$GPGGA,123519,4807.038,N,01131.000,E,0,08,0.9,545.4,M,46.9,M,,*46";
        assert!(parse_sentence_at(s, noon()).is_none());
    }

    #[test]
    fn invalid_rmc_status_is_no_fix() {
        let s = "$GPRMC,123519,V,4807.038,N,01131.000,E,0.0,0.0,200520,,,N*62";
        assert!(parse_sentence_at(s, noon()).is_none());
    }

    #[test]
    fn valid_rmc_and_gll_parse() {
        let rmc = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
        let fix = parse_sentence_at(rmc, noon()).expect("rmc fix");
        assert!((fix.lat - 48.1173).abs() < 1e-6);
        assert_eq!(fix.fix_quality, None);

        let gll = "$GPGLL,4916.45,N,12311.12,W,225444,A*31";
        let fix = parse_sentence_at(gll, noon()).expect("gll fix");
        assert!((fix.lat - 49.274_166_7).abs() < 1e-6);
        assert!((fix.lon + 123.185_333_3).abs() < 1e-6);
    }

    #[test]
    fn missing_coordinates_is_no_fix() {
        let s = "$GPGGA,123519,,,,,1,08,0.9,545.4,M,46.9,M,,*7E";
        assert!(parse_sentence_at(s, noon()).is_none());
        assert!(parse_sentence_at("$GPGGA,123519,4807.038,N,,,1,08,0.9,,,,,,", noon()).is_none());
    }

    #[test]
    fn bad_checksum_and_garbage_are_no_fix() {
        let tampered = GGA.replace("*47", "*48");
        assert!(parse_sentence_at(&tampered, noon()).is_none());
        assert!(parse_sentence_at("", noon()).is_none());
        assert!(parse_sentence_at("hello world", noon()).is_none());
        assert!(parse_sentence_at("$GPGSV,3,1,11,03,03,111,00", noon()).is_none());
        assert!(parse_sentence_at("$GPGGA,123519,48x7.038,N,01131.000,E,1,08,0.9,,,,,,", noon()).is_none());
    }

    #[test]
    fn non_ascii_address_is_no_fix() {
        let s = "$\u{e9}GA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
        assert!(parse_sentence_at(s, noon()).is_none());
        assert!(parse_sentence_at("$GP\u{e9}GA,123519,4807.038,N,01131.000,E,1,08,0.9,,,,,,", noon()).is_none());
        assert!(parse_sentence_at("$\u{e9}\u{e9},123519", noon()).is_none());
    }

    #[test]
    fn non_numeric_optional_fields_degrade_to_none() {
        let s = "$GPGGA,123519,4807.038,N,01131.000,E,1,xx,abc,545.4,M,46.9,M,,*08";
        let fix = parse_sentence_at(s, noon()).expect("fix");
        assert_eq!(fix.satellites, None);
        assert_eq!(fix.hdop, None);
        assert_eq!(fix.fix_quality, Some(1));
    }

    #[test]
    fn southern_western_hemispheres_are_negative() {
        let s = "$GPGGA,,4807.038,S,01131.000,W,1,08,0.9,545.4,M,46.9,M,,*45";
        let now = noon();
        let fix = parse_sentence_at(s, now).expect("fix");
        assert!(fix.lat < 0.0 && fix.lon < 0.0);
        // No time of day -> "now"
        assert_eq!(fix.timestamp, now);
    }

    #[test]
    fn time_ahead_of_clock_rolls_back_one_day() {
        // Receiver clock just passed midnight, GPS still reports 23:59:59.
        let now = Utc.with_ymd_and_hms(2024, 5, 21, 0, 0, 5).unwrap();
        let s = "$GNGGA,235959,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*55";
        let fix = parse_sentence_at(s, now).expect("fix");
        assert_eq!(
            fix.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 20, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn fractional_seconds_are_kept() {
        let t = parse_time("123519.25").unwrap();
        assert_eq!(t, NaiveTime::from_hms_micro_opt(12, 35, 19, 250_000).unwrap());
        assert!(parse_time("1235").is_none());
        assert!(parse_time("256000").is_none());
    }
}
