//! # Position Message Codec
//!
//! Sender side: render a [`GpsFix`] through a user template and append a machine
//! readable `tx=<epoch>` send-time tag. Receiver side: recover the send time from
//! the tag, packet metadata or a trailing clock token (see [`timing`]).
//!
//! Template keys available from a fix:
//!
//! | key            | value                                          |
//! |----------------|------------------------------------------------|
//! | `lat`, `lon`   | decimal degrees                                |
//! | `hdop`         | HDOP, `0.0` when the receiver did not report it |
//! | `satellites`   | satellites in use, `0` when unknown            |
//! | `fix_quality`  | GGA quality indicator, `0` when unknown        |
//! | `timestamp`, `iso` | fix time as RFC 3339                       |
//! | `time`, `date` | `HH:MM:SS` and `YYYY-MM-DD` of the fix time    |
//!
//! Enrichment fields (such as `snr` and `radio_snr`) are layered on top and win on
//! collision.

pub mod template;
pub mod timing;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::gps::GpsFix;

pub use template::{FieldValue, Fields, Template, TemplateError, UNAVAILABLE};
pub use timing::{decode_sent_time, delay_seconds, parse_tx_epoch, SentTimeRaw, SentTimeSource};

/// Keys produced by [`fix_fields`]; used to dry-run templates before any fix exists.
pub const FIX_KEYS: &[&str] = &[
    "lat",
    "lon",
    "hdop",
    "satellites",
    "fix_quality",
    "timestamp",
    "iso",
    "time",
    "date",
];

/// Template fields derived from a fix.
pub fn fix_fields(fix: &GpsFix) -> Fields {
    let iso = fix.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true);
    let mut fields = Fields::new();
    fields.insert("lat".into(), FieldValue::Float(fix.lat));
    fields.insert("lon".into(), FieldValue::Float(fix.lon));
    fields.insert("hdop".into(), FieldValue::Float(fix.hdop.unwrap_or(0.0)));
    fields.insert("satellites".into(), FieldValue::from(fix.satellites.unwrap_or(0)));
    fields.insert(
        "fix_quality".into(),
        FieldValue::Int(i64::from(fix.fix_quality.unwrap_or(0))),
    );
    fields.insert("timestamp".into(), FieldValue::Text(iso.clone()));
    fields.insert("iso".into(), FieldValue::Text(iso));
    fields.insert(
        "time".into(),
        FieldValue::Text(fix.timestamp.format("%H:%M:%S").to_string()),
    );
    fields.insert(
        "date".into(),
        FieldValue::Text(fix.timestamp.format("%Y-%m-%d").to_string()),
    );
    fields
}

/// Render `template` for `fix`, with `enrichment` overriding fix-derived keys.
pub fn render(template: &Template, fix: &GpsFix, enrichment: &Fields) -> Result<String, TemplateError> {
    let mut fields = fix_fields(fix);
    for (k, v) in enrichment {
        fields.insert(k.clone(), v.clone());
    }
    template.render(&fields)
}

/// `"<message> tx=<epoch seconds, 3 decimals>"`.
pub fn append_tx_tag(message: &str, sent_at: DateTime<Utc>) -> String {
    let epoch = sent_at.timestamp_micros() as f64 / 1e6;
    format!("{} tx={:.3}", message, epoch)
}

/// Render and tag in one step; this is the exact text put on the air.
pub fn encode(
    template: &Template,
    fix: &GpsFix,
    enrichment: &Fields,
    sent_at: DateTime<Utc>,
) -> Result<String, TemplateError> {
    Ok(append_tx_tag(&render(template, fix, enrichment)?, sent_at))
}

/// Render `template` against placeholder values for every fix key plus `extra_keys`.
///
/// Catches unknown keys and malformed specs at startup rather than on the first fix.
pub fn dry_run(template: &Template, extra_keys: &[&str]) -> Result<(), TemplateError> {
    let mut fields = Fields::new();
    for key in FIX_KEYS {
        let value = match *key {
            "lat" | "lon" | "hdop" => FieldValue::Float(0.0),
            "satellites" | "fix_quality" => FieldValue::Int(0),
            _ => FieldValue::Text(String::new()),
        };
        fields.insert((*key).to_string(), value);
    }
    for key in extra_keys {
        fields.insert((*key).to_string(), FieldValue::Unavailable);
    }
    template.render(&fields).map(|_| ())
}
