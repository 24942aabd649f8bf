//! # Mapper - Offline Map Rendering
//!
//! Reads the message log written by the listener, keeps the lines that carry a
//! `GPS <lat>,<lon>` token and renders them as a self-contained Leaflet HTML page:
//! one marker per message, a path through the points in file order, the view
//! centered on the centroid and fitted to the bounds.

pub mod parse;

use chrono::{DateTime, Utc};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use parse::{parse_file, parse_line, GpsLogMessage, MESSAGE_MARKER};

pub const DEFAULT_TITLE: &str = "Meshtastic GPS Messages";
const LEAFLET_VERSION: &str = "1.9.4";

#[derive(Debug, Error)]
pub enum MapError {
    #[error("no GPS messages to map")]
    NoMessages,

    #[error("map i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn popup_time(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn popup_html(index: usize, m: &GpsLogMessage) -> String {
    let mut lines = vec![
        format!("<strong>Point {}</strong>", index + 1),
        format!("Coordinates: {:.6}, {:.6}", m.lat, m.lon),
    ];
    if let Some(sats) = m.satellites {
        lines.push(format!("Satellites: {}", sats));
    }
    if let Some(hdop) = m.hdop {
        lines.push(format!("HDOP: {:.1}", hdop));
    }
    if let Some(sent) = &m.sent_at {
        lines.push(format!("Sent: {}", popup_time(sent)));
    }
    if let Some(received) = &m.received_at {
        lines.push(format!("Received: {}", popup_time(received)));
    }
    if let Some(delay) = m.delay_seconds {
        lines.push(format!("Delay: {:.3}s", delay));
    }
    lines.join("<br>")
}

/// Minimal HTML text escaping for the page title.
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Render the HTML document. Fails on an empty slice since there is nothing to center on.
pub fn render(messages: &[GpsLogMessage], title: &str) -> Result<String, MapError> {
    if messages.is_empty() {
        return Err(MapError::NoMessages);
    }
    let n = messages.len() as f64;
    let center_lat = messages.iter().map(|m| m.lat).sum::<f64>() / n;
    let center_lon = messages.iter().map(|m| m.lon).sum::<f64>() / n;

    let mut markers = String::new();
    for (i, m) in messages.iter().enumerate() {
        // serde_json yields a quoted, escaped JS string literal.
        let popup = serde_json::Value::String(popup_html(i, m)).to_string();
        markers.push_str(&format!(
            "\n        L.marker([{}, {}]).addTo(map).bindPopup({});",
            m.lat, m.lon, popup
        ));
    }
    let path = messages
        .iter()
        .map(|m| format!("[{}, {}]", m.lat, m.lon))
        .collect::<Vec<_>>()
        .join(", ");
    let title = escape_html(title);

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <link rel="stylesheet" href="https://unpkg.com/leaflet@{ver}/dist/leaflet.css" />
    <script src="https://unpkg.com/leaflet@{ver}/dist/leaflet.js"></script>
    <style>
        body {{ margin: 0; padding: 0; font-family: Arial, sans-serif; }}
        #map {{ height: 100vh; width: 100%; }}
        .info {{
            position: absolute; top: 10px; right: 10px; z-index: 1000;
            background: white; padding: 10px; border-radius: 5px;
            box-shadow: 0 2px 5px rgba(0,0,0,0.2); font-size: 12px;
        }}
    </style>
</head>
<body>
    <div class="info">
        <strong>{title}</strong><br>
        Total points: {count}<br>
        <small>Click markers for details</small>
    </div>
    <div id="map"></div>
    <script>
        const map = L.map('map').setView([{center_lat}, {center_lon}], 13);
        L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
            attribution: '&copy; OpenStreetMap contributors'
        }}).addTo(map);
{markers}

        const points = [{path}];
        L.polyline(points, {{ color: 'blue', weight: 3, opacity: 0.7 }}).addTo(map);
        map.fitBounds(L.latLngBounds(points), {{ padding: [20, 20] }});
    </script>
</body>
</html>
"#,
        title = title,
        ver = LEAFLET_VERSION,
        count = messages.len(),
        center_lat = center_lat,
        center_lon = center_lon,
        markers = markers,
        path = path,
    ))
}

/// Parse `input` and write the map to `output`; returns the number of points.
pub fn write_map(input: &Path, output: &Path, title: &str) -> Result<usize, MapError> {
    let messages = parse_file(input)?;
    let html = render(&messages, title)?;
    let io = |source| MapError::Io {
        path: output.to_path_buf(),
        source,
    };
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io)?;
    }
    fs::write(output, html).map_err(io)?;
    info!("Wrote {} points to {}", messages.len(), output.display());
    Ok(messages.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> GpsLogMessage {
        GpsLogMessage {
            lat,
            lon,
            sent_at: None,
            received_at: None,
            delay_seconds: Some(1.25),
            satellites: Some(7),
            hdop: None,
            raw_message: String::new(),
        }
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(render(&[], DEFAULT_TITLE), Err(MapError::NoMessages)));
    }

    #[test]
    fn centers_on_centroid_and_draws_every_point() {
        let html = render(&[point(10.0, 20.0), point(12.0, 22.0)], DEFAULT_TITLE).unwrap();
        assert!(html.contains("setView([11, 21], 13)"));
        assert_eq!(html.matches("L.marker(").count(), 2);
        assert!(html.contains("const points = [[10, 20], [12, 22]];"));
        assert!(html.contains("Satellites: 7"));
        assert!(html.contains("Delay: 1.250s"));
        assert!(!html.contains("HDOP:"));
        assert!(html.contains("leaflet@1.9.4"));
    }

    #[test]
    fn popup_and_title_are_escaped() {
        let html = render(&[point(1.5, 2.5)], "<b>\"mine\"</b>").unwrap();
        assert!(html.contains("<title>&lt;b&gt;&quot;mine&quot;&lt;/b&gt;</title>"));
        assert!(html.contains(r#"bindPopup("<strong>Point 1</strong><br>Coordinates: 1.500000, 2.500000"#));
    }
}
