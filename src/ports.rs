//! Serial port auto-detection.
//!
//! Ports are matched by keyword against their USB descriptor strings. The radio and
//! the GPS receiver are usually both USB serial devices, so each lookup can exclude
//! the port already claimed by the other role.

use log::debug;

pub const RADIO_KEYWORDS: &[&str] = &[
    "meshtastic",
    "ttgo",
    "t-beam",
    "esp32",
    "usb serial",
    "cp210",
    "ch340",
];
pub const GPS_KEYWORDS: &[&str] = &["gps", "gnss", "nmea", "ublox", "beidou"];

/// A port as seen by the matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    pub name: String,
    /// Lowercased descriptor text (port name, manufacturer, product, serial, VID:PID).
    pub haystack: String,
}

impl PortCandidate {
    pub fn new<'a>(name: &str, descriptors: impl IntoIterator<Item = &'a str>) -> Self {
        let mut parts = vec![name.to_string()];
        parts.extend(descriptors.into_iter().filter(|d| !d.is_empty()).map(str::to_string));
        Self {
            name: name.to_string(),
            haystack: parts.join(" ").to_lowercase(),
        }
    }

    fn matches_any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.haystack.contains(k))
    }
}

fn excluded(candidate: &PortCandidate, exclude: &[&str]) -> bool {
    exclude.iter().any(|e| e.eq_ignore_ascii_case(&candidate.name))
}

/// First candidate not in `exclude` whose descriptors contain one of `keywords`.
pub fn select_by_keywords<'a>(
    candidates: &'a [PortCandidate],
    keywords: &[&str],
    exclude: &[&str],
) -> Option<&'a PortCandidate> {
    candidates
        .iter()
        .filter(|c| !excluded(c, exclude))
        .find(|c| c.matches_any(keywords))
}

/// Radio keyword match, else the first port that does not look like a GPS.
pub fn select_radio<'a>(candidates: &'a [PortCandidate], exclude: &[&str]) -> Option<&'a PortCandidate> {
    select_by_keywords(candidates, RADIO_KEYWORDS, exclude).or_else(|| {
        candidates
            .iter()
            .filter(|c| !excluded(c, exclude))
            .find(|c| !c.matches_any(GPS_KEYWORDS))
    })
}

pub fn select_gps<'a>(candidates: &'a [PortCandidate], exclude: &[&str]) -> Option<&'a PortCandidate> {
    select_by_keywords(candidates, GPS_KEYWORDS, exclude)
}

/// Ports currently present on this machine.
#[cfg(feature = "serial")]
pub fn list_candidates() -> Vec<PortCandidate> {
    use serialport::SerialPortType;

    let ports = match serialport::available_ports() {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Could not enumerate serial ports: {}", e);
            return Vec::new();
        }
    };
    ports
        .into_iter()
        .map(|p| match &p.port_type {
            SerialPortType::UsbPort(usb) => {
                let ids = format!("{:04x}:{:04x}", usb.vid, usb.pid);
                PortCandidate::new(
                    &p.port_name,
                    [
                        usb.manufacturer.as_deref().unwrap_or(""),
                        usb.product.as_deref().unwrap_or(""),
                        usb.serial_number.as_deref().unwrap_or(""),
                        ids.as_str(),
                    ],
                )
            }
            _ => PortCandidate::new(&p.port_name, []),
        })
        .collect()
}

#[cfg(not(feature = "serial"))]
pub fn list_candidates() -> Vec<PortCandidate> {
    Vec::new()
}

pub fn auto_detect_radio_port(exclude: &[&str]) -> Option<String> {
    let candidates = list_candidates();
    let found = select_radio(&candidates, exclude).map(|c| c.name.clone());
    debug!("Radio port auto-detect over {} ports: {:?}", candidates.len(), found);
    found
}

pub fn auto_detect_gps_port(exclude: &[&str]) -> Option<String> {
    let candidates = list_candidates();
    let found = select_gps(&candidates, exclude).map(|c| c.name.clone());
    debug!("GPS port auto-detect over {} ports: {:?}", candidates.len(), found);
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> Vec<PortCandidate> {
        vec![
            PortCandidate::new("/dev/ttyS0", []),
            PortCandidate::new("/dev/ttyACM0", ["u-blox AG", "u-blox GNSS receiver"]),
            PortCandidate::new("/dev/ttyUSB0", ["Silicon Labs", "CP2102 USB to UART Bridge", "0001"]),
        ]
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let p = ports();
        assert_eq!(select_gps(&p, &[]).map(|c| c.name.as_str()), Some("/dev/ttyACM0"));
        assert_eq!(select_radio(&p, &[]).map(|c| c.name.as_str()), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn excluded_ports_are_skipped() {
        let p = ports();
        assert_eq!(select_gps(&p, &["/dev/ttyacm0"]), None);
        // No keyword left: fall back to the first port that is not a GPS.
        assert_eq!(
            select_radio(&p, &["/dev/ttyUSB0"]).map(|c| c.name.as_str()),
            Some("/dev/ttyS0")
        );
    }

    #[test]
    fn radio_fallback_never_picks_a_gps() {
        let p = vec![PortCandidate::new("/dev/ttyACM0", ["GNSS"])];
        assert_eq!(select_radio(&p, &[]), None);
    }
}
