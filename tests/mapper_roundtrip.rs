mod common;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use common::{text_packet, GGA_MUNICH};
use meshtrack::codec::{self, Fields, Template};
use meshtrack::config::DEFAULT_TEMPLATE;
use meshtrack::gps::parse_sentence;
use meshtrack::listener::PacketHandler;
use meshtrack::mapper::{self, MapError};
use meshtrack::storage::LogStore;

#[test]
fn pinged_fixes_end_up_on_the_map() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("meshtastic_messages.txt");
    let map_path = dir.path().join("out").join("map.html");
    let handler = PacketHandler::new(LogStore::new(&log_path), 200);
    let template = Template::parse(DEFAULT_TEMPLATE).unwrap();
    let fix = parse_sentence(GGA_MUNICH).expect("fix");

    let sent = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    let wire = codec::encode(&template, &fix, &Fields::new(), sent).unwrap();
    assert!(wire.starts_with("GPS 48.117300,11.516667 sats 8 hdop 0.9 12:35:19 tx="));
    let received = sent + ChronoDuration::milliseconds(2500);
    handler
        .handle_inbound(&text_packet(1, 5, &wire), received)
        .unwrap()
        .unwrap();
    // Not a position; stays in the log but not on the map.
    handler
        .handle_inbound(&text_packet(2, 5, "good morning"), received)
        .unwrap()
        .unwrap();

    let messages = mapper::parse_file(&log_path).unwrap();
    assert_eq!(messages.len(), 1);
    let m = &messages[0];
    assert!((m.lat - 48.1173).abs() < 1e-9);
    assert!((m.lon - 11.516_667).abs() < 1e-6);
    assert_eq!(m.satellites, Some(8));
    assert_eq!(m.hdop, Some(0.9));
    assert_eq!(m.sent_at, Some(sent));
    assert_eq!(m.received_at, Some(received));
    assert_eq!(m.delay_seconds, Some(2.5));

    let count = mapper::write_map(&log_path, &map_path, "Test run").unwrap();
    assert_eq!(count, 1);
    let html = std::fs::read_to_string(&map_path).unwrap();
    assert!(html.contains("<title>Test run</title>"));
    assert!(html.contains("Delay: 2.500s"));
}

#[test]
fn empty_log_is_an_explicit_error() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("empty.txt");
    std::fs::write(&log_path, "message: hi | sent_at: n/a | received_at: 2024-01-01T00:00:00Z | delay_s: n/a\n").unwrap();
    let err = mapper::write_map(&log_path, &dir.path().join("map.html"), mapper::DEFAULT_TITLE).unwrap_err();
    assert!(matches!(err, MapError::NoMessages));
    assert!(!dir.path().join("map.html").exists());
}
