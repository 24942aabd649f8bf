//! Process-local counters for the pinger and listener loops.
//! Logged as a one-line summary at shutdown; nothing is exported.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static FIXES_ACQUIRED: AtomicU64 = AtomicU64::new(0);
static FIX_TIMEOUTS: AtomicU64 = AtomicU64::new(0);
static MESSAGES_SENT: AtomicU64 = AtomicU64::new(0);
static SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
static PACKETS_SEEN: AtomicU64 = AtomicU64::new(0);
static DUPLICATES_DROPPED: AtomicU64 = AtomicU64::new(0);
static NON_TEXT_DROPPED: AtomicU64 = AtomicU64::new(0);
static EMPTY_DROPPED: AtomicU64 = AtomicU64::new(0);
static ENTRIES_LOGGED: AtomicU64 = AtomicU64::new(0);

pub fn inc_fixes_acquired() {
    FIXES_ACQUIRED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_fix_timeouts() {
    FIX_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_messages_sent() {
    MESSAGES_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_send_failures() {
    SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_packets_seen() {
    PACKETS_SEEN.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_duplicates_dropped() {
    DUPLICATES_DROPPED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_non_text_dropped() {
    NON_TEXT_DROPPED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_empty_dropped() {
    EMPTY_DROPPED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_entries_logged() {
    ENTRIES_LOGGED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub fixes_acquired: u64,
    pub fix_timeouts: u64,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub packets_seen: u64,
    pub duplicates_dropped: u64,
    pub non_text_dropped: u64,
    pub empty_dropped: u64,
    pub entries_logged: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        fixes_acquired: FIXES_ACQUIRED.load(Ordering::Relaxed),
        fix_timeouts: FIX_TIMEOUTS.load(Ordering::Relaxed),
        messages_sent: MESSAGES_SENT.load(Ordering::Relaxed),
        send_failures: SEND_FAILURES.load(Ordering::Relaxed),
        packets_seen: PACKETS_SEEN.load(Ordering::Relaxed),
        duplicates_dropped: DUPLICATES_DROPPED.load(Ordering::Relaxed),
        non_text_dropped: NON_TEXT_DROPPED.load(Ordering::Relaxed),
        empty_dropped: EMPTY_DROPPED.load(Ordering::Relaxed),
        entries_logged: ENTRIES_LOGGED.load(Ordering::Relaxed),
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fixes={} fix_timeouts={} sent={} send_failures={} packets={} duplicates={} non_text={} empty={} logged={}",
            self.fixes_acquired,
            self.fix_timeouts,
            self.messages_sent,
            self.send_failures,
            self.packets_seen,
            self.duplicates_dropped,
            self.non_text_dropped,
            self.empty_dropped,
            self.entries_logged
        )
    }
}
