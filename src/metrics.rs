//! Process-wide relay counters.
//!
//! Plain relaxed atomics; read them through [`snapshot`]. The HTTP `/status`
//! endpoint and the periodic debug log both consume the snapshot.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

static RECEIVED: AtomicU64 = AtomicU64::new(0);
static REJECTED: AtomicU64 = AtomicU64::new(0);
static DUPLICATES: AtomicU64 = AtomicU64::new(0);
static TELEMETRY_APPENDED: AtomicU64 = AtomicU64::new(0);
static TELEMETRY_REJECTED: AtomicU64 = AtomicU64::new(0);
static STORAGE_FAILURES: AtomicU64 = AtomicU64::new(0);
static HANDSHAKES: AtomicU64 = AtomicU64::new(0);
static UNKNOWN: AtomicU64 = AtomicU64::new(0);
static ALERTS_DELIVERED: AtomicU64 = AtomicU64::new(0);
static ALERTS_FAILED: AtomicU64 = AtomicU64::new(0);
static COMMANDS_SENT: AtomicU64 = AtomicU64::new(0);
static COMMAND_FAILURES: AtomicU64 = AtomicU64::new(0);
static RADIO_ACKS: AtomicU64 = AtomicU64::new(0);
static RADIO_NAKS: AtomicU64 = AtomicU64::new(0);

pub fn inc_received() {
    RECEIVED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_rejected() {
    REJECTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_duplicates() {
    DUPLICATES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_telemetry_appended() {
    TELEMETRY_APPENDED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_telemetry_rejected() {
    TELEMETRY_REJECTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_storage_failures() {
    STORAGE_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_handshakes() {
    HANDSHAKES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_unknown() {
    UNKNOWN.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_alerts_delivered() {
    ALERTS_DELIVERED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_alerts_failed() {
    ALERTS_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_commands_sent() {
    COMMANDS_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_command_failures() {
    COMMAND_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_radio_acks() {
    RADIO_ACKS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_radio_naks() {
    RADIO_NAKS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct Snapshot {
    pub received: u64,
    pub rejected: u64,
    pub duplicates: u64,
    pub telemetry_appended: u64,
    pub telemetry_rejected: u64,
    pub storage_failures: u64,
    pub handshakes: u64,
    pub unknown: u64,
    pub alerts_delivered: u64,
    pub alerts_failed: u64,
    pub commands_sent: u64,
    pub command_failures: u64,
    pub radio_acks: u64,
    pub radio_naks: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        received: RECEIVED.load(Ordering::Relaxed),
        rejected: REJECTED.load(Ordering::Relaxed),
        duplicates: DUPLICATES.load(Ordering::Relaxed),
        telemetry_appended: TELEMETRY_APPENDED.load(Ordering::Relaxed),
        telemetry_rejected: TELEMETRY_REJECTED.load(Ordering::Relaxed),
        storage_failures: STORAGE_FAILURES.load(Ordering::Relaxed),
        handshakes: HANDSHAKES.load(Ordering::Relaxed),
        unknown: UNKNOWN.load(Ordering::Relaxed),
        alerts_delivered: ALERTS_DELIVERED.load(Ordering::Relaxed),
        alerts_failed: ALERTS_FAILED.load(Ordering::Relaxed),
        commands_sent: COMMANDS_SENT.load(Ordering::Relaxed),
        command_failures: COMMAND_FAILURES.load(Ordering::Relaxed),
        radio_acks: RADIO_ACKS.load(Ordering::Relaxed),
        radio_naks: RADIO_NAKS.load(Ordering::Relaxed),
    }
}
