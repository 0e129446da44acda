//! Connectivity liveness derived from telemetry timing.
//!
//! Promotion to connected happens synchronously inside the dispatch call that
//! accepted telemetry or the handshake. Demotion only happens on a monitor tick
//! that sees more than the timeout elapsed since the last accepted message.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::storage::StatusMarker;

#[derive(Debug, Default)]
pub struct ConnectivityState {
    pub is_connected: bool,
    pub last_telemetry_time: Option<Instant>,
    /// Wall-clock twin of `last_telemetry_time`, for display only.
    pub last_telemetry_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConnectivitySnapshot {
    pub connected: bool,
    pub last_telemetry: Option<DateTime<Utc>>,
}

/// Shared handle; the dispatcher and the monitor each hold a clone.
#[derive(Debug, Clone)]
pub struct Connectivity {
    state: Arc<Mutex<ConnectivityState>>,
    marker: Option<StatusMarker>,
    timeout: Duration,
}

impl Connectivity {
    pub fn new(marker: Option<StatusMarker>, timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnectivityState::default())),
            marker,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock(&self) -> MutexGuard<'_, ConnectivityState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Publish the initial disconnected state.
    pub fn initialize(&self) {
        let _guard = self.lock();
        self.write_marker(false);
    }

    pub fn mark_connected(&self) -> bool {
        self.mark_connected_at(Instant::now())
    }

    /// Record accepted traffic at `now`. Returns true on a disconnected → connected flip.
    pub fn mark_connected_at(&self, now: Instant) -> bool {
        let mut state = self.lock();
        state.last_telemetry_time = Some(now);
        state.last_telemetry_at = Some(Utc::now());
        if state.is_connected {
            return false;
        }
        state.is_connected = true;
        self.write_marker(true);
        info!("[conn] Connection established");
        true
    }

    /// Demote if connected and the last telemetry is older than the timeout (or
    /// was never seen). Returns true on a connected → disconnected flip.
    pub fn check_liveness(&self, now: Instant) -> bool {
        let mut state = self.lock();
        if !state.is_connected {
            return false;
        }
        let stale = match state.last_telemetry_time {
            None => true,
            Some(t) => now.saturating_duration_since(t) > self.timeout,
        };
        if !stale {
            return false;
        }
        state.is_connected = false;
        self.write_marker(false);
        info!(
            "[conn] Connection lost (no telemetry for over {}s)",
            self.timeout.as_secs()
        );
        true
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_connected
    }

    pub fn snapshot(&self) -> ConnectivitySnapshot {
        let state = self.lock();
        ConnectivitySnapshot {
            connected: state.is_connected,
            last_telemetry: state.last_telemetry_at,
        }
    }

    // Called with the state lock held so marker writes follow transition order.
    fn write_marker(&self, connected: bool) {
        if let Some(marker) = &self.marker {
            if let Err(e) = marker.write(connected) {
                warn!(
                    "[conn] FAILED to write status marker {}: {}",
                    marker.path().display(),
                    e
                );
            }
        }
    }
}

/// Poll liveness every `poll`. The first check happens one interval after start.
pub fn spawn_monitor(connectivity: Connectivity, poll: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(
            "[conn] liveness monitor: timeout {:?}, poll every {:?}",
            connectivity.timeout(),
            poll
        );
        let start = tokio::time::Instant::now() + poll;
        let mut ticker = tokio::time::interval_at(start, poll);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            connectivity.check_liveness(Instant::now());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_is_immediate_and_demote_needs_timeout() {
        let c = Connectivity::new(None, Duration::from_secs(120));
        assert!(!c.is_connected());
        let t0 = Instant::now();
        assert!(c.mark_connected_at(t0));
        assert!(!c.mark_connected_at(t0));
        assert!(c.is_connected());

        assert!(!c.check_liveness(t0 + Duration::from_secs(120)));
        assert!(c.is_connected());
        assert!(c.check_liveness(t0 + Duration::from_secs(121)));
        assert!(!c.is_connected());
        assert!(!c.check_liveness(t0 + Duration::from_secs(500)));
    }

    #[test]
    fn marker_follows_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let marker = StatusMarker::new(dir.path().join("status.txt"));
        let c = Connectivity::new(Some(marker.clone()), Duration::from_secs(1));
        c.initialize();
        assert_eq!(marker.read().as_deref(), Some("disconnected"));
        let t0 = Instant::now();
        c.mark_connected_at(t0);
        assert_eq!(marker.read().as_deref(), Some("connected"));
        c.check_liveness(t0 + Duration::from_secs(2));
        assert_eq!(marker.read().as_deref(), Some("disconnected"));
    }

    #[test]
    fn snapshot_reports_last_telemetry() {
        let c = Connectivity::new(None, Duration::from_secs(120));
        assert_eq!(c.snapshot().last_telemetry, None);
        c.mark_connected();
        let snap = c.snapshot();
        assert!(snap.connected);
        assert!(snap.last_telemetry.is_some());
    }
}
