//! Inbound message dispatch.
//!
//! One call per inbound message, never reentered. The gates run in a fixed order:
//! sender, empty text, duplicate id. The id is then marked processed before any
//! other side effect, so a crash mid-handling cannot cause a replay on restart.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::alerts::AlertHandle;
use super::classify::{classify, MessageKind};
use super::connectivity::Connectivity;
use super::telemetry::{parse_telemetry, TelemetryLog};
use crate::config::Config;
use crate::logutil::escape_log;
use crate::meshtastic::{InboundMessage, RadioHandle};
use crate::metrics;
use crate::storage::ProcessedIds;

/// What a single dispatch call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    WrongSender,
    EmptyText,
    Duplicate,
    /// Valid telemetry; `stored` is false when the log write failed.
    Telemetry { stored: bool },
    TelemetryRejected,
    Status { forwarded: bool },
    Handshake { acked: bool },
    Unknown,
}

/// Handshake literals exchanged with the vehicle.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub expect: String,
    pub reply: String,
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            expect: "STARTUP_READY_TO_GO".to_string(),
            reply: "STARTUP_ACK".to_string(),
        }
    }
}

pub struct Dispatcher {
    source_id: String,
    handshake: Handshake,
    channel: u32,
    want_ack: bool,
    dedup: Arc<ProcessedIds>,
    telemetry: TelemetryLog,
    connectivity: Connectivity,
    alerts: AlertHandle,
    radio: RadioHandle,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_id: &str,
        handshake: Handshake,
        channel: u32,
        want_ack: bool,
        dedup: Arc<ProcessedIds>,
        telemetry: TelemetryLog,
        connectivity: Connectivity,
        alerts: AlertHandle,
        radio: RadioHandle,
    ) -> Self {
        Self {
            source_id: source_id.trim().to_ascii_lowercase(),
            handshake,
            channel,
            want_ack,
            dedup,
            telemetry,
            connectivity,
            alerts,
            radio,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_config(
        config: &Config,
        dedup: Arc<ProcessedIds>,
        telemetry: TelemetryLog,
        connectivity: Connectivity,
        alerts: AlertHandle,
        radio: RadioHandle,
    ) -> Self {
        Self::new(
            &config.station.source_id,
            Handshake {
                expect: config.station.handshake_text.clone(),
                reply: config.station.handshake_ack.clone(),
            },
            config.meshtastic.channel,
            config.meshtastic.want_ack,
            dedup,
            telemetry,
            connectivity,
            alerts,
            radio,
        )
    }

    pub async fn dispatch(&self, msg: &InboundMessage) -> DispatchOutcome {
        metrics::inc_received();
        if !msg.sender_id.eq_ignore_ascii_case(&self.source_id) {
            metrics::inc_rejected();
            return DispatchOutcome::WrongSender;
        }
        if msg.text.trim().is_empty() {
            metrics::inc_rejected();
            return DispatchOutcome::EmptyText;
        }
        if self.dedup.is_duplicate(&msg.message_id) {
            metrics::inc_duplicates();
            debug!("[dedup] skipping already processed id {}", msg.message_id);
            return DispatchOutcome::Duplicate;
        }
        if let Err(e) = self.dedup.mark_processed(&msg.message_id) {
            metrics::inc_storage_failures();
            warn!("[dedup] FAILED to persist id {}: {}", msg.message_id, e);
        }
        info!("RECEIVED {}", escape_log(&msg.text));

        let kind = classify(&msg.text, &self.handshake.expect);
        debug!("id {} classified as {}", msg.message_id, kind.label());
        match kind {
            MessageKind::Telemetry(body) => self.handle_telemetry(body),
            MessageKind::Status(body) => self.handle_status(body),
            MessageKind::Handshake => self.handle_handshake().await,
            MessageKind::Unknown => {
                metrics::inc_unknown();
                warn!("FAILED unrecognized message: {}", escape_log(&msg.text));
                DispatchOutcome::Unknown
            }
        }
    }

    fn handle_telemetry(&self, body: &str) -> DispatchOutcome {
        let sample = match parse_telemetry(body) {
            Ok(s) => s,
            Err(e) => {
                metrics::inc_telemetry_rejected();
                warn!("[tlm] FAILED {}: {}", e, escape_log(body));
                return DispatchOutcome::TelemetryRejected;
            }
        };
        let stored = match self.telemetry.record(&sample) {
            Ok(()) => {
                metrics::inc_telemetry_appended();
                info!("[tlm] SUCCESS Appended telemetry");
                true
            }
            Err(e) => {
                metrics::inc_storage_failures();
                warn!("[tlm] FAILED Append error: {}", e);
                false
            }
        };
        self.connectivity.mark_connected();
        DispatchOutcome::Telemetry { stored }
    }

    fn handle_status(&self, body: &str) -> DispatchOutcome {
        if body.is_empty() {
            warn!("[stat] empty status alert, nothing to forward");
            return DispatchOutcome::Status { forwarded: false };
        }
        info!("[stat] {}", escape_log(body));
        self.alerts.notify(body);
        DispatchOutcome::Status { forwarded: true }
    }

    async fn handle_handshake(&self) -> DispatchOutcome {
        metrics::inc_handshakes();
        self.connectivity.mark_connected();
        let acked = match self
            .radio
            .send_text(&self.handshake.reply, self.channel, self.want_ack)
            .await
        {
            Ok(_) => {
                info!("[conn] SUCCESS Handshake acknowledged with {}", self.handshake.reply);
                true
            }
            Err(e) => {
                warn!("[conn] FAILED sending {}: {}", self.handshake.reply, e);
                false
            }
        };
        DispatchOutcome::Handshake { acked }
    }

    /// Dispatch every message from the link, one at a time, until the link closes.
    pub async fn run(self, mut inbound: mpsc::UnboundedReceiver<InboundMessage>) {
        while let Some(msg) = inbound.recv().await {
            let outcome = self.dispatch(&msg).await;
            debug!("dispatch {} -> {:?}", msg.message_id, outcome);
        }
        warn!("Inbound stream ended; no further messages will be dispatched");
    }
}
