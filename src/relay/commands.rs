//! Outbound operator commands.
//!
//! Commands enter through a bounded [`CommandQueue`] and are executed one at a
//! time by a single consumer task, so sends never interleave on the radio and
//! commands go out in submission order. There is no automatic retry: a failed
//! send is logged and dropped, and the operator has to issue it again.

use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::waypoints::{load_waypoints, WAYPOINTS_FINISHED};
use crate::config::Config;
use crate::logutil::escape_log;
use crate::meshtastic::RadioHandle;
use crate::metrics;
use crate::storage::LastManualMarker;
use crate::validation::{validate_command_payload, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Manual,
    Mission,
    Waypoints,
}

impl CommandKind {
    /// Parse the operator-facing type name (`MAN`, `MSSN`, `WP`).
    pub fn from_type(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "MAN" => Some(CommandKind::Manual),
            "MSSN" => Some(CommandKind::Mission),
            "WP" => Some(CommandKind::Waypoints),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            CommandKind::Manual => "MAN",
            CommandKind::Mission => "MSSN",
            CommandKind::Waypoints => "WP",
        }
    }

    fn log_tag(&self) -> &'static str {
        match self {
            CommandKind::Manual => "[man]",
            CommandKind::Mission => "[mssn]",
            CommandKind::Waypoints => "[wp]",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown type")]
    UnknownType(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue full")]
    Full,
    #[error("command queue closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand {
    pub kind: CommandKind,
    pub payload: Option<String>,
}

impl OutboundCommand {
    pub fn manual(direction: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            kind: CommandKind::Manual,
            payload: Some(validate_command_payload(direction)?),
        })
    }

    pub fn mission(command: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            kind: CommandKind::Mission,
            payload: Some(validate_command_payload(command)?),
        })
    }

    pub fn waypoints() -> Self {
        Self {
            kind: CommandKind::Waypoints,
            payload: None,
        }
    }

    /// Build from an operator request. MAN and MSSN need a payload; WP ignores it.
    pub fn from_request(kind: &str, payload: Option<&str>) -> Result<Self, CommandError> {
        match CommandKind::from_type(kind) {
            Some(CommandKind::Manual) => Ok(Self::manual(payload.unwrap_or(""))?),
            Some(CommandKind::Mission) => Ok(Self::mission(payload.unwrap_or(""))?),
            Some(CommandKind::Waypoints) => Ok(Self::waypoints()),
            None => Err(CommandError::UnknownType(kind.to_string())),
        }
    }

    /// `MAN_<DIRECTION>` / `MSSN_<COMMAND>`. Waypoint uploads have no single wire text.
    pub fn wire_text(&self) -> Option<String> {
        match (self.kind, &self.payload) {
            (CommandKind::Waypoints, _) => None,
            (kind, Some(p)) => Some(format!("{}_{}", kind.tag(), p.to_uppercase())),
            (_, None) => None,
        }
    }
}

/// What one command execution did on the radio.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl CommandReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Turns commands into radio sends.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    radio: RadioHandle,
    channel: u32,
    want_ack: bool,
    ack_delay: Duration,
    waypoints_path: PathBuf,
    last_manual: Option<LastManualMarker>,
}

impl CommandExecutor {
    pub fn new(
        radio: RadioHandle,
        channel: u32,
        want_ack: bool,
        ack_delay: Duration,
        waypoints_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            radio,
            channel,
            want_ack,
            ack_delay,
            waypoints_path: waypoints_path.into(),
            last_manual: None,
        }
    }

    /// Skip a manual command identical to the last one that went out.
    pub fn with_last_manual(mut self, marker: LastManualMarker) -> Self {
        self.last_manual = Some(marker);
        self
    }

    pub fn from_config(config: &Config, radio: RadioHandle) -> Self {
        let exec = Self::new(
            radio,
            config.meshtastic.channel,
            config.meshtastic.want_ack,
            config.ack_delay(),
            config.resolve(&config.storage.waypoints_file),
        );
        if config.commands.suppress_repeat_manual {
            exec.with_last_manual(LastManualMarker::new(
                config.resolve(&config.storage.last_manual_file),
            ))
        } else {
            exec
        }
    }

    pub async fn execute(&self, cmd: &OutboundCommand) -> CommandReport {
        match cmd.kind {
            CommandKind::Waypoints => self.send_waypoints().await,
            kind => match cmd.wire_text() {
                Some(text) => self.send_tagged(kind, &text).await,
                None => {
                    warn!("{} FAILED no payload", kind.log_tag());
                    metrics::inc_command_failures();
                    CommandReport {
                        failed: 1,
                        ..Default::default()
                    }
                }
            },
        }
    }

    async fn send(&self, text: &str) -> Result<u32, String> {
        match self.radio.send_text(text, self.channel, self.want_ack).await {
            Ok(id) => {
                metrics::inc_commands_sent();
                Ok(id)
            }
            Err(e) => {
                metrics::inc_command_failures();
                Err(e.to_string())
            }
        }
    }

    async fn send_tagged(&self, kind: CommandKind, text: &str) -> CommandReport {
        let tag = kind.log_tag();
        let marker = match kind {
            CommandKind::Manual => self.last_manual.as_ref(),
            _ => None,
        };
        if let Some(m) = marker {
            if m.read().as_deref() == Some(text) {
                info!("{} SKIPPED {} (same as last manual command)", tag, text);
                return CommandReport {
                    skipped: 1,
                    ..Default::default()
                };
            }
        }
        match self.send(text).await {
            Ok(id) => {
                info!("{} SUCCESS {} | id={:#010x}", tag, text, id);
                if let Some(m) = marker {
                    if let Err(e) = m.write(text) {
                        warn!("{} could not record last manual command: {}", tag, e);
                    }
                }
                CommandReport {
                    sent: 1,
                    ..Default::default()
                }
            }
            Err(e) => {
                warn!("{} FAILED {} | {}", tag, text, e);
                CommandReport {
                    failed: 1,
                    ..Default::default()
                }
            }
        }
    }

    /// Every row in index order with `ack_delay` after each, then one `WP_FINISHED`
    /// regardless of row failures.
    async fn send_waypoints(&self) -> CommandReport {
        let mut report = CommandReport::default();
        let rows = match load_waypoints(&self.waypoints_path) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("[wp] FAILED {}", e);
                metrics::inc_command_failures();
                report.failed = 1;
                return report;
            }
        };
        let total = rows.len();
        for row in &rows {
            let text = row.wire_text();
            info!(
                "[wp] Sending row {} / {}: {}",
                row.index + 1,
                total,
                escape_log(&text)
            );
            match self.send(&text).await {
                Ok(_) => report.sent += 1,
                Err(e) => {
                    warn!("[wp] FAILED row {}: {}", row.index, e);
                    report.failed += 1;
                }
            }
            tokio::time::sleep(self.ack_delay).await;
        }
        match self.send(WAYPOINTS_FINISHED).await {
            Ok(_) => {
                report.sent += 1;
                if report.failed == 0 {
                    info!("[wp] SUCCESS All rows sent.");
                } else {
                    warn!("[wp] Finished with {} of {} rows failed", report.failed, total);
                }
            }
            Err(e) => {
                warn!("[wp] FAILED {}: {}", WAYPOINTS_FINISHED, e);
                report.failed += 1;
            }
        }
        report
    }
}

/// Producer side of the bounded operator queue.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: mpsc::Sender<OutboundCommand>,
}

impl CommandQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue without waiting. A full queue is reported, not awaited.
    pub fn submit(&self, cmd: OutboundCommand) -> Result<(), QueueError> {
        self.tx.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

/// Drain `rx` on one task, executing commands strictly in order.
pub fn run_command_consumer(
    executor: CommandExecutor,
    mut rx: mpsc::Receiver<OutboundCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            debug!("{} dequeued", cmd.kind.log_tag());
            let report = executor.execute(&cmd).await;
            debug!(
                "{} done: sent={} failed={} skipped={}",
                cmd.kind.log_tag(),
                report.sent,
                report.failed,
                report.skipped
            );
        }
        debug!("command consumer stopped");
    })
}

pub fn spawn_command_consumer(
    executor: CommandExecutor,
    capacity: usize,
) -> (CommandQueue, JoinHandle<()>) {
    let (queue, rx) = CommandQueue::channel(capacity);
    (queue, run_command_consumer(executor, rx))
}
