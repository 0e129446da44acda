//! Inbound text classification.
//!
//! Turns raw vehicle text into a closed set of kinds before any side effect runs,
//! so the dispatcher's match is exhaustive and this step is testable without I/O.

pub const TELEMETRY_PREFIX: &str = "TLM_";
pub const STATUS_PREFIX: &str = "STAT_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind<'a> {
    /// Body after `TLM_`: `KEY=VALUE` pairs joined by `|`.
    Telemetry(&'a str),
    /// Alert text to forward to the operator UI.
    Status(&'a str),
    Handshake,
    Unknown,
}

impl MessageKind<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::Telemetry(_) => "telemetry",
            MessageKind::Status(_) => "status",
            MessageKind::Handshake => "handshake",
            MessageKind::Unknown => "unknown",
        }
    }
}

/// Classify `text`. The handshake is an exact literal; the rest match by prefix.
pub fn classify<'a>(text: &'a str, handshake: &str) -> MessageKind<'a> {
    let text = text.trim();
    if text == handshake {
        return MessageKind::Handshake;
    }
    if let Some(body) = text.strip_prefix(TELEMETRY_PREFIX) {
        return MessageKind::Telemetry(body);
    }
    if let Some(rest) = text.strip_prefix(STATUS_PREFIX) {
        return MessageKind::Status(status_body(rest));
    }
    MessageKind::Unknown
}

/// `LABEL: body` yields `body`; without a colon the whole remainder is the body.
fn status_body(rest: &str) -> &str {
    match rest.split_once(':') {
        Some((_, body)) => body.trim(),
        None => rest.trim(),
    }
}
