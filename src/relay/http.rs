//! Operator HTTP surface.
//!
//! `POST /send` only enqueues; the command consumer does the radio work.
//! `GET /status` reports connectivity and the relay counters.

use anyhow::{anyhow, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use super::commands::{CommandError, CommandQueue, OutboundCommand, QueueError};
use super::connectivity::Connectivity;
use crate::metrics;

#[derive(Debug, Clone)]
pub struct HttpState {
    pub queue: CommandQueue,
    pub connectivity: Connectivity,
}

#[derive(Debug, Default, Deserialize)]
struct SendRequest {
    #[serde(rename = "type")]
    kind: Option<String>,
    payload: Option<String>,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/send", post(send_command))
        .route("/status", get(status))
        .with_state(state)
}

fn error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into() })))
}

async fn send_command(State(state): State<HttpState>, body: Bytes) -> (StatusCode, Json<Value>) {
    let req: SendRequest = if body.iter().all(|b| b.is_ascii_whitespace()) {
        SendRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => return error(StatusCode::BAD_REQUEST, format!("invalid request body: {}", e)),
        }
    };
    let kind = req.kind.unwrap_or_default();
    let cmd = match OutboundCommand::from_request(&kind, req.payload.as_deref()) {
        Ok(cmd) => cmd,
        Err(e @ CommandError::UnknownType(_)) => {
            warn!("[http] rejected command type '{}'", kind);
            return error(StatusCode::BAD_REQUEST, e.to_string());
        }
        Err(CommandError::Invalid(e)) => {
            warn!("[http] rejected {} payload: {}", kind, e);
            return error(StatusCode::BAD_REQUEST, e.to_string());
        }
    };
    let tag = cmd.kind.tag();
    match state.queue.submit(cmd) {
        Ok(()) => {
            info!("[http] queued {}", tag);
            (StatusCode::OK, Json(json!({ "status": "queued" })))
        }
        Err(e @ QueueError::Full) => {
            warn!("[http] {} dropped: {}", tag, e);
            error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e @ QueueError::Closed) => {
            warn!("[http] {} dropped: {}", tag, e);
            error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

async fn status(State(state): State<HttpState>) -> Json<Value> {
    let snap = state.connectivity.snapshot();
    Json(json!({
        "connected": snap.connected,
        "last_telemetry": snap.last_telemetry.map(|t| t.to_rfc3339()),
        "metrics": metrics::snapshot(),
    }))
}

pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow!("Failed to bind HTTP surface on {}: {}", addr, e))
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, state: HttpState) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP command surface listening on http://{}", addr);
    }
    axum::serve(listener, router(state))
        .await
        .map_err(|e| anyhow!("HTTP server error: {}", e))
}
