//! Status alerts forwarded to the operator UI.
//!
//! The dispatcher drops alert text into an [`AlertHandle`] mailbox and moves on.
//! The actor behind it spawns one detached task per alert, so a slow or dead UI
//! endpoint never holds up inbound dispatch. Failures are logged, never retried.

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::AlertsConfig;
use crate::logutil::escape_log;
use crate::metrics;

#[derive(Debug, Serialize)]
struct AlertBody<'a> {
    message: &'a str,
}

/// POSTs `{"message": text}` to the UI's alert endpoint.
#[derive(Debug, Clone)]
pub struct HttpAlertNotifier {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    enabled: bool,
}

impl HttpAlertNotifier {
    pub fn new(config: &AlertsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            enabled: config.enabled,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn notify(&self, text: &str) -> Result<()> {
        if !self.enabled {
            debug!("[alert] disabled; dropping '{}'", escape_log(text));
            return Ok(());
        }
        let response = self
            .client
            .post(&self.url)
            .json(&AlertBody { message: text })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| anyhow!("POST {} failed: {}", self.url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("POST {} returned {}", self.url, status));
        }
        Ok(())
    }
}

/// Mailbox in front of the notifier actor. Sending never blocks.
#[derive(Debug, Clone)]
pub struct AlertHandle {
    tx: mpsc::UnboundedSender<String>,
}

impl AlertHandle {
    /// A handle plus its raw mailbox, for callers that consume alerts themselves.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn notify(&self, text: &str) {
        if self.tx.send(text.to_string()).is_err() {
            warn!("[alert] notifier stopped; dropping '{}'", escape_log(text));
        }
    }
}

/// Start the actor. Each alert is delivered on its own task.
pub fn spawn_alert_actor(notifier: HttpAlertNotifier) -> (AlertHandle, JoinHandle<()>) {
    let (handle, mut rx) = AlertHandle::channel();
    let task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            let notifier = notifier.clone();
            tokio::spawn(async move {
                match notifier.notify(&text).await {
                    Ok(()) => {
                        metrics::inc_alerts_delivered();
                        info!("[alert] SUCCESS Alert sent: {}", escape_log(&text));
                    }
                    Err(e) => {
                        metrics::inc_alerts_failed();
                        warn!("[alert] FAILED {} ({})", e, escape_log(&text));
                    }
                }
            });
        }
        debug!("[alert] actor stopped");
    });
    (handle, task)
}
