//! Relay server: wires the radio link to dispatch, liveness, commands and HTTP.

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::alerts::{spawn_alert_actor, HttpAlertNotifier};
use super::commands::{spawn_command_consumer, CommandExecutor, CommandQueue};
use super::connectivity::{spawn_monitor, Connectivity};
use super::dispatcher::Dispatcher;
use super::http::{self, HttpState};
use super::telemetry::TelemetryLog;
use crate::config::Config;
use crate::meshtastic::{self, RadioLink};
use crate::metrics;
use crate::storage::{ProcessedIds, StatusMarker};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

pub struct RelayServer {
    config: Config,
    dedup: Arc<ProcessedIds>,
    telemetry: TelemetryLog,
    connectivity: Connectivity,
    link: Option<RadioLink>,
}

impl RelayServer {
    /// Prepare storage and state. Storage problems are logged; only a bad config fails.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        if let Err(e) = tokio::fs::create_dir_all(&config.storage.data_dir).await {
            warn!(
                "Could not create data dir {}: {}",
                config.storage.data_dir, e
            );
        }

        let telemetry = TelemetryLog::new(
            config.resolve(&config.storage.telemetry_file),
            config.location_path(),
            config.storage.max_entries,
        );
        if let Err(e) = telemetry.ensure() {
            warn!("[tlm] could not prepare telemetry log: {}", e);
        }

        let dedup = Arc::new(ProcessedIds::load(
            config.resolve(&config.storage.processed_ids_file),
        ));

        let connectivity = Connectivity::new(
            Some(StatusMarker::new(config.resolve(&config.storage.status_file))),
            Duration::from_secs(config.connectivity.timeout_secs),
        );
        connectivity.initialize();

        Ok(Self {
            config,
            dedup,
            telemetry,
            connectivity,
            link: None,
        })
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity.clone()
    }

    /// Open the configured link. Failure here is fatal for `start`.
    pub async fn connect_radio(&mut self) -> Result<()> {
        let target = self.config.link_target()?;
        let link = meshtastic::connect(&target, self.config.heartbeat()).await?;
        info!("Connected to Meshtastic node at {}", target);
        self.link = Some(link);
        Ok(())
    }

    /// Use an already-open link.
    pub fn attach_link(&mut self, link: RadioLink) {
        self.link = Some(link);
    }

    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        })
        .await
    }

    /// Run every relay task until `shutdown` resolves.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let link = self
            .link
            .take()
            .ok_or_else(|| anyhow!("radio link not connected"))?;
        let RadioLink { inbound_rx, handle } = link;

        let notifier = HttpAlertNotifier::new(&self.config.alerts);
        if self.config.alerts.enabled {
            info!("[alert] forwarding status alerts to {}", notifier.url());
        }
        let (alerts, alert_task) = spawn_alert_actor(notifier);

        let dispatcher = Dispatcher::from_config(
            &self.config,
            self.dedup.clone(),
            self.telemetry.clone(),
            self.connectivity.clone(),
            alerts,
            handle.clone(),
        );
        let dispatch_task = tokio::spawn(dispatcher.run(inbound_rx));

        let monitor_task = spawn_monitor(
            self.connectivity.clone(),
            Duration::from_secs(self.config.connectivity.poll_secs),
        );

        let executor = CommandExecutor::from_config(&self.config, handle);
        let (queue, command_task) =
            spawn_command_consumer(executor, self.config.commands.queue_capacity);

        let http_task = if self.config.http.enabled {
            Some(self.spawn_http(queue).await?)
        } else {
            None
        };

        info!(
            "Relay running: source {} on channel {}",
            self.config.station.source_id, self.config.meshtastic.channel
        );

        let mut stats = tokio::time::interval(STATS_INTERVAL);
        stats.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = stats.tick() => {
                    debug!("relay stats: {:?}", metrics::snapshot());
                }
            }
        }

        for task in [dispatch_task, monitor_task, command_task, alert_task] {
            task.abort();
        }
        if let Some(t) = http_task {
            t.abort();
        }
        info!("Relay stopped");
        Ok(())
    }

    async fn spawn_http(&self, queue: CommandQueue) -> Result<tokio::task::JoinHandle<()>> {
        let listener = http::bind(&self.config.http.bind).await?;
        let state = HttpState {
            queue,
            connectivity: self.connectivity.clone(),
        };
        Ok(tokio::spawn(async move {
            if let Err(e) = http::serve(listener, state).await {
                error!("{}", e);
            }
        }))
    }
}
