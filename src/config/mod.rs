//! # Configuration Management Module
//!
//! Relay configuration lives in a TOML file (default `config.toml`). Every
//! section has defaults, so a partial file (or an empty one) is valid.
//!
//! ## Configuration Structure
//!
//! - [`StationConfig`] - expected vehicle node id and the handshake literals
//! - [`MeshtasticConfig`] - how to reach the Meshtastic node (TCP or serial)
//! - [`StorageConfig`] - telemetry, location, dedup and marker file locations
//! - [`ConnectivityConfig`] - liveness timeout and poll cadence
//! - [`CommandsConfig`] - outbound queue size and waypoint pacing
//! - [`AlertsConfig`] - where status alerts are posted
//! - [`HttpConfig`] - operator command surface bind address
//! - [`LoggingConfig`] - level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshrelay::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load("config.toml").await?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!     println!("Listening for {}", config.station.source_id);
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Integration
//!
//! After the file is loaded, `MESHTASTIC_HOST`, `MESHTASTIC_SERIAL`, `CHANNEL_INDEX`,
//! `SOURCE_ID` and `ACK_DELAY` (seconds) override the file. CLI flags win over both.

use anyhow::{anyhow, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::meshtastic::LinkTarget;
use crate::validation::{validate_channel_index, validate_node_id};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub station: StationConfig,
    pub meshtastic: MeshtasticConfig,
    pub storage: StorageConfig,
    pub connectivity: ConnectivityConfig,
    pub commands: CommandsConfig,
    pub alerts: AlertsConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Only messages from this node are dispatched.
    pub source_id: String,
    /// Literal the vehicle sends once after boot.
    pub handshake_text: String,
    /// Reply sent back when the handshake arrives.
    pub handshake_ack: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            source_id: "!eb15a9fe".to_string(),
            handshake_text: "STARTUP_READY_TO_GO".to_string(),
            handshake_ack: "STARTUP_ACK".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshtasticConfig {
    /// `host` or `host:port` of a network-connected node.
    pub host: String,
    /// Serial device path. When non-empty it takes precedence over `host`.
    pub serial_port: String,
    pub baud_rate: u32,
    /// Channel slot used for every outbound send.
    pub channel: u32,
    pub want_ack: bool,
    pub heartbeat_secs: u64,
}

impl Default for MeshtasticConfig {
    fn default() -> Self {
        Self {
            host: "localhost:4403".to_string(),
            serial_port: String::new(),
            baud_rate: 115200,
            channel: 5,
            want_ack: true,
            heartbeat_secs: 300,
        }
    }
}

pub const DEFAULT_TCP_PORT: u16 = 4403;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    pub telemetry_file: String,
    /// Optional `timestamp, lat, long` log; empty disables it.
    pub location_file: String,
    pub processed_ids_file: String,
    pub status_file: String,
    pub waypoints_file: String,
    pub last_manual_file: String,
    pub max_entries: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            telemetry_file: "telemetry.csv".to_string(),
            location_file: String::new(),
            processed_ids_file: "processed_ids.txt".to_string(),
            status_file: "connection_status.txt".to_string(),
            waypoints_file: "waypoints.csv".to_string(),
            last_manual_file: "last_manual_command.txt".to_string(),
            max_entries: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    pub timeout_secs: u64,
    pub poll_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            poll_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub queue_capacity: usize,
    /// Pause between waypoint sends (ms).
    pub ack_delay_ms: u64,
    pub suppress_repeat_manual: bool,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            ack_delay_ms: 500,
            suppress_repeat_manual: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://127.0.0.1:3000/api/alert".to_string(),
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    /// Size in KiB at which `file` rolls over to `<file>.1`. 0 disables the cap.
    pub rotate_kb: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("meshrelay.log".to_string()),
            rotate_kb: 1024,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_node_id(&self.station.source_id)?;
        validate_channel_index(self.meshtastic.channel)?;
        if self.station.handshake_text.trim().is_empty() {
            return Err(anyhow!("station.handshake_text must not be empty"));
        }
        if self.storage.max_entries == 0 {
            return Err(anyhow!("storage.max_entries must be at least 1"));
        }
        if self.connectivity.poll_secs == 0 {
            return Err(anyhow!("connectivity.poll_secs must be at least 1"));
        }
        if self.commands.queue_capacity == 0 {
            return Err(anyhow!("commands.queue_capacity must be at least 1"));
        }
        if self.meshtastic.serial_port.is_empty() && self.meshtastic.host.trim().is_empty() {
            return Err(anyhow!(
                "either meshtastic.host or meshtastic.serial_port must be set"
            ));
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Bad values are logged and skipped.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MESHTASTIC_HOST").filter(|v| !v.trim().is_empty()) {
            self.meshtastic.host = host.trim().to_string();
            self.meshtastic.serial_port.clear();
        }
        if let Some(path) = lookup("MESHTASTIC_SERIAL").filter(|v| !v.trim().is_empty()) {
            self.meshtastic.serial_port = path.trim().to_string();
        }
        if let Some(raw) = lookup("CHANNEL_INDEX") {
            match raw.trim().parse::<u32>() {
                Ok(ch) => self.meshtastic.channel = ch,
                Err(_) => warn!("Ignoring CHANNEL_INDEX='{}': not a number", raw),
            }
        }
        if let Some(raw) = lookup("SOURCE_ID") {
            match validate_node_id(&raw) {
                Ok(id) => self.station.source_id = id,
                Err(e) => warn!("Ignoring SOURCE_ID: {}", e),
            }
        }
        if let Some(raw) = lookup("ACK_DELAY") {
            match raw.trim().parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs >= 0.0 => {
                    self.commands.ack_delay_ms = (secs * 1000.0).round() as u64;
                }
                _ => warn!("Ignoring ACK_DELAY='{}': expected seconds", raw),
            }
        }
    }

    /// Resolve a storage path against `storage.data_dir` unless it is absolute.
    pub fn resolve(&self, file: &str) -> PathBuf {
        let p = Path::new(file);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            Path::new(&self.storage.data_dir).join(p)
        }
    }

    pub fn location_path(&self) -> Option<PathBuf> {
        if self.storage.location_file.trim().is_empty() {
            None
        } else {
            Some(self.resolve(&self.storage.location_file))
        }
    }

    pub fn link_target(&self) -> Result<LinkTarget> {
        if !self.meshtastic.serial_port.is_empty() {
            return Ok(LinkTarget::Serial {
                path: self.meshtastic.serial_port.clone(),
                baud_rate: self.meshtastic.baud_rate,
            });
        }
        let host = self.meshtastic.host.trim();
        match host.rsplit_once(':') {
            Some((h, port)) if !h.is_empty() => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| anyhow!("invalid port in meshtastic.host '{}'", host))?;
                Ok(LinkTarget::Tcp {
                    host: h.to_string(),
                    port,
                })
            }
            _ => Ok(LinkTarget::Tcp {
                host: host.to_string(),
                port: DEFAULT_TCP_PORT,
            }),
        }
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.meshtastic.heartbeat_secs.max(1))
    }

    pub fn ack_delay(&self) -> Duration {
        Duration::from_millis(self.commands.ack_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_ground_station() {
        let c = Config::default();
        assert_eq!(c.station.source_id, "!eb15a9fe");
        assert_eq!(c.meshtastic.channel, 5);
        assert_eq!(c.storage.max_entries, 1000);
        assert_eq!(c.connectivity.timeout_secs, 120);
        assert_eq!(c.connectivity.poll_secs, 10);
        assert_eq!(c.ack_delay(), Duration::from_millis(500));
        assert_eq!(c.logging.rotate_kb, 1024);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let c: Config = toml::from_str("[station]\nsource_id = \"!0000beef\"\n").unwrap();
        assert_eq!(c.station.source_id, "!0000beef");
        assert_eq!(c.station.handshake_ack, "STARTUP_ACK");
        assert_eq!(c.http.bind, "127.0.0.1:5000");
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.alerts.url, "http://127.0.0.1:3000/api/alert");
    }

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let vars: HashMap<&str, &str> = [
            ("MESHTASTIC_HOST", "10.0.0.7"),
            ("CHANNEL_INDEX", "two"),
            ("SOURCE_ID", "!DEADBEEF"),
            ("ACK_DELAY", "1.25"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        c.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(c.meshtastic.host, "10.0.0.7");
        assert_eq!(c.meshtastic.channel, 5);
        assert_eq!(c.station.source_id, "!deadbeef");
        assert_eq!(c.commands.ack_delay_ms, 1250);
        assert_eq!(
            c.link_target().unwrap(),
            LinkTarget::Tcp {
                host: "10.0.0.7".into(),
                port: 4403
            }
        );
    }

    #[test]
    fn serial_port_wins_over_host() {
        let mut c = Config::default();
        c.meshtastic.serial_port = "/dev/ttyACM0".into();
        assert_eq!(
            c.link_target().unwrap(),
            LinkTarget::Serial {
                path: "/dev/ttyACM0".into(),
                baud_rate: 115200
            }
        );
    }

    #[test]
    fn relative_paths_resolve_under_data_dir() {
        let mut c = Config::default();
        c.storage.data_dir = "/var/lib/relay".into();
        assert_eq!(
            c.resolve("telemetry.csv"),
            PathBuf::from("/var/lib/relay/telemetry.csv")
        );
        assert_eq!(c.resolve("/tmp/x.csv"), PathBuf::from("/tmp/x.csv"));
        assert!(c.location_path().is_none());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut c = Config::default();
        c.meshtastic.channel = 9;
        assert!(c.validate().is_err());
        let mut c = Config::default();
        c.station.source_id = "eb15a9fe".into();
        assert!(c.validate().is_err());
    }
}
