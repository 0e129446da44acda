//! # Meshrelay - Ground Station Relay for Meshtastic Networks
//!
//! Meshrelay sits between a ground-control web application and a remote vehicle
//! that talks over a long-range Meshtastic mesh link. It receives the vehicle's
//! tagged text messages, acts on each one exactly once, keeps a rolling telemetry
//! history on disk, tracks link liveness, and forwards operator commands back to
//! the vehicle one at a time.
//!
//! ## Features
//!
//! - **Exactly-once dispatch**: processed message ids persist across restarts, so radio-level retransmissions are handled once.
//! - **Rolling telemetry log**: `TLM_` reports land in a header + rows CSV capped at 1000 rows.
//! - **Liveness tracking**: instant promote on traffic, polled demote after 120 s of silence, mirrored to a status file.
//! - **Status alerts**: `STAT_` reports are posted to the operator UI without stalling dispatch.
//! - **Serialized commands**: manual, mission and waypoint uploads share one FIFO consumer and respect the ack delay.
//! - **Async Design**: Built with Tokio; TCP or serial link to the node.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshrelay::config::Config;
//! use meshrelay::relay::RelayServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load("config.toml").await?;
//!     config.apply_env_overrides();
//!
//!     let mut server = RelayServer::new(config).await?;
//!     server.connect_radio().await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`relay`] - dispatch, telemetry, connectivity, alerts, command queue, HTTP surface
//! - [`meshtastic`] - Meshtastic stream framing and the radio link tasks
//! - [`storage`] - locked file stores (dedup ids, rolling CSV logs, marker files)
//! - [`config`] - configuration loading, defaults and environment overrides
//! - [`validation`] - node id, channel and command payload checks
//! - [`protobuf`] - the Meshtastic protobuf messages the link needs
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐        ┌─────────────────┐
//! │  Meshtastic     │ ─────▶ │   Dispatcher    │ ─▶ dedup / telemetry / liveness / alerts
//! │  link           │        └─────────────────┘
//! │                 │ ◀───── ┌─────────────────┐
//! └─────────────────┘        │  Command queue  │ ◀─ HTTP /send
//!                            └─────────────────┘
//! ```

pub mod config;
pub mod logutil;
pub mod meshtastic;
pub mod metrics;
pub mod protobuf;
pub mod relay;
pub mod storage;
pub mod validation;
