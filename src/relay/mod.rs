//! # Relay Core
//!
//! Everything between the radio link and the operator:
//!
//! - [`classify`] - closed classification of inbound vehicle text
//! - [`dispatcher`] - per-message gates and side effects
//! - [`telemetry`] - `TLM_` parsing and the rolling telemetry log
//! - [`connectivity`] - liveness state and its monitor task
//! - [`alerts`] - fire-and-forget status alert delivery
//! - [`commands`] - the bounded outbound command queue and its executor
//! - [`waypoints`] - waypoint table loading
//! - [`http`] - operator HTTP surface
//! - [`server`] - [`RelayServer`], which runs all of the above

pub mod alerts;
pub mod classify;
pub mod commands;
pub mod connectivity;
pub mod dispatcher;
pub mod http;
pub mod server;
pub mod telemetry;
pub mod waypoints;

pub use server::RelayServer;
