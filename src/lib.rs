//! Dynamic Speed Controller Library
//!
//! Real-time movement and attack speed modifiers for actors in a host game
//! engine. Every change the controller makes to a host attribute is tracked
//! in a per-entity slot, so its full contribution can be reverted exactly.
//!
//! # Layout
//!
//! - [`host`] - narrow traits the host adapter implements, plus an in-memory host
//! - [`controller`] - effect evaluation, smoothing, commit, scanning, persistence
//! - [`config`] - the tolerant JSON configuration document
//! - [`metrics`] - counters with Prometheus/JSON export

pub mod config;
pub mod controller;
pub mod host;
pub mod metrics;
pub mod util;

pub use config::{ConfigHandle, ControllerConfig};
pub use controller::driver::{Task, TickDriver};
pub use controller::snapshot::Snapshot;
pub use controller::SpeedController;
pub use host::{AttributeChannel, EntityId, Host, HostError};
pub use metrics::Metrics;
