//! Lifecycle events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`]: what happened to which app, and when
//! - [`Bus`]: thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ProcessSupervisor` (start/stop/exit/ping), `HealthMonitor`
//!   (dead apps), the server (shutdown), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the listener spawned by `SubscriberSet::listen`, which fans
//!   events out to every registered [`Subscribe`](crate::subscribers::Subscribe).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
