//! # Event subscribers.
//!
//! ```text
//! Bus ──► SubscriberSet::listen ──┬──► LogWriter (tracing)
//!                                 └──► custom Subscribe impls
//! ```
//!
//! ## Implementing a subscriber
//! ```no_run
//! use async_trait::async_trait;
//! use devmanager::events::{Event, EventKind};
//! use devmanager::subscribers::Subscribe;
//!
//! struct DeadAlarm;
//!
//! #[async_trait]
//! impl Subscribe for DeadAlarm {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::AppDead {
//!             eprintln!("\x07{} stopped sending heartbeats", ev.app.as_deref().unwrap_or("?"));
//!         }
//!     }
//!     fn name(&self) -> &'static str { "dead-alarm" }
//! }
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
