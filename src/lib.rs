//! # devmanager
//!
//! **devmanager** (`dm`) supervises the development apps of a workspace: it
//! starts, stops and restarts them as detached OS processes and tracks their
//! liveness through heartbeats, because a hung app never exits.
//!
//! ## Architecture
//! ```text
//!   dm CLI ──► DmClient ──HTTP──►┌──────────────────────────────────────────┐
//!   HeartbeatAgent ──ping───────►│ server (axum)                            │
//!                                │  request_scope → RequestContext (req_id) │
//!                                └─────────────────┬────────────────────────┘
//!                                                  ▼
//!                 ConfigResolver ◄──── ProcessSupervisor ────► Launcher
//!                 (dm.conf)                │        │           (spawn/SIGTERM)
//!                                          │        └─ exit watcher per spawn
//!                                          ▼
//!                          Arc<RwLock<WorkspaceRegistry>>
//!                           WorkspaceRuntime ─► AppRuntime (status machine)
//!                                          ▲
//!                     HealthMonitor ───────┘  (Running → Dead on stale heartbeat)
//!
//!   ProcessSupervisor / HealthMonitor ──► Bus ──► SubscriberSet ──► LogWriter
//! ```
//!
//! ### App status machine
//! ```text
//!        start ok              stop
//! None ───────────► Running ─────────► Stopped ──start──► Running
//!  │                 │  ▲  │                     (late ping within grace: ignored)
//!  │ spawn error     │  │  └── exit (unexpected) ─► Killed ──start──► Running
//!  ▼                 │  │ ping
//! Killed       sweep │  │
//!                    ▼  │
//!                    Dead
//!
//! any ──disable──► Disabled ──enable──► None ──start──► …
//! ```
//!
//! ## Modules
//! - [`config`]: `dm.conf` model, upward search, runtime [`Settings`]
//! - [`core`]: registry, supervisor, health monitor, launcher port
//! - [`server`] / [`client`]: HTTP control API and its proxy
//! - [`agent`]: heartbeat sender
//! - [`build`]: `tsc` driver for `dm build`
//! - [`executor`], [`lines`], [`context`]: bounded concurrency, line framing,
//!   request-scoped correlation ids
//! - [`events`] / [`subscribers`]: lifecycle event fan-out
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use devmanager::config::{FsConfigResolver, Settings};
//! use devmanager::core::{CommandLauncher, ProcessSupervisor};
//! use devmanager::events::Bus;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), devmanager::DmError> {
//!     let sup = ProcessSupervisor::new(
//!         Arc::new(FsConfigResolver::new()),
//!         Arc::new(CommandLauncher::new()),
//!         Settings::default(),
//!         Bus::new(1024),
//!     );
//!     let cwd = std::env::current_dir()?;
//!     for app in sup.start(&cwd, None).await? {
//!         println!("{} {}", app.name, app.status);
//!     }
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod build;
pub mod client;
pub mod config;
pub mod context;
pub mod core;
pub mod dto;
pub mod events;
pub mod executor;
pub mod lines;
pub mod server;
pub mod subscribers;
pub mod table;

mod error;

pub use config::Settings;
pub use error::{DmError, ErrorCode};
