//! Supervisor core: observed state, the state machine and its drivers.
//!
//! - [`app`]: per-app record and its pure transitions;
//! - [`registry`]: workspaces and their apps, shared behind a `RwLock`;
//! - [`launcher`]: the port through which processes are spawned and signalled;
//! - [`supervisor`]: start/stop/restart/enable/ping against the registry;
//! - [`health`]: periodic demotion of apps that stopped sending heartbeats;
//! - [`shutdown`]: OS signal handling.
//!
//! ```text
//!   server / CLI ──► ProcessSupervisor ──► Launcher ──► OS process
//!                          │    ▲                           │
//!                          ▼    │ exit watcher ◄────────────┘
//!                 RwLock<WorkspaceRegistry>
//!                          ▲
//!   HealthMonitor ─────────┘ (every sweep_period)
//! ```

mod app;
mod health;
mod launcher;
mod registry;
mod shutdown;
mod supervisor;

#[cfg(test)]
pub(crate) mod fakes;

pub use app::{AppRuntime, AppStatus, ColorTag, ExitOutcome, PingOutcome, ProcessHandle};
pub use health::{Demoted, HealthMonitor};
pub use launcher::{CommandLauncher, LaunchedProcess, Launcher, app_command};
pub use registry::{WorkspaceRegistry, WorkspaceRuntime};
pub use shutdown::{cancel_on_signal, wait_for_shutdown_signal};
pub use supervisor::{Clock, ProcessSupervisor, resolve_log_path};
