//! # Per-app observed state and its transitions.
//!
//! [`AppRuntime`] is the registry's record of one app. Every transition is a
//! plain method taking `now`, so the state machine is testable without
//! processes or clocks; the supervisor calls them inside one write-guard scope.
//!
//! ```text
//!            start ok                 exit (not Stopped/Disabled)
//!   None ───────────────► Running ───────────────────────────► Killed
//!    ▲  ▲                  │  ▲  │ stop                          │
//!    │  │ spawn error      │  │  ▼                               │
//!    │  └──── Killed ◄─────┘  │ Stopped ◄──────── stop ──────────┘
//!    │                        │   │  ping after grace window
//!    │                 ping   │   └──────────────► Running
//!    │                        │
//!    │          no heartbeat  ▼
//!    │          > threshold  Dead ──ping──► Running
//!    │
//!    └── enable(true) ── Disabled ◄── enable(false) (from any status)
//! ```
//!
//! ## Rules
//! - `Dead` is entered only from `Running` and keeps the pid.
//! - `Exited` and `Unknown` are part of the vocabulary but never entered.
//! - An exit notification for a process handle other than the current one is ignored.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// Observed status of an app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppStatus {
    None,
    Running,
    Stopped,
    Killed,
    Exited,
    Disabled,
    Dead,
    Unknown,
}

impl AppStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppStatus::None => "None",
            AppStatus::Running => "Running",
            AppStatus::Stopped => "Stopped",
            AppStatus::Killed => "Killed",
            AppStatus::Exited => "Exited",
            AppStatus::Disabled => "Disabled",
            AppStatus::Dead => "Dead",
            AppStatus::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for AppStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cosmetic tag used by the CLI table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTag {
    Green,
    Blue,
    Red,
    Magenta,
}

impl ColorTag {
    const ALL: [ColorTag; 4] = [ColorTag::Green, ColorTag::Blue, ColorTag::Red, ColorTag::Magenta];

    /// Round-robin pick for the `n`-th created app.
    pub fn nth(n: usize) -> Self {
        Self::ALL[n % Self::ALL.len()]
    }

    /// ANSI foreground color code.
    pub fn ansi(self) -> u8 {
        match self {
            ColorTag::Green => 32,
            ColorTag::Blue => 34,
            ColorTag::Red => 31,
            ColorTag::Magenta => 35,
        }
    }
}

/// The supervisor's handle to a spawned process.
///
/// `generation` distinguishes successive spawns of the same app so a late
/// exit notification cannot clobber a newer process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub generation: u64,
}

/// Result of feeding a heartbeat into an app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    /// Heartbeat recorded; carries the status before the ping.
    Accepted(AppStatus),
    /// App is disabled.
    IgnoredDisabled,
    /// App was stopped less than the grace window ago.
    IgnoredGrace,
}

/// Result of an exit notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process died on its own; status is now `Killed`.
    Killed,
    /// The process exited after an explicit stop/disable; status unchanged.
    Expected,
    /// Notification for a superseded handle; nothing changed.
    Stale,
}

/// Observed state of one app.
#[derive(Debug, Clone)]
pub struct AppRuntime {
    pub name: String,
    pub config: Arc<AppConfig>,
    pub status: AppStatus,
    pub pid: Option<u32>,
    pub process: Option<ProcessHandle>,
    pub error: Option<String>,
    pub port: Option<u16>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub color: ColorTag,
}

impl AppRuntime {
    /// Fresh record; `Disabled` when the config says so.
    pub fn new(config: Arc<AppConfig>, color: ColorTag) -> Self {
        let status = if config.disabled {
            AppStatus::Disabled
        } else {
            AppStatus::None
        };
        Self {
            name: config.name.clone(),
            config,
            status,
            pid: None,
            process: None,
            error: None,
            port: None,
            last_heartbeat: None,
            stopped_at: None,
            color,
        }
    }

    /// Whether `start` should spawn a process.
    pub fn can_start(&self) -> bool {
        self.status != AppStatus::Disabled && self.process.is_none()
    }

    /// Records a successful spawn.
    pub fn on_spawned(&mut self, handle: ProcessHandle, now: DateTime<Utc>) {
        self.process = Some(handle);
        self.pid = Some(handle.pid);
        self.status = AppStatus::Running;
        self.error = None;
        self.last_heartbeat = Some(now);
    }

    /// Records a spawn failure.
    pub fn on_spawn_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.status = AppStatus::Killed;
        self.pid = None;
        self.process = None;
    }

    /// Marks an explicit stop and returns the pid that must be signalled.
    ///
    /// Returns `None` (and changes nothing) when disabled or without a live pid.
    pub fn mark_stopped(&mut self, now: DateTime<Utc>) -> Option<u32> {
        if self.status == AppStatus::Disabled {
            return None;
        }
        let pid = self.pid.take()?;
        self.status = AppStatus::Stopped;
        self.stopped_at = Some(now);
        Some(pid)
    }

    /// Records a failure to signal the stopped process.
    pub fn on_signal_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Applies an OS exit notification for the process with `generation`.
    pub fn on_exit(&mut self, generation: u64) -> ExitOutcome {
        match self.process {
            Some(h) if h.generation == generation => {}
            _ => return ExitOutcome::Stale,
        }
        self.process = None;
        self.pid = None;
        if matches!(self.status, AppStatus::Stopped | AppStatus::Disabled) {
            ExitOutcome::Expected
        } else {
            self.status = AppStatus::Killed;
            ExitOutcome::Killed
        }
    }

    /// Forces `Disabled` (after the stop half of `enable(false)`).
    pub fn disable(&mut self) {
        self.status = AppStatus::Disabled;
    }

    /// Leaves `Disabled` for `None`; returns `false` when not disabled.
    pub fn enable(&mut self) -> bool {
        if self.status != AppStatus::Disabled {
            return false;
        }
        self.pid = None;
        self.status = AppStatus::None;
        true
    }

    /// Ingests a heartbeat.
    pub fn ping(&mut self, pid: u32, now: DateTime<Utc>, grace: Duration) -> PingOutcome {
        match self.status {
            AppStatus::Disabled => return PingOutcome::IgnoredDisabled,
            AppStatus::Stopped if within(self.stopped_at, now, grace) => {
                return PingOutcome::IgnoredGrace;
            }
            _ => {}
        }
        let before = self.status;
        self.status = AppStatus::Running;
        self.error = None;
        self.pid = Some(pid);
        self.last_heartbeat = Some(now);
        PingOutcome::Accepted(before)
    }

    /// Demotes a stale `Running` app to `Dead`; returns `true` when demoted.
    pub fn sweep(&mut self, now: DateTime<Utc>, threshold: Duration) -> bool {
        if self.status != AppStatus::Running {
            return false;
        }
        let stale = match self.last_heartbeat {
            Some(at) => elapsed(at, now) > threshold,
            None => false,
        };
        if stale {
            self.status = AppStatus::Dead;
        }
        stale
    }
}

fn within(since: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
    since.is_some_and(|at| elapsed(at, now) < window)
}

fn elapsed(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - at).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn app() -> AppRuntime {
        let config = AppConfig {
            name: "api".into(),
            main: "/ws/api/main.js".into(),
            ..AppConfig::default()
        };
        AppRuntime::new(Arc::new(config), ColorTag::nth(0))
    }

    fn ms(n: i64) -> TimeDelta {
        TimeDelta::milliseconds(n)
    }

    const GRACE: Duration = Duration::from_millis(1000);

    #[test]
    fn test_late_ping_inside_grace_window_is_dropped() {
        let t = Utc::now();
        let mut a = app();
        a.on_spawned(ProcessHandle { pid: 10, generation: 1 }, t);

        assert_eq!(a.mark_stopped(t), Some(10));
        assert_eq!(a.ping(10, t + ms(500), GRACE), PingOutcome::IgnoredGrace);
        assert_eq!(a.status, AppStatus::Stopped);
        assert_eq!(a.pid, None);

        assert_eq!(a.ping(11, t + ms(1500), GRACE), PingOutcome::Accepted(AppStatus::Stopped));
        assert_eq!(a.status, AppStatus::Running);
        assert_eq!(a.pid, Some(11));
    }

    #[test]
    fn test_disabled_ignores_ping_and_stop() {
        let mut a = app();
        a.disable();
        assert_eq!(a.ping(5, Utc::now(), GRACE), PingOutcome::IgnoredDisabled);
        assert_eq!(a.mark_stopped(Utc::now()), None);
        assert!(!a.can_start());
        assert!(a.enable());
        assert_eq!(a.status, AppStatus::None);
        assert!(!a.enable());
    }

    #[test]
    fn test_exit_after_stop_keeps_stopped() {
        let t = Utc::now();
        let mut a = app();
        a.on_spawned(ProcessHandle { pid: 10, generation: 1 }, t);
        a.mark_stopped(t);
        assert_eq!(a.on_exit(1), ExitOutcome::Expected);
        assert_eq!(a.status, AppStatus::Stopped);
        assert!(a.process.is_none());
    }

    #[test]
    fn test_unexpected_exit_kills_and_stale_exit_is_ignored() {
        let t = Utc::now();
        let mut a = app();
        a.on_spawned(ProcessHandle { pid: 10, generation: 1 }, t);
        assert_eq!(a.on_exit(1), ExitOutcome::Killed);
        assert_eq!(a.status, AppStatus::Killed);

        a.on_spawned(ProcessHandle { pid: 20, generation: 2 }, t);
        assert_eq!(a.on_exit(1), ExitOutcome::Stale);
        assert_eq!(a.status, AppStatus::Running);
        assert_eq!(a.pid, Some(20));
    }

    #[test]
    fn test_sweep_only_demotes_stale_running() {
        let t = Utc::now();
        let threshold = Duration::from_millis(5000);

        let mut a = app();
        a.on_spawned(ProcessHandle { pid: 10, generation: 1 }, t - ms(6000));
        assert!(a.sweep(t, threshold));
        assert_eq!(a.status, AppStatus::Dead);
        assert_eq!(a.pid, Some(10));
        assert!(!a.sweep(t, threshold));

        let mut b = app();
        b.on_spawned(ProcessHandle { pid: 11, generation: 1 }, t - ms(4000));
        assert!(!b.sweep(t, threshold));
        assert_eq!(b.status, AppStatus::Running);
    }

    #[test]
    fn test_sweep_leaves_stopped_and_killed_apps_alone() {
        let t = Utc::now();
        let threshold = Duration::from_millis(5000);

        let mut stopped = app();
        stopped.on_spawned(ProcessHandle { pid: 10, generation: 1 }, t - ms(60_000));
        stopped.mark_stopped(t - ms(59_000));
        assert!(stopped.last_heartbeat.is_some());
        assert!(!stopped.sweep(t, threshold));
        assert_eq!(stopped.status, AppStatus::Stopped);

        let mut killed = app();
        killed.on_spawned(ProcessHandle { pid: 11, generation: 1 }, t - ms(60_000));
        assert_eq!(killed.on_exit(1), ExitOutcome::Killed);
        assert!(!killed.sweep(t, threshold));
        assert_eq!(killed.status, AppStatus::Killed);
    }

    #[test]
    fn test_spawn_error_records_message() {
        let mut a = app();
        a.on_spawn_error("No such file or directory");
        assert_eq!(a.status, AppStatus::Killed);
        assert_eq!(a.error.as_deref(), Some("No such file or directory"));
        assert!(a.can_start());
    }

    #[test]
    fn test_colors_rotate() {
        assert_eq!(ColorTag::nth(0), ColorTag::Green);
        assert_eq!(ColorTag::nth(5), ColorTag::Blue);
    }
}
