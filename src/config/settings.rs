//! # Global runtime settings.
//!
//! Provides [`Settings`], the centralized knobs of the supervisor process.
//!
//! Settings are used in three places:
//! 1. **Supervisor creation**: grace window, restart delay, default runtime
//! 2. **Health monitor**: sweep period and dead threshold
//! 3. **Transport/CLI**: control port, shutdown delay, build concurrency
//!
//! ## Sentinel values
//! - `build_concurrency = 0` → treated as 1 (the build driver never runs unbounded)
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

/// Default control-server port.
pub const DEFAULT_PORT: u16 = 7070;

/// Runtime configuration of the supervisor.
///
/// ## Field semantics
/// - `grace_window`: after an explicit stop, heartbeats younger than this are ignored
/// - `dead_threshold`: a `Running` app without heartbeat for longer than this becomes `Dead`
/// - `sweep_period`: interval between health sweeps
/// - `restart_delay`: pause between the stop and start halves of a restart
/// - `shutdown_delay`: delay between `/api/shutdown` and process exit
/// - `build_concurrency`: maximum number of compiler processes in flight
#[derive(Clone, Debug)]
pub struct Settings {
    /// Port of the HTTP control API (bound on 127.0.0.1).
    pub port: u16,

    /// Interval after `stop` during which late pings are dropped.
    pub grace_window: Duration,

    /// Maximum heartbeat age before a running app is demoted to `Dead`.
    pub dead_threshold: Duration,

    /// Health sweep period.
    pub sweep_period: Duration,

    /// Pause between stopping and starting apps during a restart.
    pub restart_delay: Duration,

    /// Delay before the process exits after a shutdown request.
    pub shutdown_delay: Duration,

    /// Capacity of the lifecycle event bus.
    pub bus_capacity: usize,

    /// Compiler processes allowed to run at once during `dm build`.
    pub build_concurrency: usize,

    /// Program used to run an app's `main` when the app does not name one.
    pub runtime: String,
}

impl Settings {
    /// Returns the build concurrency clamped to a minimum of 1.
    #[inline]
    pub fn build_limit(&self) -> usize {
        self.build_concurrency.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Base URL of the control API, e.g. `http://127.0.0.1:7070/api`.
    pub fn api_base(&self) -> String {
        format!("http://127.0.0.1:{}/api", self.port)
    }

    /// Default settings overridden by `DM_*` environment variables.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut s = Self::default();
        let millis = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
        };

        if let Some(port) = lookup("DM_PORT").and_then(|v| v.trim().parse().ok()) {
            s.port = port;
        }
        if let Some(d) = millis("DM_GRACE_MS") {
            s.grace_window = d;
        }
        if let Some(d) = millis("DM_DEAD_MS") {
            s.dead_threshold = d;
        }
        if let Some(d) = millis("DM_SWEEP_MS") {
            s.sweep_period = d;
        }
        if let Some(d) = millis("DM_RESTART_DELAY_MS") {
            s.restart_delay = d;
        }
        if let Some(n) = lookup("DM_BUILD_CONCURRENCY").and_then(|v| v.trim().parse().ok()) {
            s.build_concurrency = n;
        }
        if let Some(rt) = lookup("DM_RUNTIME").filter(|v| !v.trim().is_empty()) {
            s.runtime = rt;
        }
        s
    }
}

impl Default for Settings {
    /// Default configuration:
    ///
    /// - `port = 7070`
    /// - `grace_window = 1s`, `dead_threshold = 5s`, `sweep_period = 1s`
    /// - `restart_delay = 100ms`, `shutdown_delay = 1s`
    /// - `bus_capacity = 1024`, `build_concurrency = 2`
    /// - `runtime = "node"`
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            grace_window: Duration::from_millis(1000),
            dead_threshold: Duration::from_millis(5000),
            sweep_period: Duration::from_millis(1000),
            restart_delay: Duration::from_millis(100),
            shutdown_delay: Duration::from_millis(1000),
            bus_capacity: 1024,
            build_concurrency: 2,
            runtime: "node".to_string(),
        }
    }
}
