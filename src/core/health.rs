//! # Heartbeat-driven health monitor.
//!
//! Apps report liveness through pings; a hung app never exits, so the OS exit
//! notification alone cannot detect it. The monitor sweeps the registry on a
//! fixed period and demotes every `Running` app whose last heartbeat is older
//! than the dead threshold.
//!
//! ```text
//! loop {
//!   select {
//!     token.cancelled()     → return
//!     sleep(sweep_period)   → catch_unwind(tick):
//!                               registry.write()
//!                                 └─ Running && now - lastHeartbeat > threshold → Dead
//!                               Bus.publish(AppDead) per demoted app
//!   }
//! }
//! ```
//!
//! ## Rules
//! - Only `Running` apps are demoted; `pid` and the process handle are untouched.
//! - No backoff, no skip-on-overlap: the next tick is scheduled after the current one.
//! - A panicking tick is logged and never stops the loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::registry::WorkspaceRegistry;
use crate::core::supervisor::{Clock, ProcessSupervisor};
use crate::events::{Bus, Event, EventKind};

/// An app demoted by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Demoted {
    pub workspace: String,
    pub app: String,
    pub pid: Option<u32>,
}

/// Periodic sweeper of stale `Running` apps.
pub struct HealthMonitor {
    registry: Arc<RwLock<WorkspaceRegistry>>,
    bus: Bus,
    clock: Clock,
    period: Duration,
    threshold: Duration,
}

impl HealthMonitor {
    /// Monitor over the supervisor's registry, using its settings and clock.
    pub fn new(supervisor: &ProcessSupervisor) -> Self {
        let settings = supervisor.settings();
        Self {
            registry: supervisor.registry(),
            bus: supervisor.bus().clone(),
            clock: supervisor.clock(),
            period: settings.sweep_period,
            threshold: settings.dead_threshold,
        }
    }

    /// Demotes stale apps in `registry`; returns what changed.
    pub fn sweep(
        registry: &mut WorkspaceRegistry,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Vec<Demoted> {
        registry
            .apps_mut()
            .filter_map(|(key, app)| {
                app.sweep(now, threshold).then(|| Demoted {
                    workspace: key.to_string(),
                    app: app.name.clone(),
                    pid: app.pid,
                })
            })
            .collect()
    }

    /// One sweep over the shared registry.
    pub async fn tick(&self) -> usize {
        let demoted = {
            let mut reg = self.registry.write().await;
            Self::sweep(&mut reg, (self.clock)(), self.threshold)
        };
        for d in &demoted {
            self.bus.publish(
                Event::new(EventKind::AppDead)
                    .with_workspace(d.workspace.as_str())
                    .with_app(d.app.as_str())
                    .with_pid_opt(d.pid),
            );
        }
        demoted.len()
    }

    /// Sweeps every period until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.period) => {
                    if let Err(panic) = AssertUnwindSafe(self.tick()).catch_unwind().await {
                        let msg = panic
                            .downcast_ref::<&'static str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        tracing::error!(panic = %msg, "health sweep panicked");
                    }
                }
            }
        }
        tracing::debug!("health monitor stopped");
    }

    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::core::app::{AppStatus, ProcessHandle};
    use crate::core::fakes::{FakeLauncher, StaticResolver, fixture, settle};
    use chrono::TimeDelta;
    use std::path::Path;

    #[test]
    fn test_sweep_demotes_only_stale_running_apps() {
        let now = Utc::now();
        let mut reg = WorkspaceRegistry::new();
        let key = reg.get_or_insert(fixture());

        let api = reg.get_or_create_app(&key, "api").unwrap();
        api.on_spawned(ProcessHandle { pid: 1, generation: 1 }, now - TimeDelta::milliseconds(6000));
        let worker = reg.get_or_create_app(&key, "worker").unwrap();
        worker.on_spawned(ProcessHandle { pid: 2, generation: 2 }, now - TimeDelta::milliseconds(4000));

        let demoted = HealthMonitor::sweep(&mut reg, now, Duration::from_millis(5000));
        assert_eq!(
            demoted,
            vec![Demoted {
                workspace: "shop".into(),
                app: "api".into(),
                pid: Some(1)
            }]
        );

        let work = reg.get(&key).unwrap();
        assert_eq!(work.app("api").unwrap().status, AppStatus::Dead);
        assert_eq!(work.app("api").unwrap().pid, Some(1));
        assert_eq!(work.app("worker").unwrap().status, AppStatus::Running);
        assert_eq!(work.app("mailer").unwrap().status, AppStatus::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_demotes_after_threshold_and_stops_on_cancel() {
        let settings = Settings::default();
        let start = Utc::now();
        let base = tokio::time::Instant::now();
        let sup = ProcessSupervisor::new(
            Arc::new(StaticResolver(fixture())),
            Arc::new(FakeLauncher::default()),
            settings,
            Bus::new(16),
        )
        .with_clock(move || {
            let elapsed = tokio::time::Instant::now() - base;
            start + TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::zero())
        });
        sup.ping("shop", "api", Some(Path::new("/ws")), 77).await.unwrap();
        let registry = sup.registry();

        let token = CancellationToken::new();
        let handle = HealthMonitor::new(&sup).spawn(token.clone());

        tokio::time::sleep(Duration::from_millis(4500)).await;
        settle().await;
        let status = |r: &WorkspaceRegistry| r.get("shop").unwrap().app("api").unwrap().status;
        assert_eq!(status(&*registry.read().await), AppStatus::Running);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        settle().await;
        assert_eq!(status(&*registry.read().await), AppStatus::Dead);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_does_not_stop_the_loop() {
        let start = Utc::now();
        let base = tokio::time::Instant::now();
        let sup = ProcessSupervisor::new(
            Arc::new(StaticResolver(fixture())),
            Arc::new(FakeLauncher::default()),
            Settings::default(),
            Bus::new(16),
        )
        .with_clock(move || {
            let elapsed = tokio::time::Instant::now() - base;
            if (Duration::from_millis(900)..Duration::from_millis(1100)).contains(&elapsed) {
                panic!("clock failed");
            }
            start + TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::zero())
        });
        sup.ping("shop", "api", Some(Path::new("/ws")), 77).await.unwrap();
        let registry = sup.registry();

        let token = CancellationToken::new();
        let handle = HealthMonitor::new(&sup).spawn(token.clone());

        tokio::time::sleep(Duration::from_millis(6500)).await;
        settle().await;
        let work = registry.read().await;
        assert_eq!(work.get("shop").unwrap().app("api").unwrap().status, AppStatus::Dead);
        drop(work);
        assert!(!handle.is_finished());

        token.cancel();
        handle.await.unwrap();
    }
}
