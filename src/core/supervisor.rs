//! # ProcessSupervisor: the app state-machine engine.
//!
//! The supervisor resolves a control request to a workspace, then applies
//! start/stop/restart/enable/ping to the selected apps. Processes are spawned
//! and signalled through the [`Launcher`] port; each spawn gets a watcher task
//! that feeds the exit back into the registry.
//!
//! ```text
//! request(cwd, names)
//!   └─► ConfigResolver::load(cwd)           (await, no lock held)
//!   └─► registry.write(): get_or_insert      → workspace key
//!   └─► for each app:
//!         registry.write()                   ← one critical section per app
//!           ├─ AppRuntime transition
//!           ├─ Launcher::launch / signal     (sync)
//!           └─ Bus.publish(Event)
//!
//! exit watcher (one per spawn):
//!   exit.await ─► registry.write(): on_exit(generation) ─► AppKilled | ignored
//! ```
//!
//! ## Rules
//! - Every transition of one app happens inside one write-guard scope that
//!   never awaits foreign work.
//! - A failure of one app is captured into its `error`; siblings still run.
//! - Unknown app names fail the whole request before anything changes.
//! - `restart` is stop-all, wait `restart_delay`, start-all; not atomic.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::config::{ConfigResolver, Settings, WorkspaceConfig, resolve_app_names};
use crate::context;
use crate::core::app::{AppRuntime, AppStatus, ExitOutcome, PingOutcome, ProcessHandle};
use crate::core::launcher::Launcher;
use crate::core::registry::WorkspaceRegistry;
use crate::dto::AppDto;
use crate::error::DmError;
use crate::events::{Bus, Event, EventKind};

/// Per-app failure recorded into the app's `error` field.
fn operation_error(app: &str, err: &std::io::Error) -> DmError {
    DmError::Operation {
        app: app.to_string(),
        reason: err.to_string(),
    }
}

/// Source of "now" for every transition.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Applies control operations to the shared registry.
pub struct ProcessSupervisor {
    registry: Arc<RwLock<WorkspaceRegistry>>,
    resolver: Arc<dyn ConfigResolver>,
    launcher: Arc<dyn Launcher>,
    settings: Settings,
    bus: Bus,
    clock: Clock,
    generation: AtomicU64,
}

impl ProcessSupervisor {
    pub fn new(
        resolver: Arc<dyn ConfigResolver>,
        launcher: Arc<dyn Launcher>,
        settings: Settings,
        bus: Bus,
    ) -> Self {
        Self {
            registry: Arc::new(RwLock::new(WorkspaceRegistry::new())),
            resolver,
            launcher,
            settings,
            bus,
            clock: Arc::new(Utc::now),
            generation: AtomicU64::new(0),
        }
    }

    /// Replaces the wall clock (tests).
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Shared registry handle (for the health monitor).
    pub fn registry(&self) -> Arc<RwLock<WorkspaceRegistry>> {
        Arc::clone(&self.registry)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn clock(&self) -> Clock {
        Arc::clone(&self.clock)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Loads the config governing `cwd` and registers its workspace.
    pub async fn load(&self, cwd: &Path) -> Result<(String, Arc<WorkspaceConfig>), DmError> {
        let config = self.resolver.load(cwd).await?;
        let mut reg = self.registry.write().await;
        let key = reg.get_or_insert(config);
        let config = reg
            .get(&key)
            .map(|w| Arc::clone(&w.config))
            .ok_or_else(|| DmError::internal(format!("workspace {key} vanished")))?;
        Ok((key, config))
    }

    async fn select(
        &self,
        cwd: &Path,
        names: Option<&[String]>,
    ) -> Result<(String, Vec<String>), DmError> {
        let (key, config) = self.load(cwd).await?;
        let names = resolve_app_names(&config, names)?;
        for name in &names {
            config.app(name)?;
        }
        Ok((key, names))
    }

    /// Starts the selected apps and returns the workspace listing.
    pub async fn start(&self, cwd: &Path, names: Option<&[String]>) -> Result<Vec<AppDto>, DmError> {
        let (key, names) = self.select(cwd, names).await?;
        tracing::debug!(workspace = %key, ?names, "start");
        self.start_apps(&key, &names).await;
        self.snapshot(&key).await
    }

    /// Stops the selected apps.
    pub async fn stop(&self, cwd: &Path, names: Option<&[String]>) -> Result<(), DmError> {
        let (key, names) = self.select(cwd, names).await?;
        tracing::debug!(workspace = %key, ?names, "stop");
        self.stop_apps(&key, &names).await;
        Ok(())
    }

    /// Stops, waits `restart_delay`, then starts the selected apps.
    pub async fn restart(&self, cwd: &Path, names: Option<&[String]>) -> Result<(), DmError> {
        let (key, names) = self.select(cwd, names).await?;
        tracing::debug!(workspace = %key, ?names, "restart");
        self.stop_apps(&key, &names).await;
        tokio::time::sleep(self.settings.restart_delay).await;
        self.start_apps(&key, &names).await;
        Ok(())
    }

    /// Enables (and starts) or disables (after stopping) the selected apps.
    pub async fn enable(
        &self,
        cwd: &Path,
        names: Option<&[String]>,
        enable: bool,
    ) -> Result<(), DmError> {
        let (key, names) = self.select(cwd, names).await?;
        tracing::debug!(workspace = %key, ?names, enable, "enable");

        for name in &names {
            let mut reg = self.registry.write().await;
            let now = self.now();
            let Some(app) = Self::app_mut(&mut reg, &key, name) else {
                continue;
            };
            if enable {
                if app.enable() {
                    self.bus.publish(app_event(EventKind::AppEnabled, &key, app));
                    self.start_locked(&key, app, now);
                }
            } else {
                self.stop_locked(&key, app, now);
                app.disable();
                self.bus.publish(app_event(EventKind::AppDisabled, &key, app));
            }
        }
        Ok(())
    }

    /// Projection of every app of the workspace governing `cwd`.
    pub async fn list(&self, cwd: &Path) -> Result<Vec<AppDto>, DmError> {
        let (key, _) = self.load(cwd).await?;
        self.snapshot(&key).await
    }

    /// Projection of one app.
    pub async fn app(&self, cwd: &Path, name: &str) -> Result<AppDto, DmError> {
        let (key, _) = self.load(cwd).await?;
        let reg = self.registry.read().await;
        let work = reg
            .get(&key)
            .ok_or_else(|| DmError::NotFound(format!("Workspace {key} was not found")))?;
        Ok(AppDto::from(work.app(name)?))
    }

    /// Resolved log file of one app (`${PID}` substituted).
    pub async fn log_file(&self, cwd: &Path, name: &str) -> Result<PathBuf, DmError> {
        let dto = self.app(cwd, name).await?;
        let template = dto
            .config
            .log
            .ok_or_else(|| DmError::user(format!("App {} has no log file configured", dto.name)))?;
        resolve_log_path(&template, dto.pid)
            .ok_or_else(|| DmError::user(format!("App {} is not running", dto.name)))
    }

    /// Ingests a heartbeat.
    ///
    /// With `cwd`, the workspace is loaded (and registered) from disk; without
    /// it, `workspace` must name an already registered workspace.
    pub async fn ping(
        &self,
        workspace: &str,
        name: &str,
        cwd: Option<&Path>,
        pid: u32,
    ) -> Result<(), DmError> {
        let key = match cwd {
            Some(cwd) => self.load(cwd).await?.0,
            None => {
                let reg = self.registry.read().await;
                reg.find_by_name(workspace)
                    .map(|w| w.key.clone())
                    .ok_or_else(|| DmError::NotFound(format!("Workspace {workspace} was not found")))?
            }
        };

        let mut reg = self.registry.write().await;
        let now = self.now();
        let app = reg.get_or_create_app(&key, name)?;
        match app.ping(pid, now, self.settings.grace_window) {
            PingOutcome::Accepted(AppStatus::Running) => {}
            PingOutcome::Accepted(prev) => {
                self.bus.publish(
                    app_event(EventKind::HeartbeatRestored, &key, app).with_reason(prev.as_str()),
                );
            }
            PingOutcome::IgnoredDisabled => {
                self.bus.publish(
                    app_event(EventKind::PingIgnored, &key, app)
                        .with_pid(pid)
                        .with_reason("disabled"),
                );
            }
            PingOutcome::IgnoredGrace => {
                tracing::debug!(app = %app.name, pid, "ignoring ping inside stop grace window");
                self.bus.publish(
                    app_event(EventKind::PingIgnored, &key, app)
                        .with_pid(pid)
                        .with_reason("grace window"),
                );
            }
        }
        Ok(())
    }

    async fn snapshot(&self, key: &str) -> Result<Vec<AppDto>, DmError> {
        let reg = self.registry.read().await;
        let work = reg
            .get(key)
            .ok_or_else(|| DmError::NotFound(format!("Workspace {key} was not found")))?;
        Ok(work.apps.iter().map(AppDto::from).collect())
    }

    async fn start_apps(&self, key: &str, names: &[String]) {
        for name in names {
            let mut reg = self.registry.write().await;
            let now = self.now();
            if let Some(app) = Self::app_mut(&mut reg, key, name) {
                self.start_locked(key, app, now);
            }
        }
    }

    async fn stop_apps(&self, key: &str, names: &[String]) {
        for name in names {
            let mut reg = self.registry.write().await;
            let now = self.now();
            if let Some(app) = Self::app_mut(&mut reg, key, name) {
                self.stop_locked(key, app, now);
            }
        }
    }

    fn app_mut<'a>(
        reg: &'a mut WorkspaceRegistry,
        key: &str,
        name: &str,
    ) -> Option<&'a mut AppRuntime> {
        match reg.get_or_create_app(key, name) {
            Ok(app) => Some(app),
            Err(e) => {
                tracing::warn!(workspace = %key, app = %name, error = %e, "app lookup failed");
                None
            }
        }
    }

    fn start_locked(&self, key: &str, app: &mut AppRuntime, now: DateTime<Utc>) {
        if app.status == AppStatus::Disabled {
            tracing::debug!(app = %app.name, "not starting disabled app");
            return;
        }
        if !app.can_start() {
            return;
        }

        let config = Arc::clone(&app.config);
        let runtime = config.runtime.as_deref().unwrap_or(&self.settings.runtime);
        match self.launcher.launch(&config, runtime) {
            Ok(proc) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                app.on_spawned(
                    ProcessHandle {
                        pid: proc.pid,
                        generation,
                    },
                    now,
                );
                self.bus.publish(app_event(EventKind::AppStarted, key, app));
                self.watch_exit(key, &app.name, proc.pid, generation, proc.exit);
            }
            Err(e) => {
                let err = operation_error(&app.name, &e);
                tracing::warn!(app = %app.name, error = %e, label = err.as_label(), "spawn failed");
                app.on_spawn_error(err.to_string());
                self.bus
                    .publish(app_event(EventKind::SpawnFailed, key, app).with_reason(e.to_string()));
            }
        }
    }

    fn stop_locked(&self, key: &str, app: &mut AppRuntime, now: DateTime<Utc>) {
        let Some(pid) = app.mark_stopped(now) else {
            return;
        };
        self.bus
            .publish(app_event(EventKind::AppStopped, key, app).with_pid(pid));
        if let Err(e) = self.launcher.signal(pid) {
            let err = operation_error(&app.name, &e);
            tracing::warn!(app = %app.name, pid, error = %e, label = err.as_label(), "signal failed");
            app.on_signal_error(err.to_string());
        }
    }

    fn watch_exit(
        &self,
        key: &str,
        name: &str,
        pid: u32,
        generation: u64,
        exit: BoxFuture<'static, std::io::Result<Option<i32>>>,
    ) {
        let registry = Arc::clone(&self.registry);
        let bus = self.bus.clone();
        let key = key.to_string();
        let name = name.to_string();

        context::spawn(async move {
            let result = exit.await;
            let reason = match &result {
                Ok(Some(code)) => format!("exit code {code}"),
                Ok(None) => "terminated by signal".to_string(),
                Err(e) => e.to_string(),
            };

            let mut reg = registry.write().await;
            let Ok(app) = reg.get_or_create_app(&key, &name) else {
                return;
            };
            match app.on_exit(generation) {
                ExitOutcome::Killed => {
                    if let Err(e) = &result {
                        app.error = Some(operation_error(&name, e).to_string());
                    }
                    bus.publish(
                        Event::new(EventKind::AppKilled)
                            .with_workspace(key.as_str())
                            .with_app(name.as_str())
                            .with_pid(pid)
                            .with_reason(reason),
                    );
                }
                ExitOutcome::Expected => {
                    tracing::debug!(app = %name, pid, %reason, "process exited after stop");
                }
                ExitOutcome::Stale => {
                    tracing::debug!(app = %name, pid, generation, "ignoring exit of superseded process");
                }
            }
        });
    }
}

fn app_event(kind: EventKind, key: &str, app: &AppRuntime) -> Event {
    Event::new(kind)
        .with_workspace(key)
        .with_app(app.name.as_str())
        .with_pid_opt(app.pid)
}

/// Substitutes `${PID}`; `None` when the template needs a pid and there is none.
pub fn resolve_log_path(template: &str, pid: Option<u32>) -> Option<PathBuf> {
    if !template.contains("${PID}") {
        return Some(PathBuf::from(template));
    }
    pid.map(|pid| PathBuf::from(template.replace("${PID}", &pid.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fakes::{FakeLauncher, StaticResolver, fixture, settle};
    use chrono::TimeDelta;
    use std::sync::Mutex;

    struct Harness {
        sup: ProcessSupervisor,
        launcher: Arc<FakeLauncher>,
        now: Arc<Mutex<DateTime<Utc>>>,
    }

    impl Harness {
        fn new() -> Self {
            let launcher = Arc::new(FakeLauncher::default());
            let now = Arc::new(Mutex::new(Utc::now()));
            let clock = Arc::clone(&now);
            let sup = ProcessSupervisor::new(
                Arc::new(StaticResolver(fixture())),
                launcher.clone(),
                Settings::default(),
                Bus::new(64),
            )
            .with_clock(move || *clock.lock().unwrap());
            Self { sup, launcher, now }
        }

        fn advance(&self, ms: i64) {
            *self.now.lock().unwrap() += TimeDelta::milliseconds(ms);
        }

        async fn get(&self, name: &str) -> AppDto {
            self.sup.app(Path::new("/ws"), name).await.unwrap()
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_start_is_noop_while_process_alive() {
        let h = Harness::new();
        let cwd = Path::new("/ws");
        let api = names(&["api"]);

        let listing = h.sup.start(cwd, Some(&api)).await.unwrap();
        let first = listing.iter().find(|a| a.name == "api").unwrap().pid;
        assert!(first.is_some());

        h.sup.start(cwd, Some(&api)).await.unwrap();
        assert_eq!(h.launcher.launches(), 1);
        assert_eq!(h.get("api").await.pid, first);
        assert_eq!(h.get("api").await.status, AppStatus::Running);
    }

    #[tokio::test]
    async fn test_stop_then_late_ping_respects_grace_window() {
        let h = Harness::new();
        let cwd = Path::new("/ws");
        let api = names(&["api"]);

        h.sup.start(cwd, Some(&api)).await.unwrap();
        let pid = h.get("api").await.pid.unwrap();

        h.sup.stop(cwd, Some(&api)).await.unwrap();
        assert_eq!(h.launcher.signalled(), vec![pid]);
        let dto = h.get("api").await;
        assert_eq!(dto.status, AppStatus::Stopped);
        assert_eq!(dto.pid, None);

        h.advance(500);
        h.sup.ping("shop", "api", None, pid).await.unwrap();
        assert_eq!(h.get("api").await.status, AppStatus::Stopped);

        h.advance(1000);
        h.sup.ping("shop", "api", None, 4242).await.unwrap();
        let dto = h.get("api").await;
        assert_eq!(dto.status, AppStatus::Running);
        assert_eq!(dto.pid, Some(4242));
    }

    #[tokio::test]
    async fn test_exit_after_stop_keeps_status_and_unexpected_exit_kills() {
        let h = Harness::new();
        let cwd = Path::new("/ws");
        h.sup.start(cwd, Some(&names(&["api", "worker"]))).await.unwrap();

        h.sup.stop(cwd, Some(&names(&["api"]))).await.unwrap();
        settle().await;
        assert_eq!(h.get("api").await.status, AppStatus::Stopped);

        let mut events = h.sup.bus().subscribe();
        let worker_pid = h.get("worker").await.pid.unwrap();
        h.launcher.exit(worker_pid, Some(1));
        settle().await;

        let dto = h.get("worker").await;
        assert_eq!(dto.status, AppStatus::Killed);
        assert_eq!(dto.pid, None);

        let ev = events.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::AppKilled);
        assert_eq!(ev.reason.as_deref(), Some("exit code 1"));

        h.sup.start(cwd, Some(&names(&["worker"]))).await.unwrap();
        assert_eq!(h.get("worker").await.status, AppStatus::Running);
        assert_eq!(h.launcher.launches(), 3);
    }

    #[tokio::test]
    async fn test_disable_and_enable() {
        let h = Harness::new();
        let cwd = Path::new("/ws");
        let api = names(&["api"]);

        h.sup.start(cwd, Some(&api)).await.unwrap();
        h.sup.enable(cwd, Some(&api), false).await.unwrap();
        settle().await;
        assert_eq!(h.get("api").await.status, AppStatus::Disabled);

        h.sup.start(cwd, Some(&api)).await.unwrap();
        h.sup.ping("shop", "api", None, 7).await.unwrap();
        assert_eq!(h.get("api").await.status, AppStatus::Disabled);
        assert_eq!(h.launcher.launches(), 1);

        h.sup.enable(cwd, Some(&api), true).await.unwrap();
        assert_eq!(h.get("api").await.status, AppStatus::Running);
        assert_eq!(h.launcher.launches(), 2);
    }

    #[tokio::test]
    async fn test_configured_disabled_app_never_starts() {
        let h = Harness::new();
        let listing = h.sup.start(Path::new("/ws"), None).await.unwrap();
        let mailer = listing.iter().find(|a| a.name == "mailer").unwrap();
        assert_eq!(mailer.status, AppStatus::Disabled);
        assert_eq!(h.launcher.launches(), 2);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_captured_per_app() {
        let h = Harness::new();
        h.launcher.fail_next();
        h.sup
            .start(Path::new("/ws"), Some(&names(&["api", "worker"])))
            .await
            .unwrap();

        let api = h.get("api").await;
        assert_eq!(api.status, AppStatus::Killed);
        let error = api.error.unwrap();
        assert!(error.starts_with("api: "), "{error}");
        assert!(error.contains("runtime not found"));
        assert_eq!(h.get("worker").await.status, AppStatus::Running);
    }

    #[tokio::test]
    async fn test_unknown_name_fails_whole_request() {
        let h = Harness::new();
        let err = h
            .sup
            .start(Path::new("/ws"), Some(&names(&["api", "ghost"])))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(h.launcher.launches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_process() {
        let h = Harness::new();
        let cwd = Path::new("/ws");
        let api = names(&["api"]);

        h.sup.start(cwd, Some(&api)).await.unwrap();
        let before = h.get("api").await.pid.unwrap();

        h.sup.restart(cwd, Some(&api)).await.unwrap();
        let after = h.get("api").await;
        assert_eq!(after.status, AppStatus::Running);
        assert_ne!(after.pid, Some(before));
        assert_eq!(h.launcher.launches(), 2);
    }

    #[tokio::test]
    async fn test_ping_without_cwd_needs_known_workspace() {
        let h = Harness::new();
        let err = h.sup.ping("shop", "api", None, 1).await.unwrap_err();
        assert_eq!(err.status_code(), 404);

        h.sup.ping("shop", "api", Some(Path::new("/ws")), 1).await.unwrap();
        assert_eq!(h.get("api").await.status, AppStatus::Running);
    }

    #[tokio::test]
    async fn test_log_file_substitutes_pid() {
        let h = Harness::new();
        let cwd = Path::new("/ws");
        let err = h.sup.log_file(cwd, "api").await.unwrap_err();
        assert!(err.to_string().contains("not running"));

        h.sup.start(cwd, Some(&names(&["api"]))).await.unwrap();
        let pid = h.get("api").await.pid.unwrap();
        let path = h.sup.log_file(cwd, "api").await.unwrap();
        assert_eq!(path, PathBuf::from(format!("/ws/core/api/logs/{pid}.log")));
    }

    #[test]
    fn test_resolve_log_path() {
        assert_eq!(resolve_log_path("/l/a.log", None), Some(PathBuf::from("/l/a.log")));
        assert_eq!(resolve_log_path("/l/${PID}.log", None), None);
        assert_eq!(resolve_log_path("/l/${PID}.log", Some(9)), Some(PathBuf::from("/l/9.log")));
    }
}
