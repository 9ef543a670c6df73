//! # Launcher port: how app processes are spawned and signalled.
//!
//! The supervisor never touches `std::process` directly. It asks a
//! [`Launcher`] for a [`LaunchedProcess`] (pid + exit future) and later asks
//! it to signal that pid. [`CommandLauncher`] is the real implementation;
//! tests plug in fakes.
//!
//! ## Rules
//! - `launch` and `signal` are synchronous so they can run inside the
//!   registry's write-guard scope.
//! - The exit future resolves with the exit code (`None` when killed by a signal).
//! - Spawned processes are detached: their own process group, null stdio, and
//!   they survive the supervisor.

use std::io;
use std::process::Stdio;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::process::Command;

use crate::config::AppConfig;

/// A freshly spawned process.
pub struct LaunchedProcess {
    pub pid: u32,
    /// Resolves when the process exits.
    pub exit: BoxFuture<'static, io::Result<Option<i32>>>,
}

impl std::fmt::Debug for LaunchedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedProcess").field("pid", &self.pid).finish()
    }
}

/// Spawns and signals app processes.
pub trait Launcher: Send + Sync + 'static {
    /// Starts `runtime main args...` in the app's `cwd`.
    fn launch(&self, app: &AppConfig, runtime: &str) -> io::Result<LaunchedProcess>;

    /// Asks `pid` to terminate (SIGTERM on unix).
    fn signal(&self, pid: u32) -> io::Result<()>;
}

/// [`Launcher`] backed by `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct CommandLauncher;

impl CommandLauncher {
    pub fn new() -> Self {
        Self
    }
}

/// Builds the command line for `app` without spawning it.
///
/// Stdio is left at the caller's choice; `dm run` inherits it, the launcher nulls it.
pub fn app_command(app: &AppConfig, runtime: &str) -> io::Result<Command> {
    if app.main.as_os_str().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("app {} has no main entry", app.name),
        ));
    }
    let mut cmd = Command::new(runtime);
    cmd.arg(&app.main).args(&app.args);
    if !app.cwd.as_os_str().is_empty() {
        cmd.current_dir(&app.cwd);
    }
    Ok(cmd)
}

impl Launcher for CommandLauncher {
    fn launch(&self, app: &AppConfig, runtime: &str) -> io::Result<LaunchedProcess> {
        let mut cmd = app_command(app, runtime)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("process exited before reporting a pid"))?;

        tracing::debug!(app = %app.name, pid, runtime, "process spawned");
        let exit = async move { child.wait().await.map(|status| status.code()) }.boxed();
        Ok(LaunchedProcess { pid, exit })
    }

    #[cfg(unix)]
    fn signal(&self, pid: u32) -> io::Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid).map_err(|_| io::Error::other(format!("invalid pid {pid}")))?;
        kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn signal(&self, pid: u32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot signal pid {pid} on this platform"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_main_is_rejected() {
        let app = AppConfig {
            name: "api".into(),
            ..AppConfig::default()
        };
        let err = app_command(&app, "node").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("main.sh");
        std::fs::write(&script, "exit 3\n").unwrap();

        let app = AppConfig {
            name: "sh".into(),
            main: script,
            cwd: dir.path().to_path_buf(),
            ..AppConfig::default()
        };
        let proc = CommandLauncher::new().launch(&app, "sh").unwrap();
        assert!(proc.pid > 0);
        assert_eq!(proc.exit.await.unwrap(), Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_failure_surfaces_io_error() {
        let app = AppConfig {
            name: "ghost".into(),
            main: "main.js".into(),
            ..AppConfig::default()
        };
        assert!(CommandLauncher::new().launch(&app, "/definitely/not/a/runtime").is_err());
    }
}
