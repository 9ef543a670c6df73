//! In-memory launcher and resolver for unit tests.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::oneshot;

use crate::config::{AppConfig, ConfigResolver, WorkspaceConfig};
use crate::core::launcher::{LaunchedProcess, Launcher};
use crate::error::DmError;

/// Workspace "shop" with apps `api`, `worker` and the disabled `mailer`.
pub(crate) fn fixture() -> WorkspaceConfig {
    let json = r#"{
        "name": "shop",
        "projects": [
            { "name": "core", "apps": [
                { "name": "api", "main": "main.js", "log": "logs/${PID}.log" },
                { "name": "worker", "main": "main.js" }
            ] },
            { "name": "extras", "apps": [ { "name": "mailer", "main": "main.js", "disabled": true } ] }
        ]
    }"#;
    WorkspaceConfig::parse(json, Path::new("/ws/dm.conf"), Path::new("/ws")).expect("fixture parses")
}

/// Lets spawned watcher tasks run to completion.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub(crate) struct StaticResolver(pub WorkspaceConfig);

#[async_trait]
impl ConfigResolver for StaticResolver {
    async fn load(&self, _dir: &Path) -> Result<WorkspaceConfig, DmError> {
        Ok(self.0.clone())
    }
}

/// Hands out pids from 100 upward; a signalled pid exits immediately.
#[derive(Default)]
pub(crate) struct FakeLauncher {
    next_pid: AtomicU32,
    launched: AtomicUsize,
    fail: AtomicBool,
    exits: Mutex<HashMap<u32, oneshot::Sender<Option<i32>>>>,
    signalled: Mutex<Vec<u32>>,
}

impl FakeLauncher {
    pub(crate) fn launches(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub(crate) fn signalled(&self) -> Vec<u32> {
        self.signalled.lock().unwrap().clone()
    }

    pub(crate) fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Makes `pid` exit with `code`.
    pub(crate) fn exit(&self, pid: u32, code: Option<i32>) {
        if let Some(tx) = self.exits.lock().unwrap().remove(&pid) {
            let _ = tx.send(code);
        }
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, _app: &AppConfig, _runtime: &str) -> io::Result<LaunchedProcess> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "runtime not found"));
        }
        self.launched.fetch_add(1, Ordering::SeqCst);
        let pid = 100 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.exits.lock().unwrap().insert(pid, tx);
        Ok(LaunchedProcess {
            pid,
            exit: async move { Ok(rx.await.unwrap_or(None)) }.boxed(),
        })
    }

    fn signal(&self, pid: u32) -> io::Result<()> {
        self.signalled.lock().unwrap().push(pid);
        self.exit(pid, None);
        Ok(())
    }
}
