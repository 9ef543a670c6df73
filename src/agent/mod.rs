//! # Heartbeat agent.
//!
//! Runs inside a managed app (or next to it) and keeps its `AppRuntime`
//! alive on the server:
//!
//! ```text
//! ping ─► sleep(period) ─► ping ─► sleep(period) ─► …   until token.cancelled()
//! ```
//!
//! ## Rules
//! - The first ping is sent immediately.
//! - A failed ping is logged and the loop goes on.

use std::path::PathBuf;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::DmClient;

/// Default interval between heartbeats.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(1000);

/// Counters returned when the agent stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AgentStats {
    pub sent: u64,
    pub failed: u64,
}

/// Periodic pinger for one app.
#[derive(Debug, Clone)]
pub struct HeartbeatAgent {
    client: DmClient,
    workspace: String,
    app: String,
    cwd: Option<PathBuf>,
    pid: u32,
    period: Duration,
}

impl HeartbeatAgent {
    /// Agent reporting the current process id.
    pub fn new(client: DmClient, workspace: impl Into<String>, app: impl Into<String>) -> Self {
        Self {
            client,
            workspace: workspace.into(),
            app: app.into(),
            cwd: None,
            pid: std::process::id(),
            period: DEFAULT_PERIOD,
        }
    }

    /// Lets the server load the workspace from `cwd` if it has not seen it yet.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    async fn beat(&self, stats: &mut AgentStats) {
        match self
            .client
            .ping(&self.workspace, &self.app, self.cwd.as_deref(), self.pid)
            .await
        {
            Ok(()) => stats.sent += 1,
            Err(e) => {
                stats.failed += 1;
                tracing::warn!(workspace = %self.workspace, app = %self.app, error = %e, "heartbeat failed");
            }
        }
    }

    /// Pings until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) -> AgentStats {
        let mut stats = AgentStats::default();
        loop {
            self.beat(&mut stats).await;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.period) => {}
            }
        }
        tracing::debug!(app = %self.app, sent = stats.sent, failed = stats.failed, "heartbeat agent stopped");
        stats
    }

    pub fn spawn(self, token: CancellationToken) -> JoinHandle<AgentStats> {
        tokio::spawn(self.run(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failures_are_counted_and_cancel_stops_the_loop() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = DmClient::new(format!("http://127.0.0.1:{port}/api")).unwrap();
        let token = CancellationToken::new();
        let handle = HeartbeatAgent::new(client, "shop", "api")
            .with_period(Duration::from_millis(10))
            .spawn(token.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        let stats = handle.await.unwrap();
        assert_eq!(stats.sent, 0);
        assert!(stats.failed >= 2);
    }
}
