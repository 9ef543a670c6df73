//! # LogWriter
//!
//! Renders lifecycle events through `tracing`, one line per event:
//!
//! ```text
//! INFO  [started] workspace=shop app=api pid=4242
//! WARN  [killed] workspace=shop app=api pid=4242 reason="exit status: 1"
//! WARN  [dead] workspace=shop app=worker pid=4250
//! DEBUG [ping-ignored] workspace=shop app=api pid=4242 reason="grace window"
//! ERROR [subscriber-panicked] subscriber=audit info="boom"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let tag = e.kind.as_tag();
        let workspace = e.workspace.as_deref().unwrap_or("-");
        let app = e.app.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::AppStarted
            | EventKind::AppStopped
            | EventKind::AppEnabled
            | EventKind::AppDisabled
            | EventKind::HeartbeatRestored => {
                tracing::info!(req_id = e.req_id, pid = ?e.pid, reason, "[{tag}] workspace={workspace} app={app}");
            }
            EventKind::AppKilled | EventKind::AppDead | EventKind::SpawnFailed => {
                tracing::warn!(req_id = e.req_id, pid = ?e.pid, reason, "[{tag}] workspace={workspace} app={app}");
            }
            EventKind::PingIgnored => {
                tracing::debug!(req_id = e.req_id, pid = ?e.pid, reason, "[{tag}] workspace={workspace} app={app}");
            }
            EventKind::ShutdownRequested => {
                tracing::info!("[{tag}]");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!("[{tag}] subscriber={app} reason={reason}");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!("[{tag}] subscriber={app} info={reason}");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
