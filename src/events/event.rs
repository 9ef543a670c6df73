//! # Lifecycle events emitted by the supervisor.
//!
//! [`EventKind`] classifies what happened; [`Event`] carries the metadata:
//! which workspace and app, which pid, why, and within which request.
//!
//! ## Ordering guarantees
//! Each event has a globally unique, monotonically increasing `seq`.
//!
//! ## Example
//! ```rust
//! use devmanager::events::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::AppKilled)
//!     .with_workspace("shop")
//!     .with_app("api")
//!     .with_pid(4242)
//!     .with_reason("exit code 1");
//!
//! assert_eq!(ev.kind, EventKind::AppKilled);
//! assert_eq!(ev.app.as_deref(), Some("api"));
//! assert_eq!(ev.pid, Some(4242));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::context;

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === App lifecycle ===
    /// Process spawned.
    ///
    /// Sets: `workspace`, `app`, `pid`.
    AppStarted,

    /// Explicit stop; the pid is being signalled.
    ///
    /// Sets: `workspace`, `app`, `pid`.
    AppStopped,

    /// Process exited without being asked to.
    ///
    /// Sets: `workspace`, `app`, `pid`, `reason` (exit status).
    AppKilled,

    /// App switched to `Disabled`.
    ///
    /// Sets: `workspace`, `app`.
    AppDisabled,

    /// App switched from `Disabled` back to `None`.
    ///
    /// Sets: `workspace`, `app`.
    AppEnabled,

    /// Heartbeat older than the dead threshold.
    ///
    /// Sets: `workspace`, `app`, `pid`.
    AppDead,

    /// The launcher failed to spawn the process.
    ///
    /// Sets: `workspace`, `app`, `reason`.
    SpawnFailed,

    // === Heartbeats ===
    /// A ping was dropped (app disabled or inside the grace window).
    ///
    /// Sets: `workspace`, `app`, `pid`, `reason`.
    PingIgnored,

    /// A ping moved an app back to `Running` from another status.
    ///
    /// Sets: `workspace`, `app`, `pid`, `reason` (previous status).
    HeartbeatRestored,

    // === Server ===
    /// Shutdown requested (signal or `/api/shutdown`).
    ShutdownRequested,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or closed).
    ///
    /// Sets: `app` (subscriber name), `reason`.
    SubscriberOverflow,

    /// Subscriber panicked while handling an event.
    ///
    /// Sets: `app` (subscriber name), `reason` (panic message).
    SubscriberPanicked,
}

impl EventKind {
    /// Short kebab-case tag used by log output.
    pub fn as_tag(self) -> &'static str {
        match self {
            EventKind::AppStarted => "started",
            EventKind::AppStopped => "stopped",
            EventKind::AppKilled => "killed",
            EventKind::AppDisabled => "disabled",
            EventKind::AppEnabled => "enabled",
            EventKind::AppDead => "dead",
            EventKind::SpawnFailed => "spawn-failed",
            EventKind::PingIgnored => "ping-ignored",
            EventKind::HeartbeatRestored => "heartbeat-restored",
            EventKind::ShutdownRequested => "shutdown-requested",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::SubscriberPanicked => "subscriber-panicked",
        }
    }
}

/// Lifecycle event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Correlation id of the request that caused the event (0 for timers/signals).
    pub req_id: u64,
    pub kind: EventKind,
    pub workspace: Option<Arc<str>>,
    /// App name, or the subscriber name for subscriber events.
    pub app: Option<Arc<str>>,
    pub pid: Option<u32>,
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// New event stamped with the next sequence number, the current time and
    /// the enclosing request id.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            req_id: context::current_id(),
            kind,
            workspace: None,
            app: None,
            pid: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_workspace(mut self, name: impl Into<Arc<str>>) -> Self {
        self.workspace = Some(name.into());
        self
    }

    #[inline]
    pub fn with_app(mut self, name: impl Into<Arc<str>>) -> Self {
        self.app = Some(name.into());
        self
    }

    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches the pid when one is known.
    #[inline]
    pub fn with_pid_opt(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_app(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_app(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}
