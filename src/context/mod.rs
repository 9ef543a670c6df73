//! # Request-scoped context.
//!
//! [`RequestContext::run`] opens a scope carrying a fresh correlation id.
//! Any code awaited inside the scope, including tasks started through
//! [`spawn`] and continuations resumed after timers, can read the id through
//! [`current_id`] without it being passed around explicitly.
//!
//! ```text
//! RequestContext::run(f)
//!   ├─ id = next id (1, 2, …, 99_999_999, 1, …)
//!   ├─ span "request" { req_id = id }
//!   └─ f().await
//!        ├─ current_id() == id
//!        ├─ sleep(..).await; current_id() == id
//!        └─ context::spawn(g) → g sees id
//! ```
//!
//! ## Rules
//! - Outside any scope, [`current_id`] returns `0`.
//! - Two concurrent scopes never observe each other's id.
//! - A plain `tokio::spawn` does **not** inherit the scope; use [`spawn`].

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::Instrument;

/// Ids wrap back to 1 when they reach this value.
const ID_WRAP: u64 = 100_000_000;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT: Arc<RequestContext>;
}

type Value = Arc<dyn Any + Send + Sync>;

/// State of one logical operation.
pub struct RequestContext {
    id: u64,
    values: Mutex<HashMap<String, Value>>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext").field("id", &self.id).finish()
    }
}

impl RequestContext {
    fn new(id: u64) -> Self {
        Self {
            id,
            values: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `f` inside a new scope and returns its output.
    pub async fn run<F, Fut>(f: F) -> Fut::Output
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let ctx = Arc::new(RequestContext::new(next_id()));
        let span = tracing::info_span!("request", req_id = ctx.id);
        CURRENT.scope(ctx, async move { f().await }.instrument(span)).await
    }

    /// Correlation id of this scope.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.lock().insert(key.into(), Arc::new(value));
    }

    /// Returns the value under `key` if it exists and has type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.lock().get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Removes `key` only while it still holds `expected`.
    ///
    /// Returns `true` when the entry was removed.
    pub fn remove_if<T: Any + Send + Sync + PartialEq>(&self, key: &str, expected: &T) -> bool {
        let mut values = self.lock();
        let matches = values
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .is_some_and(|v| v == expected);
        if matches {
            values.remove(key);
        }
        matches
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.values.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn advance(id: u64) -> u64 {
    if id + 1 >= ID_WRAP { 1 } else { id + 1 }
}

fn next_id() -> u64 {
    match NEXT_ID.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| Some(advance(id))) {
        Ok(id) | Err(id) => id,
    }
}

/// Context of the enclosing scope, if any.
pub fn current() -> Option<Arc<RequestContext>> {
    CURRENT.try_with(Arc::clone).ok()
}

/// Correlation id of the enclosing scope, or `0` outside any scope.
pub fn current_id() -> u64 {
    CURRENT.try_with(|c| c.id).unwrap_or(0)
}

/// Wraps `fut` so that it runs inside the caller's scope (and span).
pub fn bind<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let ctx = current();
    let span = tracing::Span::current();
    async move {
        match ctx {
            Some(ctx) => CURRENT.scope(ctx, fut).await,
            None => fut.await,
        }
    }
    .instrument(span)
}

/// `tokio::spawn` that carries the caller's scope into the new task.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(bind(fut))
}
