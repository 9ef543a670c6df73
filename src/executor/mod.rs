//! # Bounded-concurrency executor.
//!
//! Drives a lazy (possibly infinite) sequence of task factories with at most
//! `limit` futures in flight.
//!
//! ```text
//! tasks ──pull──► [slot 1] [slot 2] … [slot N]
//!                    │ settle (ok | err, err logged and dropped)
//!                    ▼
//!              terminate()? ── yes ──► stop pulling, drain in-flight
//!                    │ no
//!                    ▼
//!                 pull next
//! ```
//!
//! ## Rules
//! - Tasks are pulled in order and started eagerly up to the limit.
//! - `terminate` is checked before every pull and after every settlement.
//! - The call resolves once the sequence is exhausted (or terminated) and
//!   nothing is in flight.
//! - Results are not aggregated; callers capture them in their closures.

use std::fmt::Display;
use std::future::Future;

use futures::StreamExt;
use futures::stream::FuturesUnordered;

/// Runs every task with at most `limit` in flight.
pub async fn run_bounded<I, F, Fut, T, E>(tasks: I, limit: usize)
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    run_bounded_until(tasks, limit, || false).await
}

/// Like [`run_bounded`], but stops pulling new tasks once `terminate` returns `true`.
///
/// `limit = 0` is treated as 1.
pub async fn run_bounded_until<I, F, Fut, T, E>(tasks: I, limit: usize, terminate: impl Fn() -> bool)
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let limit = limit.max(1);
    let mut source = tasks.into_iter();
    let mut in_flight = FuturesUnordered::new();
    let mut exhausted = false;

    loop {
        while !exhausted && in_flight.len() < limit && !terminate() {
            match source.next() {
                Some(task) => in_flight.push(task()),
                None => exhausted = true,
            }
        }

        match in_flight.next().await {
            Some(Ok(_)) => {}
            Some(Err(e)) => tracing::debug!(error = %e, "bounded task failed"),
            None => break,
        }

        if terminate() {
            exhausted = true;
        }
    }
}
