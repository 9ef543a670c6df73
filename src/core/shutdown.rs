//! # OS signal handling for `dm server run`.
//!
//! ## Signals
//! **Unix:** `SIGINT` (Ctrl-C), `SIGTERM` (what `kill` sends), `SIGQUIT`.
//!
//! **Windows:** `Ctrl-C` via [`tokio::signal::ctrl_c`].

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};

/// Completes when the process receives a termination signal.
///
/// Returns `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Completes when the process receives Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Cancels `token` on the first termination signal and publishes
/// `ShutdownRequested`.
///
/// The watcher exits quietly when `token` is cancelled by someone else first.
pub fn cancel_on_signal(token: CancellationToken, bus: Bus) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            res = wait_for_shutdown_signal() => {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "signal registration failed; only /api/shutdown can stop the server");
                    token.cancelled().await;
                    return;
                }
                bus.publish(Event::new(EventKind::ShutdownRequested).with_reason("signal"));
                token.cancel();
            }
        }
    })
}
