//! # HTTP control API.
//!
//! ```text
//! TcpListener(127.0.0.1:port)
//!   └─ axum::serve(router)
//!        └─ request_scope (RequestContext + BEGIN/END/ERROR log)
//!             └─ JsonBody / Json extraction ─► handler ─► ProcessSupervisor ─► Reply | ApiError
//!
//! alongside, until the shutdown token fires:
//!   HealthMonitor::run       (sweeps the same registry)
//!   SubscriberSet::listen    (Bus → LogWriter)
//!   cancel_on_signal         (SIGINT/SIGTERM/SIGQUIT → token)
//! ```
//!
//! | Method | Path                         | Reply              |
//! |--------|------------------------------|--------------------|
//! | GET    | `/api/alive`                 | `"ALIVE"`          |
//! | POST   | `/api/shutdown`              | empty              |
//! | POST   | `/api/start`                 | app projections    |
//! | POST   | `/api/restart`, `/api/stop`  | empty              |
//! | POST   | `/api/enable`                | empty              |
//! | GET    | `/api/list?cwd=`             | app projections    |
//! | GET    | `/api/app/{name}?cwd=`       | one app projection |
//! | GET    | `/api/app/{name}/log?cwd=`   | log file attachment|
//! | POST   | `/api/{workspace}/{app}/ping`| empty              |

mod body;
mod handlers;
mod middleware;
mod reply;

pub use reply::{ApiError, Reply};

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::{FsConfigResolver, Settings};
use crate::core::{CommandLauncher, HealthMonitor, ProcessSupervisor, cancel_on_signal};
use crate::error::DmError;
use crate::events::Bus;
use crate::subscribers::{LogWriter, Subscribe, SubscriberSet};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<ProcessSupervisor>,
    /// Cancelled (after `shutdown_delay`) by `/api/shutdown`.
    pub shutdown: CancellationToken,
}

/// Builds the `/api` router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/alive", get(handlers::alive))
        .route("/api/shutdown", post(handlers::shutdown))
        .route("/api/start", post(handlers::start))
        .route("/api/restart", post(handlers::restart))
        .route("/api/stop", post(handlers::stop))
        .route("/api/enable", post(handlers::enable))
        .route("/api/list", get(handlers::list))
        .route("/api/app/{name}", get(handlers::app))
        .route("/api/app/{name}/log", get(handlers::log))
        .route("/api/{workspace}/{app}/ping", post(handlers::ping))
        .layer(axum::middleware::from_fn(middleware::request_scope))
        .with_state(state)
}

/// Serves the API on `listener` until `token` is cancelled.
///
/// The health monitor runs for exactly as long as the server does.
pub async fn serve(
    listener: TcpListener,
    supervisor: Arc<ProcessSupervisor>,
    token: CancellationToken,
) -> Result<(), DmError> {
    let monitor = HealthMonitor::new(&supervisor).spawn(token.child_token());
    let app = router(AppState {
        supervisor,
        shutdown: token.clone(),
    });

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "control server listening");
    }
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(token.clone().cancelled_owned())
        .await;

    token.cancel();
    if let Err(e) = monitor.await {
        tracing::warn!(error = %e, "health monitor task failed");
    }
    served.map_err(DmError::from)
}

/// Runs the production server: real launcher, on-disk config, signal
/// handling, and the lifecycle log writer.
pub async fn run(settings: Settings) -> Result<(), DmError> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, settings.port));
    let listener = TcpListener::bind(addr).await?;

    let bus = Bus::new(settings.bus_capacity_clamped());
    let token = CancellationToken::new();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let listener_task = SubscriberSet::new(subs, bus.clone()).listen(token.clone());
    let signals = cancel_on_signal(token.clone(), bus.clone());

    let supervisor = Arc::new(ProcessSupervisor::new(
        Arc::new(FsConfigResolver::new()),
        Arc::new(CommandLauncher::new()),
        settings,
        bus,
    ));
    let result = serve(listener, supervisor, token).await;

    signals.abort();
    let _ = listener_task.await;
    tracing::info!("control server stopped");
    result
}
