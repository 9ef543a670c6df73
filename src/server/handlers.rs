//! Route handlers. Each one maps a request onto one [`ProcessSupervisor`]
//! operation and wraps the outcome in a [`Reply`].
//!
//! [`ProcessSupervisor`]: crate::core::ProcessSupervisor

use std::io;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};

use crate::dto::{CwdQuery, EnableRequest, PingRequest, StartRequest, require_cwd};
use crate::error::DmError;
use crate::events::{Event, EventKind};
use crate::server::AppState;
use crate::server::body::{JsonBody, invalid_body};
use crate::server::reply::{ApiError, Reply};

type ApiResult = Result<Reply, ApiError>;

pub async fn alive() -> Reply {
    Reply::Text("ALIVE".to_string())
}

pub async fn shutdown(State(state): State<AppState>) -> Reply {
    let delay = state.supervisor.settings().shutdown_delay;
    tracing::info!(delay_ms = delay.as_millis() as u64, "shutdown requested");
    state
        .supervisor
        .bus()
        .publish(Event::new(EventKind::ShutdownRequested).with_reason("api"));

    let token = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    });
    Reply::Empty
}

pub async fn start(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<StartRequest>,
) -> ApiResult {
    let cwd = require_cwd(req.cwd)?;
    let apps = state.supervisor.start(&cwd, req.names.as_deref()).await?;
    Ok(Reply::json(&apps)?)
}

pub async fn restart(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<StartRequest>,
) -> ApiResult {
    let cwd = require_cwd(req.cwd)?;
    state.supervisor.restart(&cwd, req.names.as_deref()).await?;
    Ok(Reply::Empty)
}

pub async fn stop(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<StartRequest>,
) -> ApiResult {
    let cwd = require_cwd(req.cwd)?;
    state.supervisor.stop(&cwd, req.names.as_deref()).await?;
    Ok(Reply::Empty)
}

pub async fn enable(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<EnableRequest>,
) -> ApiResult {
    let cwd = require_cwd(req.cwd)?;
    state
        .supervisor
        .enable(&cwd, req.names.as_deref(), req.enable)
        .await?;
    Ok(Reply::Empty)
}

pub async fn list(State(state): State<AppState>, Query(query): Query<CwdQuery>) -> ApiResult {
    let cwd = require_cwd(query.cwd)?;
    let apps = state.supervisor.list(&cwd).await?;
    Ok(Reply::json(&apps)?)
}

pub async fn app(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<CwdQuery>,
) -> ApiResult {
    let cwd = require_cwd(query.cwd)?;
    let app = state.supervisor.app(&cwd, &name).await?;
    Ok(Reply::json(&app)?)
}

pub async fn log(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<CwdQuery>,
) -> ApiResult {
    let cwd = require_cwd(query.cwd)?;
    let path = state.supervisor.log_file(&cwd, &name).await?;
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            DmError::NotFound(format!("Log file {} does not exist", path.display()))
        }
        _ => DmError::Io(e),
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{name}.log"));
    Ok(Reply::File { name, bytes })
}

pub async fn ping(
    State(state): State<AppState>,
    Path((workspace, app)): Path<(String, String)>,
    payload: Result<Json<PingRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload.map_err(invalid_body)?;
    state
        .supervisor
        .ping(&workspace, &app, req.cwd.as_deref(), req.pid)
        .await?;
    Ok(Reply::Empty)
}
