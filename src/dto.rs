//! Wire types shared by the HTTP server and the client.
//!
//! All payloads are JSON with camelCase field names.

use std::path::PathBuf;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::core::{AppRuntime, AppStatus, ColorTag};
use crate::error::DmError;

/// Projection of an [`AppRuntime`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDto {
    pub name: String,
    pub status: AppStatus,
    pub pid: Option<u32>,
    pub error: Option<String>,
    pub port: Option<u16>,
    /// Local wall-clock time of the last heartbeat, `HH:MM:SS`.
    pub last_heartbeat: Option<String>,
    pub color: ColorTag,
    pub config: AppConfigDto,
}

/// The subset of [`AppConfig`] exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfigDto {
    pub name: String,
    pub main: String,
    pub cwd: String,
    pub args: Vec<String>,
    pub log: Option<String>,
}

impl From<&AppConfig> for AppConfigDto {
    fn from(c: &AppConfig) -> Self {
        Self {
            name: c.name.clone(),
            main: c.main.display().to_string(),
            cwd: c.cwd.display().to_string(),
            args: c.args.clone(),
            log: c.log.clone(),
        }
    }
}

impl From<&AppRuntime> for AppDto {
    fn from(app: &AppRuntime) -> Self {
        Self {
            name: app.name.clone(),
            status: app.status,
            pid: app.pid,
            error: app.error.clone(),
            port: app.port,
            last_heartbeat: app
                .last_heartbeat
                .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string()),
            color: app.color,
            config: AppConfigDto::from(app.config.as_ref()),
        }
    }
}

/// Body of `/api/start`, `/api/stop` and `/api/restart`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub cwd: Option<PathBuf>,
    /// `None` selects every app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
}

/// Body of `/api/enable`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableRequest {
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
    pub enable: bool,
}

/// Body of `/api/{workspace}/{app}/ping`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    pub pid: u32,
}

/// `?cwd=` query of the read-only routes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CwdQuery {
    pub cwd: Option<PathBuf>,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub message: String,
    pub error_code: u16,
}

impl From<&DmError> for ErrorEnvelope {
    fn from(err: &DmError) -> Self {
        Self {
            message: err.to_string(),
            error_code: err.error_code().as_u16(),
        }
    }
}

/// Extracts `cwd` or fails with the user-facing message.
pub fn require_cwd(cwd: Option<PathBuf>) -> Result<PathBuf, DmError> {
    cwd.filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| DmError::user("Missing cwd parameter"))
}
