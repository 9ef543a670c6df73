//! # Client proxy for the control API.
//!
//! [`DmClient`] mirrors every server route. Transport failures are folded into
//! [`DmError`]:
//!
//! ```text
//! connect refused / timeout   → DmError::ServerUnavailable
//! non-2xx + {message, errorCode} → DmError::Remote { status, message, code }
//! non-2xx without envelope    → DmError::Remote { status, message: body, code: 1 }
//! ```

use std::path::Path;
use std::time::Duration;

use reqwest::{Method, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::Settings;
use crate::dto::{AppDto, EnableRequest, ErrorEnvelope, PingRequest, StartRequest};
use crate::error::{DmError, ErrorCode};

/// HTTP client bound to one control server.
#[derive(Debug, Clone)]
pub struct DmClient {
    http: reqwest::Client,
    base: String,
}

impl DmClient {
    /// Client for `base`, e.g. `http://127.0.0.1:7070/api`.
    pub fn new(base: impl Into<String>) -> Result<Self, DmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| DmError::internal(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Client for the server described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, DmError> {
        Self::new(settings.api_base())
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `true` when the server answers `/alive`.
    pub async fn is_alive(&self) -> bool {
        match self.send(Method::GET, "/alive", None::<&()>, &[]).await {
            Ok(resp) => resp.text().await.is_ok_and(|t| t == "ALIVE"),
            Err(_) => false,
        }
    }

    pub async fn shutdown(&self) -> Result<(), DmError> {
        self.send(Method::POST, "/shutdown", None::<&()>, &[]).await?;
        Ok(())
    }

    pub async fn start(&self, cwd: &Path, names: Option<&[String]>) -> Result<Vec<AppDto>, DmError> {
        let body = start_body(cwd, names);
        json(self.send(Method::POST, "/start", Some(&body), &[]).await?).await
    }

    pub async fn restart(&self, cwd: &Path, names: Option<&[String]>) -> Result<(), DmError> {
        let body = start_body(cwd, names);
        self.send(Method::POST, "/restart", Some(&body), &[]).await?;
        Ok(())
    }

    pub async fn stop(&self, cwd: &Path, names: Option<&[String]>) -> Result<(), DmError> {
        let body = start_body(cwd, names);
        self.send(Method::POST, "/stop", Some(&body), &[]).await?;
        Ok(())
    }

    pub async fn enable(
        &self,
        cwd: &Path,
        names: Option<&[String]>,
        enable: bool,
    ) -> Result<(), DmError> {
        let body = EnableRequest {
            cwd: Some(cwd.to_path_buf()),
            names: names.map(<[String]>::to_vec),
            enable,
        };
        self.send(Method::POST, "/enable", Some(&body), &[]).await?;
        Ok(())
    }

    pub async fn list(&self, cwd: &Path) -> Result<Vec<AppDto>, DmError> {
        let query = cwd_query(cwd);
        json(self.send(Method::GET, "/list", None::<&()>, &query).await?).await
    }

    pub async fn app(&self, cwd: &Path, name: &str) -> Result<AppDto, DmError> {
        let query = cwd_query(cwd);
        let path = format!("/app/{name}");
        json(self.send(Method::GET, &path, None::<&()>, &query).await?).await
    }

    /// Downloads the app's current log file.
    pub async fn log(&self, cwd: &Path, name: &str) -> Result<Vec<u8>, DmError> {
        let query = cwd_query(cwd);
        let path = format!("/app/{name}/log");
        let resp = self.send(Method::GET, &path, None::<&()>, &query).await?;
        let bytes = resp.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }

    /// Reports a heartbeat of `app` running as `pid`.
    pub async fn ping(
        &self,
        workspace: &str,
        app: &str,
        cwd: Option<&Path>,
        pid: u32,
    ) -> Result<(), DmError> {
        let body = PingRequest {
            cwd: cwd.map(Path::to_path_buf),
            pid,
        };
        let path = format!("/{workspace}/{app}/ping");
        self.send(Method::POST, &path, Some(&body), &[]).await?;
        Ok(())
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        query: &[(&str, String)],
    ) -> Result<Response, DmError> {
        let mut url = reqwest::Url::parse(&format!("{}{}", self.base, path))
            .map_err(|e| DmError::user(format!("invalid server url {}: {e}", self.base)))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        tracing::debug!(%method, %url, "request");

        let mut req = self.http.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(transport)?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        Err(remote(resp).await)
    }
}

fn start_body(cwd: &Path, names: Option<&[String]>) -> StartRequest {
    StartRequest {
        cwd: Some(cwd.to_path_buf()),
        names: names.map(<[String]>::to_vec),
    }
}

fn cwd_query(cwd: &Path) -> [(&'static str, String); 1] {
    [("cwd", cwd.display().to_string())]
}

async fn json<T: DeserializeOwned>(resp: Response) -> Result<T, DmError> {
    resp.json::<T>()
        .await
        .map_err(|e| DmError::internal(format!("malformed server reply: {e}")))
}

fn transport(err: reqwest::Error) -> DmError {
    if err.is_connect() || err.is_timeout() {
        DmError::ServerUnavailable
    } else {
        DmError::internal(format!("http error: {err}"))
    }
}

async fn remote(resp: Response) -> DmError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(env) => DmError::Remote {
            status,
            message: env.message,
            code: ErrorCode::from_u16(env.error_code),
        },
        Err(_) => DmError::Remote {
            status,
            message: text,
            code: ErrorCode::InternalServerError,
        },
    }
}
