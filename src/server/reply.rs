//! # Handler results and their HTTP rendering.
//!
//! Every handler returns `Result<Reply, ApiError>`; rendering happens in one
//! place:
//!
//! ```text
//! Reply::Json(v)          → 200 application/json
//! Reply::Text(s)          → 200 text/plain
//! Reply::File{name,bytes} → 200 application/octet-stream + Content-Disposition: attachment
//! Reply::Empty            → 204
//! ApiError(e)             → e.status_code() + {"message", "errorCode"}
//! ```

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::dto::ErrorEnvelope;
use crate::error::DmError;

/// Successful handler output.
#[derive(Debug)]
pub enum Reply {
    Json(serde_json::Value),
    Text(String),
    File { name: String, bytes: Vec<u8> },
    Empty,
}

impl Reply {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, DmError> {
        serde_json::to_value(value)
            .map(Reply::Json)
            .map_err(|e| DmError::internal(format!("failed to encode reply: {e}")))
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Json(value) => Json(value).into_response(),
            Reply::Text(text) => text.into_response(),
            Reply::File { name, bytes } => {
                let disposition = format!("attachment; filename=\"{}\"", name.replace('"', ""));
                let mut resp = bytes.into_response();
                let headers = resp.headers_mut();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
                if let Ok(value) = HeaderValue::from_str(&disposition) {
                    headers.insert(header::CONTENT_DISPOSITION, value);
                }
                resp
            }
            Reply::Empty => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// A [`DmError`] crossing the HTTP boundary.
#[derive(Debug)]
pub struct ApiError(pub DmError);

impl From<DmError> for ApiError {
    fn from(err: DmError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(label = self.0.as_label(), error = %self.0, "request failed");
        } else {
            tracing::debug!(label = self.0.as_label(), error = %self.0, "request rejected");
        }
        (status, Json(ErrorEnvelope::from(&self.0))).into_response()
    }
}
