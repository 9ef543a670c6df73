//! Request body extraction.
//!
//! Bodies are parsed by axum's [`Json`], content-type check included; every
//! rejection becomes a [`DmError::User`] so it renders as the regular error
//! envelope with a 400.

use axum::Json;
use axum::body::{Body, to_bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::error::DmError;
use crate::server::reply::ApiError;

/// Matches axum's default request body limit.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// JSON body where an empty request body reads as `T::default()`.
///
/// Used by the control routes whose fields are all optional; the CLI posts
/// them without a body when it has nothing to say.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();
        let bytes = to_bytes(body, BODY_LIMIT)
            .await
            .map_err(|e| DmError::user(format!("Invalid request body: {e}")))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }

        let req = Request::from_parts(parts, Body::from(bytes));
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(invalid_body)?;
        Ok(Self(value))
    }
}

/// Maps a rejected [`Json`] extraction onto a user error.
pub fn invalid_body(rejection: JsonRejection) -> DmError {
    DmError::user(format!("Invalid request body: {}", rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::StartRequest;

    async fn extract(body: &'static str) -> Result<StartRequest, ApiError> {
        extract_as("application/json", body).await
    }

    async fn extract_as(content_type: &str, body: &'static str) -> Result<StartRequest, ApiError> {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/api/start")
            .header("content-type", content_type)
            .body(Body::from(body))
            .unwrap();
        JsonBody::<StartRequest>::from_request(req, &()).await.map(|b| b.0)
    }

    #[tokio::test]
    async fn test_empty_body_is_default() {
        let req = extract("  ").await.ok().unwrap();
        assert!(req.cwd.is_none());
        assert!(req.names.is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_user_error() {
        let Err(ApiError(err)) = extract("{\"cwd\":").await else {
            panic!("malformed body accepted");
        };
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().starts_with("Invalid request body: "), "{err}");

        let Err(ApiError(err)) = extract(r#"{"names":"api"}"#).await else {
            panic!("mistyped body accepted");
        };
        assert_eq!(err.as_label(), "user_error");
    }

    #[tokio::test]
    async fn test_body_needs_json_content_type() {
        let Err(ApiError(err)) = extract_as("text/plain", r#"{"cwd":"/ws"}"#).await else {
            panic!("plain text body accepted");
        };
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("Content-Type"), "{err}");

        let req = extract_as("text/plain", "").await.ok().unwrap();
        assert!(req.cwd.is_none());
    }
}
