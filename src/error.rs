//! Error types used by the supervisor, transport and CLI.
//!
//! A single enum, [`DmError`], covers every failure class:
//!
//! - **User** errors (bad arguments, missing config) are reported and abort the request;
//! - **ServerUnavailable** replaces a raw connection-refused error on the client side;
//! - **Operation** errors belong to one app and are captured into its `error` field;
//! - everything else is internal and is converted into the generic error envelope.
//!
//! Like the runtime errors it replaces, every variant exposes a stable
//! [`as_label`](DmError::as_label) for logs and a transport mapping
//! ([`status_code`](DmError::status_code), [`error_code`](DmError::error_code)).

use std::path::PathBuf;

use thiserror::Error;

/// Numeric error code carried by the JSON error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Generic failure; used for every internal error.
    InternalServerError = 1,
    /// The request was malformed or referenced missing arguments.
    BadRequest = 2,
    /// The referenced workspace or app does not exist.
    NotFound = 3,
}

impl ErrorCode {
    /// Wire representation.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Parses a wire code; unknown codes collapse to [`ErrorCode::InternalServerError`].
    pub fn from_u16(code: u16) -> Self {
        match code {
            2 => ErrorCode::BadRequest,
            3 => ErrorCode::NotFound,
            _ => ErrorCode::InternalServerError,
        }
    }
}

/// # Errors produced by devmanager.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DmError {
    /// Bad or missing user input (command arguments, request fields).
    #[error("{0}")]
    User(String),

    /// No `dm.conf` was found between the start directory and the filesystem root.
    #[error("dm.conf file was not found (searched upward from {})", start.display())]
    ConfigNotFound {
        /// Directory the upward search started from.
        start: PathBuf,
    },

    /// The config file exists but could not be parsed or normalized.
    #[error("invalid config {}: {reason}", path.display())]
    Config {
        /// Path of the offending file.
        path: PathBuf,
        /// Parser or validation message.
        reason: String,
    },

    /// A workspace or app name did not resolve.
    #[error("{0}")]
    NotFound(String),

    /// A single app's start/stop failed.
    #[error("{app}: {reason}")]
    Operation {
        /// App name.
        app: String,
        /// Failure message (spawn or signal error).
        reason: String,
    },

    /// The control server could not be reached.
    #[error("DM server is not available")]
    ServerUnavailable,

    /// The control server answered with an error envelope.
    #[error("{status} {message}")]
    Remote {
        /// HTTP status returned by the server.
        status: u16,
        /// Envelope message.
        message: String,
        /// Envelope code.
        code: ErrorCode,
    },

    /// Filesystem or process I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Anything else: a bug or an unexpected state.
    #[error("{0}")]
    Internal(String),
}

impl DmError {
    /// Shorthand for [`DmError::User`].
    pub fn user(msg: impl Into<String>) -> Self {
        DmError::User(msg.into())
    }

    /// Shorthand for [`DmError::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        DmError::Internal(msg.into())
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use devmanager::DmError;
    ///
    /// let err = DmError::user("App name is missing");
    /// assert_eq!(err.as_label(), "user_error");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DmError::User(_) => "user_error",
            DmError::ConfigNotFound { .. } => "config_not_found",
            DmError::Config { .. } => "config_invalid",
            DmError::NotFound(_) => "not_found",
            DmError::Operation { .. } => "operation_failed",
            DmError::ServerUnavailable => "server_unavailable",
            DmError::Remote { .. } => "remote_error",
            DmError::Io(_) => "io_error",
            DmError::Internal(_) => "internal_error",
        }
    }

    /// HTTP status used when this error crosses the transport boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            DmError::User(_) | DmError::ConfigNotFound { .. } | DmError::Config { .. } => 400,
            DmError::NotFound(_) => 404,
            DmError::Remote { status, .. } => *status,
            _ => 500,
        }
    }

    /// Envelope code used when this error crosses the transport boundary.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            DmError::User(_) | DmError::ConfigNotFound { .. } | DmError::Config { .. } => {
                ErrorCode::BadRequest
            }
            DmError::NotFound(_) => ErrorCode::NotFound,
            DmError::Remote { code, .. } => *code,
            _ => ErrorCode::InternalServerError,
        }
    }

    /// Errors the CLI reports and then exits successfully from.
    ///
    /// Everything else is treated as an uncaught failure.
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            DmError::User(_)
                | DmError::ConfigNotFound { .. }
                | DmError::Config { .. }
                | DmError::NotFound(_)
                | DmError::ServerUnavailable
                | DmError::Remote { .. }
        )
    }
}
