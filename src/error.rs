//! Error types for the NexentaStor CSI driver
//!
//! Provides the crate-wide error enum, the classified appliance error
//! (`NefError`) and the mapping of both onto orchestrator status codes.

use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Appliance Error Codes
// =============================================================================

/// Appliance code for "resource already exists"
pub const CODE_EEXIST: &str = "EEXIST";
/// Appliance code for "resource does not exist"
pub const CODE_ENOENT: &str = "ENOENT";
/// Appliance code for an invalid argument
pub const CODE_EINVAL: &str = "EINVAL";
/// Appliance code for a malformed request argument
pub const CODE_EBADARG: &str = "EBADARG";
/// Appliance code for "resource is busy"
pub const CODE_EBUSY: &str = "EBUSY";
/// Appliance code for an expired or missing session
pub const CODE_EAUTH: &str = "EAUTH";

// =============================================================================
// NEF Error
// =============================================================================

/// Error returned by the appliance as a JSON body.
///
/// `code` is the only classification key; `message` is human readable and
/// already carries the request context (endpoint, method, path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NefError {
    pub message: String,
    pub code: String,
}

impl NefError {
    /// Build a classified error from an appliance response body.
    ///
    /// Returns `None` when the body carries neither `name` nor `message`,
    /// meaning the appliance gave no structured error.
    pub fn parse(body: &Value, context: &str) -> Option<Self> {
        let name = body.get("name").map(value_to_string);
        let message = body.get("message").map(value_to_string);

        if name.is_none() && message.is_none() {
            return None;
        }

        let mut text = name.unwrap_or_default();
        if let Some(message) = message {
            text.push_str(&format!(": {}", message));
        }
        if let Some(errors) = body.get("errors") {
            text.push_str(&format!(", errors: [{}]", errors));
        }

        Some(Self {
            message: format!("{}: {}", context, text),
            code: body.get("code").map(value_to_string).unwrap_or_default(),
        })
    }
}

impl fmt::Display for NefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} [code: {}]", self.message, self.code)
        }
    }
}

impl std::error::Error for NefError {}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Error
// =============================================================================

/// Unified error type for the driver
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Appliance Errors
    // =========================================================================
    #[error("{0}")]
    Nef(#[from] NefError),

    #[error("Request to {endpoint} failed with status {status}: {body}")]
    UnexpectedResponse {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    #[error("Authentication failed on {endpoint}, check address and credentials: {reason}")]
    AuthenticationFailed { endpoint: String, reason: String },

    #[error("Job {job_id} on {endpoint}: timeout exceeded ({timeout:?})")]
    JobTimeout {
        endpoint: String,
        job_id: String,
        timeout: Duration,
    },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    // =========================================================================
    // Identifier Errors
    // =========================================================================
    #[error("Invalid identifier '{id}': {reason}")]
    InvalidIdentifier { id: String, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // =========================================================================
    // Resolution Errors
    // =========================================================================
    #[error("Path '{path}' not found on any backend: {source}")]
    NotFoundOnAnyBackend {
        path: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Backend not found: {name}")]
    BackendNotFound { name: String },

    #[error("Backend {backend} is in zone '{configured}', requested zone is '{requested}'")]
    ZoneMismatch {
        backend: String,
        requested: String,
        configured: String,
    },

    #[error("No backend could serve the request: {0}")]
    NoBackendAvailable(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Volume {name} already exists with size {existing} bytes, requested {requested} bytes")]
    SizeMismatch {
        name: String,
        existing: u64,
        requested: u64,
    },

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Starting token '{0}' not found")]
    InvalidStartingToken(String),
}

/// Status code reported to the orchestrator for a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Unauthenticated,
    DeadlineExceeded,
    Aborted,
    Cancelled,
    Unavailable,
    Internal,
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RpcCode::InvalidArgument => "invalid_argument",
            RpcCode::NotFound => "not_found",
            RpcCode::AlreadyExists => "already_exists",
            RpcCode::FailedPrecondition => "failed_precondition",
            RpcCode::Unauthenticated => "unauthenticated",
            RpcCode::DeadlineExceeded => "deadline_exceeded",
            RpcCode::Aborted => "aborted",
            RpcCode::Cancelled => "cancelled",
            RpcCode::Unavailable => "unavailable",
            RpcCode::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl Error {
    fn nef_code(&self) -> Option<&str> {
        match self {
            Error::Nef(nef) => Some(nef.code.as_str()),
            _ => None,
        }
    }

    /// Appliance reported `EEXIST`
    pub fn is_already_exists(&self) -> bool {
        self.nef_code() == Some(CODE_EEXIST)
    }

    /// Appliance reported `ENOENT`, or no backend owns the requested path
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFoundOnAnyBackend { .. }) || self.nef_code() == Some(CODE_ENOENT)
    }

    /// Appliance rejected an argument
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.nef_code(), Some(CODE_EINVAL) | Some(CODE_EBADARG))
    }

    /// Appliance reported `EBUSY`
    pub fn is_busy(&self) -> bool {
        self.nef_code() == Some(CODE_EBUSY)
    }

    /// Appliance reported `EAUTH`
    pub fn is_unauthenticated(&self) -> bool {
        self.nef_code() == Some(CODE_EAUTH)
    }

    /// Status code to report to the orchestrator
    pub fn status_code(&self) -> RpcCode {
        match self {
            Error::Nef(_) if self.is_not_found() => RpcCode::NotFound,
            Error::Nef(_) if self.is_already_exists() => RpcCode::AlreadyExists,
            Error::Nef(_) if self.is_invalid_argument() => RpcCode::InvalidArgument,
            Error::Nef(_) if self.is_busy() => RpcCode::FailedPrecondition,
            Error::Nef(_) if self.is_unauthenticated() => RpcCode::Unauthenticated,
            Error::Nef(_) => RpcCode::Internal,

            Error::AuthenticationFailed { .. } => RpcCode::Unauthenticated,
            Error::JobTimeout { .. } => RpcCode::DeadlineExceeded,
            Error::Cancelled(_) => RpcCode::Cancelled,
            Error::Http(_) => RpcCode::Unavailable,

            Error::InvalidIdentifier { .. } | Error::InvalidArgument(_) => {
                RpcCode::InvalidArgument
            }

            Error::NotFoundOnAnyBackend { .. } | Error::BackendNotFound { .. } => {
                RpcCode::NotFound
            }
            Error::ZoneMismatch { .. } | Error::FailedPrecondition(_) => {
                RpcCode::FailedPrecondition
            }
            Error::NoBackendAvailable(_) => RpcCode::Unavailable,

            Error::SizeMismatch { .. } => RpcCode::AlreadyExists,
            Error::InvalidStartingToken(_) => RpcCode::Aborted,

            Error::Internal(_)
            | Error::Configuration(_)
            | Error::JsonParse(_)
            | Error::YamlParse(_)
            | Error::Io(_)
            | Error::UnexpectedResponse { .. }
            | Error::MalformedResponse { .. } => RpcCode::Internal,
        }
    }

    /// Check if retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        self.is_busy()
            || matches!(
                self.status_code(),
                RpcCode::Unavailable | RpcCode::DeadlineExceeded | RpcCode::Aborted
            )
    }
}

/// Result type alias for the driver
pub type Result<T> = std::result::Result<T, Error>;
