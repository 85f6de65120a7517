//! Error types for the SRP server
//!
//! [`Error`] is the crate-level error returned by configuration, persistence
//! and the run loop. [`UpdateError`] is the outcome of processing a single
//! SRP update; it is carried through delegation and mapped onto the DNS
//! response code sent back to the client.

use hickory_proto::ProtoError;
use hickory_proto::serialize::binary::DecodeError;
use thiserror::Error;

/// Result type alias for SRP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the SRP system
#[derive(Error, Debug)]
pub enum Error {
    /// Failure while processing an SRP update
    #[error("SRP update error: {0}")]
    Update(#[from] UpdateError),

    /// Settings store-related errors
    #[error("Settings store error: {0}")]
    Settings(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not allowed in the current server state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// DNS message encoding errors
    #[error("DNS error: {0}")]
    Dns(#[from] ProtoError),

    /// DNS-SD backend errors
    #[error("DNS-SD backend error ({backend}): {message}")]
    Backend {
        /// Backend name
        backend: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a settings store error
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::Settings(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a backend-specific error
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Outcome of validating, delegating or advertising one SRP update
///
/// Every variant except [`UpdateError::Drop`] results in an explicit error
/// response when the update arrived directly from a client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// Malformed or truncated message data
    #[error("parse error")]
    Parse,

    /// Zone, key or signature mismatch
    #[error("security error")]
    Security,

    /// Name already owned by a different key
    #[error("name already registered with a different key")]
    Duplicated,

    /// Resource exhaustion
    #[error("no buffers")]
    NoBufs,

    /// Work cancelled by a newer update or by a stop
    #[error("aborted")]
    Abort,

    /// Handler or advertisement did not complete in time
    #[error("response timeout")]
    ResponseTimeout,

    /// Not a well-formed update query; no response is sent
    #[error("dropped")]
    Drop,

    /// Structurally valid but semantically inconsistent update
    #[error("invalid update")]
    Failed,

    /// Inconsistent TTLs across the records of one update
    #[error("rejected")]
    Rejected,

    /// Error reported by the DNS-SD backend or the update handler
    #[error("backend: {0}")]
    Backend(String),
}

impl UpdateError {
    /// Create a backend-supplied error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Map this error onto the response code sent to the client
    pub fn response_code(&self) -> ResponseCode {
        match self {
            UpdateError::Parse => ResponseCode::FormatError,
            UpdateError::NoBufs => ResponseCode::ServerFailure,
            UpdateError::Duplicated => ResponseCode::NameExists,
            _ => ResponseCode::Refused,
        }
    }
}

/// Undecodable message data
impl From<ProtoError> for UpdateError {
    fn from(_: ProtoError) -> Self {
        UpdateError::Parse
    }
}

impl From<DecodeError> for UpdateError {
    fn from(_: DecodeError) -> Self {
        UpdateError::Parse
    }
}

/// Result of one step of the update pipeline
pub type UpdateResult<T = ()> = std::result::Result<T, UpdateError>;

/// DNS response codes used by SRP responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseCode {
    /// NOERROR
    Success = 0,
    /// FORMERR
    FormatError = 1,
    /// SERVFAIL
    ServerFailure = 2,
    /// REFUSED
    Refused = 5,
    /// YXDOMAIN
    NameExists = 6,
}

impl ResponseCode {
    /// Map a pipeline outcome onto a response code
    pub fn from_result(result: &UpdateResult) -> Self {
        match result {
            Ok(()) => ResponseCode::Success,
            Err(e) => e.response_code(),
        }
    }

    /// Decode the low four bits of a header flags word
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ResponseCode::Success),
            1 => Some(ResponseCode::FormatError),
            2 => Some(ResponseCode::ServerFailure),
            5 => Some(ResponseCode::Refused),
            6 => Some(ResponseCode::NameExists),
            _ => None,
        }
    }
}
