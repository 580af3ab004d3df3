use std::time::Duration;

use thiserror::Error;

/// Non-success status carried by a server reply
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[0x{code:04X}] {message}")]
pub struct ServerError {
    pub code: u32,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Server Error: {0}")]
    ServerError(#[from] ServerError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Request 0x{req_id:x} timed out after {timeout:?}")]
    RequestTimeout { req_id: u64, timeout: Duration },

    #[error("Cannot {operation} in state {actual}, expected one of {expected:?}")]
    InvalidStatementState {
        operation: &'static str,
        expected: &'static [&'static str],
        actual: &'static str,
    },

    #[error("Statement is closed")]
    StatementClosed,

    #[error("Request id space exhausted")]
    RequestIdsExhausted,

    #[error("Bad config error: {0}")]
    BadConfigError(String),

    #[error("Bad usage error: {0}")]
    BadUsageError(String),
}

impl Error {
    /// Whether the connection that produced this error must be replaced
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::TransportClosed | Error::MalformedFrame(_))
    }

    pub(crate) fn malformed(what: impl Into<String>) -> Self {
        Error::MalformedFrame(what.into())
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

pub type Result<T> = std::result::Result<T, Error>;
