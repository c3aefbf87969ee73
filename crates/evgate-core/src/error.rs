//! Error types for the gateway core.

use thiserror::Error;

/// Core error type for gateway operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Wire envelope was structurally invalid (bad marker, short header,
    /// length mismatch).
    #[error("frame error: {0}")]
    Frame(String),

    /// A realtime sub-record could not be decoded.
    ///
    /// Aborts the remainder of the current packet only; records decoded
    /// before the failure stay valid.
    #[error("sub-record decode error: {0}")]
    SubRecord(String),

    /// A command payload (login, logout, platform login) was malformed.
    #[error("payload error: {0}")]
    Payload(String),

    /// Platform credentials were rejected.
    #[error("authentication rejected")]
    AuthRejected,

    /// A command arrived in a state that does not allow it.
    #[error("protocol state error: {0}")]
    State(String),

    /// Writing a reply to the terminal failed.
    #[error("connection write failed")]
    ConnWrite,

    /// A panic was caught at the handler boundary.
    #[error("internal handler fault: {0}")]
    HandlerFault(String),

    /// Configuration could not be loaded or was invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Downstream sink refused or failed a produce call.
    #[error("sink error: {0}")]
    Sink(String),
}

/// Result type alias using the gateway's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Frame(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Sink(e.to_string())
    }
}
