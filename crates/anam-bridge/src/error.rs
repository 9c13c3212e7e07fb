//! Bridge error taxonomy
//!
//! Every variant renders to the message string delivered to the sandbox;
//! nothing richer than that string crosses the boundary.

/// Bridge failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Malformed or incomplete request, rejected before dispatch
    #[error("{0}")]
    InvalidRequest(String),

    /// Secret service is not connected
    #[error("Service not connected")]
    ServiceUnavailable,

    /// Secret service could not read or write its store
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Secret service reported a failure
    #[error("{0}")]
    OperationFailed(String),
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
