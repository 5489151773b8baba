//! Driver error types.
//!
//! Drivers report failures to the engine through
//! [`DriverOutcome::failed`](autoflow_kernel::DriverOutcome::failed); this
//! enum is the typed form used inside a driver before it is flattened into
//! that message.

/// Unified error type for the built-in drivers.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The operation is not declared by this driver.
    #[error("operation not found: `{operation}` on driver `{driver}`")]
    OperationNotFound { driver: String, operation: String },

    /// The parameters supplied to an operation are invalid.
    #[error("invalid parameters for `{operation}`: {reason}")]
    InvalidParams { operation: String, reason: String },

    /// The backing call failed.
    #[error("execution failed for `{operation}`: {reason}")]
    ExecutionFailed { operation: String, reason: String },

    /// An operation exceeded its time limit.
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the drivers crate.
pub type Result<T> = std::result::Result<T, DriverError>;
