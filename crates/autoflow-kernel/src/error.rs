//! Kernel error types.
//!
//! All kernel subsystems surface errors through [`KernelError`], which is the
//! single error type returned by every public API in this crate.  Each variant
//! carries enough context for callers to decide how to handle the failure
//! without inspecting opaque strings.

/// Unified error type for the autoflow kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Registry errors ----------------------------------------------------
    /// The requested driver is not registered.
    #[error("driver not found: {driver}")]
    DriverNotFound { driver: String },

    /// The driver exists but does not declare the requested operation.
    #[error("driver `{driver}` does not support operation `{operation}`")]
    OperationNotSupported { driver: String, operation: String },

    /// Two drivers were registered under the same name.
    #[error("driver `{driver}` is already registered")]
    DuplicateDriver { driver: String },

    // -- Router errors ------------------------------------------------------
    /// Building the keyword automaton failed.
    #[error("router build error: {reason}")]
    RouterBuildError { reason: String },

    /// A regex pattern supplied to the router is invalid.
    #[error("invalid regex pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
