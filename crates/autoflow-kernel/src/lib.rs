//! autoflow micro-kernel.
//!
//! The leaf services every other autoflow crate builds on:
//!
//! - **[`driver`]** -- The uniform [`Driver`] contract that every third-party
//!   action integration implements, plus its declared operation table.
//! - **[`registry`]** -- The read-only [`DriverRegistry`], populated once at
//!   startup and looked up by driver name.
//! - **[`router`]** -- Deterministic keyword routing (aho-corasick) with regex
//!   entity extraction, used when no language model is available.
//! - **[`error`]** -- Unified kernel error types via [`thiserror`].
//!
//! All public types are `Send + Sync` and designed for use within a
//! multi-threaded tokio runtime.

pub mod driver;
pub mod error;
pub mod registry;
pub mod router;

// Re-export the most commonly used types at the crate root for convenience.
pub use driver::{Driver, DriverOutcome, OperationSpec, ParamMap};
pub use error::{KernelError, Result};
pub use registry::{DriverInfo, DriverRegistry, DriverRegistryBuilder};
pub use router::{KeywordRouter, RouteResult};
