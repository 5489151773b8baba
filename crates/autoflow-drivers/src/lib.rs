//! Built-in action drivers for autoflow -- HTTP and dry-run services.
//!
//! Each driver implements [`autoflow_kernel::Driver`], the uniform
//! `execute(operation, parameters, context)` contract the engine dispatches
//! through.

pub mod catalog;
pub mod dry_run;
pub mod error;
pub mod http;

pub use catalog::{standard_drivers, standard_registry};
pub use dry_run::{DryRunDriver, RecordedCall};
pub use error::{DriverError, Result};
pub use http::HttpDriver;
