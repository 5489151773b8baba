//! Driver registry.
//!
//! The registry maps driver names to live [`Driver`] instances.  It is
//! populated exactly once at startup through [`DriverRegistryBuilder`] and is
//! read-only afterwards, so lookups never contend on a lock and every clone
//! shares the same backing map.
//!
//! # Example
//!
//! ```rust,ignore
//! # use autoflow_kernel::registry::DriverRegistry;
//! let registry = DriverRegistry::builder()
//!     .register(Arc::new(EmailDriver::new()))?
//!     .build();
//!
//! let spec = registry.operation("email", "send")?;
//! assert!(spec.required_params.contains(&"to".to_string()));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::driver::{Driver, OperationSpec};
use crate::error::{KernelError, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A snapshot describing one registered driver, used by status listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverInfo {
    /// Registry key.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Operations declared by the driver.
    pub operations: Vec<OperationSpec>,
}

struct Entry {
    driver: Arc<dyn Driver>,
    operations: Vec<OperationSpec>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects drivers before freezing them into a [`DriverRegistry`].
#[derive(Default)]
pub struct DriverRegistryBuilder {
    entries: HashMap<String, Entry>,
}

impl DriverRegistryBuilder {
    /// Register a driver under its own [`Driver::name`].
    ///
    /// The declared operation table is captured once here.  Registering two
    /// drivers with the same name is an error.
    pub fn register(mut self, driver: Arc<dyn Driver>) -> Result<Self> {
        let name = driver.name().to_string();
        if self.entries.contains_key(&name) {
            return Err(KernelError::DuplicateDriver { driver: name });
        }

        let operations = driver.supported_operations();
        tracing::info!(
            driver = %name,
            operations = operations.len(),
            "driver registered"
        );

        self.entries.insert(name, Entry { driver, operations });
        Ok(self)
    }

    /// Freeze the builder into a shareable registry.
    #[must_use]
    pub fn build(self) -> DriverRegistry {
        DriverRegistry {
            inner: Arc::new(self.entries),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Read-only driver registry.
///
/// Cheaply cloneable (`Arc`-backed) and `Send + Sync`.
#[derive(Clone)]
pub struct DriverRegistry {
    inner: Arc<HashMap<String, Entry>>,
}

impl DriverRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> DriverRegistryBuilder {
        DriverRegistryBuilder::default()
    }

    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self::builder().build()
    }

    /// Look up a driver by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Driver>> {
        self.inner
            .get(name)
            .map(|entry| Arc::clone(&entry.driver))
            .ok_or_else(|| KernelError::DriverNotFound {
                driver: name.to_string(),
            })
    }

    /// Whether a driver with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// The declared spec of `driver.operation`.
    pub fn operation(&self, driver: &str, operation: &str) -> Result<&OperationSpec> {
        let entry = self
            .inner
            .get(driver)
            .ok_or_else(|| KernelError::DriverNotFound {
                driver: driver.to_string(),
            })?;

        entry
            .operations
            .iter()
            .find(|op| op.name == operation)
            .ok_or_else(|| KernelError::OperationNotSupported {
                driver: driver.to_string(),
                operation: operation.to_string(),
            })
    }

    /// Whether `driver` is registered and declares `operation`.
    pub fn supports(&self, driver: &str, operation: &str) -> bool {
        self.operation(driver, operation).is_ok()
    }

    /// Required parameter names of `driver.operation`.
    pub fn required_params(&self, driver: &str, operation: &str) -> Result<&[String]> {
        self.operation(driver, operation)
            .map(|spec| spec.required_params.as_slice())
    }

    /// Snapshot of every registered driver, sorted by name.
    pub fn list(&self) -> Vec<DriverInfo> {
        let mut infos: Vec<DriverInfo> = self
            .inner
            .iter()
            .map(|(name, entry)| DriverInfo {
                name: name.clone(),
                description: entry.driver.description().to_string(),
                operations: entry.operations.clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Number of registered drivers.
    pub fn count(&self) -> usize {
        self.inner.len()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.inner.keys().collect();
        names.sort();
        f.debug_struct("DriverRegistry")
            .field("drivers", &names)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
