//! Bulkhead: fixed-capacity concurrency isolation per resource
//!
//! A bulkhead caps how many operations may use a resource at the same time.
//! Excess demand is rejected immediately with [`BulkheadFullError`]; nothing is
//! queued. Slots are handed out as RAII [`BulkheadPermit`]s backed by a
//! `tokio::sync::Semaphore`, so a slot is returned on every path: normal
//! completion, error, panic unwinding, or the owning future being dropped.
//!
//! # Example
//!
//! ```
//! use bulwark_core_resilience::Bulkhead;
//!
//! let bulkhead = Bulkhead::new("search-index", 1).unwrap();
//!
//! let permit = bulkhead.try_acquire().unwrap();
//! assert!(bulkhead.try_acquire().is_err());
//!
//! bulkhead.release(permit);
//! assert!(bulkhead.try_acquire().is_ok());
//! assert_eq!(bulkhead.metrics().acceptance_rate, 2.0 / 3.0);
//! ```

use crate::error::{BulkheadFullError, ConfigError};
use crate::metrics::{ratio, BulkheadMetrics};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// One occupied bulkhead slot; dropping it frees the slot
#[derive(Debug)]
#[must_use = "dropping the permit releases the bulkhead slot immediately"]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

/// Concurrency limiter for a single named resource.
///
/// Thread-safe: counters are atomics and slots come from a semaphore, no
/// locking required.
#[derive(Debug)]
pub struct Bulkhead {
    name: String,
    max_concurrent_operations: usize,
    semaphore: Arc<Semaphore>,
    total_requests: AtomicU64,
    rejected_requests: AtomicU64,
}

impl Bulkhead {
    /// Create a bulkhead allowing `max_concurrent_operations` simultaneous holders
    pub fn new(
        name: impl Into<String>,
        max_concurrent_operations: usize,
    ) -> Result<Self, ConfigError> {
        if max_concurrent_operations < 1 {
            return Err(ConfigError::invalid(
                "max_concurrent_operations",
                "must be at least 1",
            ));
        }
        if max_concurrent_operations > Semaphore::MAX_PERMITS {
            return Err(ConfigError::invalid(
                "max_concurrent_operations",
                format!("must not exceed {}", Semaphore::MAX_PERMITS),
            ));
        }

        Ok(Self {
            name: name.into(),
            max_concurrent_operations,
            semaphore: Arc::new(Semaphore::new(max_concurrent_operations)),
            total_requests: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_concurrent_operations(&self) -> usize {
        self.max_concurrent_operations
    }

    /// Take a slot if one is free, otherwise reject without waiting
    pub fn try_acquire(&self) -> Result<BulkheadPermit, BulkheadFullError> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(BulkheadPermit { _permit: permit }),
            Err(_) => {
                self.rejected_requests.fetch_add(1, Ordering::Relaxed);
                debug!(
                    bulkhead = %self.name,
                    capacity = self.max_concurrent_operations,
                    "Bulkhead full, rejecting request"
                );
                Err(BulkheadFullError {
                    name: self.name.clone(),
                    capacity: self.max_concurrent_operations,
                })
            }
        }
    }

    /// Return a slot. Equivalent to dropping the permit.
    pub fn release(&self, permit: BulkheadPermit) {
        drop(permit);
    }

    /// Run `op` while holding a slot, or reject immediately if none is free
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T, BulkheadFullError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.try_acquire()?;
        Ok(op().await)
    }

    /// Number of slots currently held
    pub fn active_count(&self) -> usize {
        self.max_concurrent_operations
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Number of free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Point-in-time view of capacity and counters
    pub fn metrics(&self) -> BulkheadMetrics {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let rejected_requests = self.rejected_requests.load(Ordering::Relaxed);

        BulkheadMetrics {
            name: self.name.clone(),
            max_concurrent_operations: self.max_concurrent_operations,
            active_count: self.active_count(),
            total_requests,
            rejected_requests,
            acceptance_rate: ratio(
                total_requests.saturating_sub(rejected_requests),
                total_requests,
            ),
        }
    }
}
