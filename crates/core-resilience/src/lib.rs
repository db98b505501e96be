//! Bulwark Core Resilience: Pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! This crate provides the building blocks that keep a service responsive when
//! the things it depends on are not. It includes:
//!
//! - **Retry Policy**: Exponential backoff with full jitter and kind-based failure classification
//! - **Circuit Breaker**: Fails fast while a resource is unhealthy, probes for recovery
//! - **Bulkhead**: Caps concurrent use of a resource and rejects excess demand immediately
//! - **Resilience Manager**: Composes the three around an arbitrary unit of work
//! - **Registry**: Owns the per-resource breaker and bulkhead instances
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - What the protected operations do (HTTP, databases, queues)
//! - Configuration files or command line parsing
//! - Where metrics end up
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │ manager.execute(op)
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Bulkhead                          │  ← Concurrency isolation
//! │  (try_acquire, reject when full)        │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Fail-fast protection
//! │  (guard, one observation per call)      │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry Policy                      │  ← Transient fault recovery
//! │  (backoff + jitter between attempts)    │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!         Protected Operation
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use bulwark_core_resilience::{
//!     Classify, CircuitBreakerConfig, ResilienceError, ResilienceRegistry, RetryPolicy,
//! };
//! use std::borrow::Cow;
//!
//! #[derive(Debug)]
//! enum FetchError {
//!     Timeout,
//!     NotFound,
//! }
//!
//! impl Classify for FetchError {
//!     fn kind(&self) -> Cow<'_, str> {
//!         match self {
//!             FetchError::Timeout => "timeout".into(),
//!             FetchError::NotFound => "permanent".into(),
//!         }
//!     }
//! }
//!
//! # async fn example() -> Result<(), ResilienceError<FetchError>> {
//! let registry = ResilienceRegistry::new();
//! registry
//!     .breaker_or_insert("catalog", CircuitBreakerConfig::default())
//!     .unwrap();
//! registry.bulkhead_or_insert("catalog", 16).unwrap();
//!
//! let manager = registry.manager("catalog", Some(RetryPolicy::new_default()));
//! let item = manager
//!     .execute(|| async { Ok::<_, FetchError>("widget") })
//!     .await?;
//! # let _ = item;
//! # Ok(())
//! # }
//! ```

pub mod bulkhead;
pub mod circuit_breaker;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod registry;
pub mod retry;

// Re-export main types for convenience
pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{
    BulkheadFullError, CircuitOpenError, Classify, ConfigError, ErrorClass, ResilienceError,
};
pub use manager::ResilienceManager;
pub use metrics::{BulkheadMetrics, CircuitBreakerMetrics, ResilienceMetrics, RetryPolicySnapshot};
pub use registry::ResilienceRegistry;
pub use retry::{RetryConfig, RetryPolicy, DEFAULT_JITTER_FLOOR};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use bulwark_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::bulkhead::Bulkhead;
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::error::{Classify, ResilienceError};
    pub use super::manager::ResilienceManager;
    pub use super::registry::ResilienceRegistry;
    pub use super::retry::{RetryConfig, RetryPolicy};
}
