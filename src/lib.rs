/*!
 * Bulwark - retry, circuit breaker and bulkhead policies per resource
 *
 * Configuration-driven wiring around `bulwark-core-resilience`:
 * - TOML configuration with validation that reports every problem at once
 * - One shared circuit breaker and bulkhead per named resource
 * - Structured logging through `tracing`
 * - A synthetic workload simulator for tuning policies
 */

pub mod config;
pub mod error;
pub mod logging;
pub mod service;
pub mod simulate;

// Re-export commonly used types
pub use bulwark_core_resilience as resilience;
pub use config::{load_config, BulwarkConfig, LogLevel, LoggingConfig, ResourceConfig};
pub use error::{BulwarkError, Result};
pub use service::ResilienceService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
