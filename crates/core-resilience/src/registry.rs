//! Registry of per-resource breakers and bulkheads
//!
//! Circuit breakers and bulkheads only protect a resource if every caller of
//! that resource goes through the same instance. The registry owns those
//! shared instances, keyed by resource name, and assembles
//! [`ResilienceManager`]s around them. It is owned by whatever service layer
//! builds it; there is no process-wide instance.
//!
//! # Example
//!
//! ```
//! use bulwark_core_resilience::{CircuitBreakerConfig, ResilienceRegistry, RetryPolicy};
//! use std::sync::Arc;
//!
//! let registry = ResilienceRegistry::new();
//! let breaker = registry
//!     .breaker_or_insert("billing", CircuitBreakerConfig::default())
//!     .unwrap();
//! registry.bulkhead_or_insert("billing", 4).unwrap();
//!
//! let manager = registry.manager("billing", Some(RetryPolicy::new_default()));
//! assert!(Arc::ptr_eq(manager.circuit_breaker().unwrap(), &breaker));
//! assert_eq!(registry.names(), vec!["billing".to_string()]);
//! ```

use crate::bulkhead::Bulkhead;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::ConfigError;
use crate::manager::ResilienceManager;
use crate::metrics::ResilienceMetrics;
use crate::retry::RetryPolicy;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Shared<T> = Arc<RwLock<BTreeMap<String, Arc<T>>>>;

/// Name-keyed store of shared circuit breakers and bulkheads
#[derive(Debug, Clone, Default)]
pub struct ResilienceRegistry {
    breakers: Shared<CircuitBreaker>,
    bulkheads: Shared<Bulkhead>,
}

fn read<T>(map: &Shared<T>) -> RwLockReadGuard<'_, BTreeMap<String, Arc<T>>> {
    map.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(map: &Shared<T>) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<T>>> {
    map.write().unwrap_or_else(PoisonError::into_inner)
}

impl ResilienceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a breaker under its own name, returning the one it replaced
    pub fn register_breaker(&self, breaker: Arc<CircuitBreaker>) -> Option<Arc<CircuitBreaker>> {
        write(&self.breakers).insert(breaker.name().to_string(), breaker)
    }

    /// Register a bulkhead under its own name, returning the one it replaced
    pub fn register_bulkhead(&self, bulkhead: Arc<Bulkhead>) -> Option<Arc<Bulkhead>> {
        write(&self.bulkheads).insert(bulkhead.name().to_string(), bulkhead)
    }

    pub fn breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        read(&self.breakers).get(name).cloned()
    }

    pub fn bulkhead(&self, name: &str) -> Option<Arc<Bulkhead>> {
        read(&self.bulkheads).get(name).cloned()
    }

    /// Existing breaker for `name`, or a new one built from `config`.
    ///
    /// `config` is ignored when a breaker is already registered.
    pub fn breaker_or_insert(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> Result<Arc<CircuitBreaker>, ConfigError> {
        if let Some(existing) = self.breaker(name) {
            return Ok(existing);
        }

        let mut breakers = write(&self.breakers);
        if let Some(existing) = breakers.get(name) {
            return Ok(existing.clone());
        }
        let breaker = Arc::new(CircuitBreaker::new(name, config)?);
        breakers.insert(name.to_string(), breaker.clone());
        Ok(breaker)
    }

    /// Existing bulkhead for `name`, or a new one with the given capacity.
    ///
    /// `max_concurrent_operations` is ignored when a bulkhead is already registered.
    pub fn bulkhead_or_insert(
        &self,
        name: &str,
        max_concurrent_operations: usize,
    ) -> Result<Arc<Bulkhead>, ConfigError> {
        if let Some(existing) = self.bulkhead(name) {
            return Ok(existing);
        }

        let mut bulkheads = write(&self.bulkheads);
        if let Some(existing) = bulkheads.get(name) {
            return Ok(existing.clone());
        }
        let bulkhead = Arc::new(Bulkhead::new(name, max_concurrent_operations)?);
        bulkheads.insert(name.to_string(), bulkhead.clone());
        Ok(bulkhead)
    }

    /// Manager around whatever breaker and bulkhead are registered for `name`
    pub fn manager(&self, name: &str, retry: Option<RetryPolicy>) -> ResilienceManager {
        let mut manager = ResilienceManager::new();
        if let Some(policy) = retry {
            manager = manager.with_retry(policy);
        }
        if let Some(breaker) = self.breaker(name) {
            manager = manager.with_circuit_breaker(breaker);
        }
        if let Some(bulkhead) = self.bulkhead(name) {
            manager = manager.with_bulkhead(bulkhead);
        }
        manager
    }

    /// Every name that has a breaker or a bulkhead, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = read(&self.breakers).keys().cloned().collect();
        names.extend(read(&self.bulkheads).keys().cloned());
        names.into_iter().collect()
    }

    /// Remove both the breaker and the bulkhead registered for `name`
    pub fn remove(&self, name: &str) {
        write(&self.breakers).remove(name);
        write(&self.bulkheads).remove(name);
    }

    /// Breaker and bulkhead metrics for every registered name
    pub fn snapshot(&self) -> BTreeMap<String, ResilienceMetrics> {
        self.names()
            .into_iter()
            .map(|name| {
                let metrics = ResilienceMetrics {
                    retry: None,
                    circuit_breaker: self.breaker(&name).map(|b| b.metrics()),
                    bulkhead: self.bulkhead(&name).map(|b| b.metrics()),
                };
                (name, metrics)
            })
            .collect()
    }
}
