//! Composition of bulkhead, circuit breaker and retry policy
//!
//! [`ResilienceManager::execute`] wraps one unit of work as
//!
//! ```text
//! bulkhead.try_acquire()      rejected -> BulkheadFull, nothing else engaged
//!   breaker.guard()           rejected -> CircuitOpen, permit released
//!     retry loop              attempts run inside this single admission
//!       operation()
//!   breaker.observe_*()       once per execute, end-to-end outcome
//! permit released
//! ```
//!
//! Any gate left unconfigured is a no-op. Without a retry policy the operation
//! runs exactly once and its error comes back as
//! [`ResilienceError::Operation`].
//!
//! If the returned future is dropped after admission, the bulkhead permit is
//! released and the breaker admission is abandoned: a cancelled call is never
//! counted as a failure.

use crate::bulkhead::{Bulkhead, BulkheadPermit};
use crate::circuit_breaker::{Admission, CircuitBreaker};
use crate::error::{Classify, ResilienceError};
use crate::metrics::ResilienceMetrics;
use crate::retry::RetryPolicy;
use std::future::Future;
use std::sync::Arc;

/// Holds one breaker admission until an outcome is reported; abandons it on drop
struct AdmissionGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Option<Admission>,
}

impl<'a> AdmissionGuard<'a> {
    fn new(breaker: &'a CircuitBreaker, admission: Admission) -> Self {
        Self {
            breaker,
            admission: Some(admission),
        }
    }

    fn record<T, E>(mut self, result: &Result<T, ResilienceError<E>>) {
        if let Some(admission) = self.admission.take() {
            match result {
                Ok(_) => self.breaker.observe_success(admission),
                Err(_) => self.breaker.observe_failure(admission),
            }
        }
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if let Some(admission) = self.admission.take() {
            self.breaker.abandon(admission);
        }
    }
}

/// Wraps operations with an optional bulkhead, circuit breaker and retry policy.
///
/// Cloning is cheap; clones share the same breaker and bulkhead instances.
///
/// # Example
/// ```no_run
/// use bulwark_core_resilience::{
///     Bulkhead, CircuitBreaker, ResilienceManager, RetryPolicy,
/// };
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ResilienceManager::new()
///     .with_retry(RetryPolicy::new_default())
///     .with_circuit_breaker(Arc::new(CircuitBreaker::new_default("ledger")))
///     .with_bulkhead(Arc::new(Bulkhead::new("ledger", 8)?));
///
/// let balance = manager
///     .execute(|| async { Ok::<_, std::io::Error>(42) })
///     .await?;
/// # let _ = balance;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResilienceManager {
    retry: Option<RetryPolicy>,
    breaker: Option<Arc<CircuitBreaker>>,
    bulkhead: Option<Arc<Bulkhead>>,
}

impl ResilienceManager {
    /// Manager with every gate disabled
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn with_bulkhead(mut self, bulkhead: Arc<Bulkhead>) -> Self {
        self.bulkhead = Some(bulkhead);
        self
    }

    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    pub fn bulkhead(&self) -> Option<&Arc<Bulkhead>> {
        self.bulkhead.as_ref()
    }

    /// Pass through the bulkhead and breaker gates
    fn admit<E>(
        &self,
    ) -> Result<(Option<BulkheadPermit>, Option<AdmissionGuard<'_>>), ResilienceError<E>> {
        let permit = match &self.bulkhead {
            Some(bulkhead) => Some(bulkhead.try_acquire()?),
            None => None,
        };

        // A breaker rejection drops `permit` on the way out, releasing the slot
        let admission = match &self.breaker {
            Some(breaker) => Some(AdmissionGuard::new(breaker, breaker.guard()?)),
            None => None,
        };

        Ok((permit, admission))
    }

    /// Run an async operation through every configured gate
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let (permit, admission) = self.admit::<E>()?;

        let result = match &self.retry {
            Some(policy) => policy.execute(operation).await,
            None => operation().await.map_err(ResilienceError::Operation),
        };

        if let Some(admission) = admission {
            admission.record(&result);
        }
        drop(permit);
        result
    }

    /// Run a blocking operation through every configured gate.
    ///
    /// Retry delays sleep the calling thread; use from a plain thread or
    /// `spawn_blocking`, never directly inside an async task.
    pub fn execute_blocking<F, T, E>(&self, mut operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify,
    {
        let (permit, admission) = self.admit::<E>()?;

        let result = match &self.retry {
            Some(policy) => policy.execute_blocking(operation),
            None => operation().map_err(ResilienceError::Operation),
        };

        if let Some(admission) = admission {
            admission.record(&result);
        }
        drop(permit);
        result
    }

    /// Combined snapshot of every configured component
    pub fn metrics(&self) -> ResilienceMetrics {
        ResilienceMetrics {
            retry: self.retry.as_ref().map(RetryPolicy::metrics),
            circuit_breaker: self.breaker.as_ref().map(|b| b.metrics()),
            bulkhead: self.bulkhead.as_ref().map(|b| b.metrics()),
        }
    }
}
