//! Error types for the resilience layer

use std::borrow::Cow;
use thiserror::Error;

/// Outcome of a protected call that did not produce a value.
///
/// `E` is the caller's own error type. Operation failures pass through
/// untouched as [`ResilienceError::Operation`]; the remaining variants are
/// produced by the gates themselves.
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// Circuit breaker is open, the operation was not invoked
    #[error("circuit breaker '{name}' is open, rejecting calls")]
    CircuitOpen { name: String },

    /// Bulkhead has no free slot, the operation was not invoked
    #[error("bulkhead '{name}' is full ({capacity} concurrent operations)")]
    BulkheadFull { name: String, capacity: usize },

    /// Every attempt failed with a transient error
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The operation failed with an error that is not retried
    #[error(transparent)]
    Operation(E),
}

impl<E> ResilienceError<E> {
    /// True for breaker and bulkhead rejections (operation never ran)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ResilienceError::CircuitOpen { .. } | ResilienceError::BulkheadFull { .. }
        )
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    pub fn is_bulkhead_full(&self) -> bool {
        matches!(self, ResilienceError::BulkheadFull { .. })
    }

    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, ResilienceError::RetriesExhausted { .. })
    }

    /// Borrow the underlying operation error, if the operation ran at all
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            ResilienceError::RetriesExhausted { source, .. } => Some(source),
            ResilienceError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Take the underlying operation error, if the operation ran at all
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            ResilienceError::RetriesExhausted { source, .. } => Some(source),
            ResilienceError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Convert the wrapped operation error, keeping rejections as they are
    pub fn map_operation<F, E2>(self, f: F) -> ResilienceError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            ResilienceError::CircuitOpen { name } => ResilienceError::CircuitOpen { name },
            ResilienceError::BulkheadFull { name, capacity } => {
                ResilienceError::BulkheadFull { name, capacity }
            }
            ResilienceError::RetriesExhausted { attempts, source } => {
                ResilienceError::RetriesExhausted {
                    attempts,
                    source: f(source),
                }
            }
            ResilienceError::Operation(e) => ResilienceError::Operation(f(e)),
        }
    }
}

/// Returned by [`CircuitBreaker::guard`](crate::CircuitBreaker::guard) when a call is rejected
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("circuit breaker '{name}' is open, rejecting calls")]
pub struct CircuitOpenError {
    pub name: String,
}

/// Returned by [`Bulkhead::try_acquire`](crate::Bulkhead::try_acquire) when every slot is taken
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("bulkhead '{name}' is full ({capacity} concurrent operations)")]
pub struct BulkheadFullError {
    pub name: String,
    pub capacity: usize,
}

impl<E> From<CircuitOpenError> for ResilienceError<E> {
    fn from(err: CircuitOpenError) -> Self {
        ResilienceError::CircuitOpen { name: err.name }
    }
}

impl<E> From<BulkheadFullError> for ResilienceError<E> {
    fn from(err: BulkheadFullError) -> Self {
        ResilienceError::BulkheadFull {
            name: err.name,
            capacity: err.capacity,
        }
    }
}

/// How a retry policy treats a given failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth another attempt after a backoff delay
    Transient,
    /// Propagated on first occurrence
    Fatal,
}

/// Exposes a stable kind name for an error, matched against the retryable and
/// non-retryable sets of a [`RetryPolicy`](crate::RetryPolicy).
pub trait Classify {
    fn kind(&self) -> Cow<'_, str>;
}

impl Classify for std::io::Error {
    /// `io::TimedOut`, `io::ConnectionReset`, ...
    fn kind(&self) -> Cow<'_, str> {
        Cow::Owned(format!("io::{:?}", std::io::Error::kind(self)))
    }
}

impl<T: Classify + ?Sized> Classify for Box<T> {
    fn kind(&self) -> Cow<'_, str> {
        (**self).kind()
    }
}

impl<T: Classify + ?Sized> Classify for &T {
    fn kind(&self) -> Cow<'_, str> {
        (**self).kind()
    }
}

/// Invalid construction parameters for one of the primitives
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
