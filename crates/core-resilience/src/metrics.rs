//! Read-only metrics snapshots
//!
//! Every primitive can produce a point-in-time snapshot of its configuration
//! and counters. Snapshots are plain values: taking one never mutates the
//! component it came from. They serialize with serde for structured output and
//! can be flattened into `key -> value` pairs for log lines.

use crate::circuit_breaker::CircuitState;
use serde::Serialize;
use std::collections::BTreeMap;

/// Configured parameters of a retry policy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryPolicySnapshot {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub jitter_floor_ms: u64,
    pub retryable: Vec<String>,
    pub non_retryable: Vec<String>,
}

/// Circuit breaker state and lifetime counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    /// `successful / (successful + failed)`, 0.0 before any call completed
    pub success_rate: f64,
    /// Time spent in the current state, in milliseconds
    pub state_age_ms: u64,
}

/// Bulkhead capacity and lifetime counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkheadMetrics {
    pub name: String,
    pub max_concurrent_operations: usize,
    pub active_count: usize,
    pub total_requests: u64,
    pub rejected_requests: u64,
    pub acceptance_rate: f64,
}

/// Aggregate snapshot of everything a [`ResilienceManager`](crate::ResilienceManager) is configured with
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResilienceMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicySnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bulkhead: Option<BulkheadMetrics>,
}

impl RetryPolicySnapshot {
    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("max_attempts", self.max_attempts.to_string()),
            ("base_delay_ms", self.base_delay_ms.to_string()),
            ("max_delay_ms", self.max_delay_ms.to_string()),
            ("backoff_factor", self.backoff_factor.to_string()),
            ("jitter", self.jitter.to_string()),
            ("jitter_floor_ms", self.jitter_floor_ms.to_string()),
            ("retryable", self.retryable.join(",")),
            ("non_retryable", self.non_retryable.join(",")),
        ]
    }
}

impl CircuitBreakerMetrics {
    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("state", self.state.to_string()),
            ("failure_threshold", self.failure_threshold.to_string()),
            ("consecutive_failures", self.consecutive_failures.to_string()),
            ("half_open_successes", self.half_open_successes.to_string()),
            ("total_calls", self.total_calls.to_string()),
            ("successful_calls", self.successful_calls.to_string()),
            ("failed_calls", self.failed_calls.to_string()),
            ("rejected_calls", self.rejected_calls.to_string()),
            ("success_rate", format!("{:.4}", self.success_rate)),
        ]
    }
}

impl BulkheadMetrics {
    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            (
                "max_concurrent_operations",
                self.max_concurrent_operations.to_string(),
            ),
            ("active_count", self.active_count.to_string()),
            ("total_requests", self.total_requests.to_string()),
            ("rejected_requests", self.rejected_requests.to_string()),
            ("acceptance_rate", format!("{:.4}", self.acceptance_rate)),
        ]
    }
}

impl ResilienceMetrics {
    /// Flatten into `component.field -> value` pairs.
    ///
    /// `state_age_ms` is left out so that two flattenings taken without
    /// intervening calls compare equal.
    pub fn to_flat_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        let mut extend = |prefix: &str, entries: Vec<(&'static str, String)>| {
            for (key, value) in entries {
                map.insert(format!("{}.{}", prefix, key), value);
            }
        };

        if let Some(retry) = &self.retry {
            extend("retry", retry.entries());
        }
        if let Some(breaker) = &self.circuit_breaker {
            extend("circuit_breaker", breaker.entries());
        }
        if let Some(bulkhead) = &self.bulkhead {
            extend("bulkhead", bulkhead.entries());
        }

        map
    }
}

/// `numerator / denominator`, 0.0 when the denominator is zero
pub(crate) fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
