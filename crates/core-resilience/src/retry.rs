//! Retry policy with exponential backoff and full jitter
//!
//! A [`RetryPolicy`] is immutable once built and cheap to clone, so one policy
//! can be shared by every operation that targets the same resource.
//!
//! Failures are classified through the [`Classify`] trait: kinds in the
//! non-retryable set are propagated at once, kinds in the retryable set are
//! retried until `max_attempts` is reached, and anything else is treated as
//! fatal.
//!
//! # Example
//!
//! ```
//! use bulwark_core_resilience::{RetryConfig, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(RetryConfig {
//!     base_delay: Duration::from_secs(1),
//!     max_delay: Duration::from_secs(10),
//!     backoff_factor: 2.0,
//!     jitter: false,
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
//! assert_eq!(policy.calculate_delay(3), Duration::from_secs(8));
//! assert_eq!(policy.calculate_delay(4), Duration::from_secs(10));
//! ```

use crate::error::{Classify, ConfigError, ErrorClass, ResilienceError};
use crate::metrics::RetryPolicySnapshot;
use rand::Rng;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Lower bound of a jittered delay unless configured otherwise
pub const DEFAULT_JITTER_FLOOR: Duration = Duration::from_millis(10);

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt (exponential backoff)
    pub backoff_factor: f64,
    /// Draw each delay uniformly from `[jitter_floor, computed_delay]`
    pub jitter: bool,
    /// Lower bound of a jittered delay
    pub jitter_floor: Duration,
    /// Failure kinds that are worth retrying
    pub retryable: BTreeSet<String>,
    /// Failure kinds that are propagated immediately (wins over `retryable`)
    pub non_retryable: BTreeSet<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: true,
            jitter_floor: DEFAULT_JITTER_FLOOR,
            retryable: ["transient", "timeout"].iter().map(|s| s.to_string()).collect(),
            non_retryable: ["permanent"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RetryConfig {
    /// Check every parameter range, reporting the first violation
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.problems().into_iter().next() {
            Some(problem) => Err(problem),
            None => Ok(()),
        }
    }

    /// Every out-of-range parameter, in field order
    pub fn problems(&self) -> Vec<ConfigError> {
        let mut problems = Vec::new();
        if self.max_attempts < 1 {
            problems.push(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        if self.base_delay.is_zero() {
            problems.push(ConfigError::invalid("base_delay", "must be greater than zero"));
        }
        if self.max_delay < self.base_delay {
            problems.push(ConfigError::invalid(
                "max_delay",
                format!(
                    "{:?} is shorter than base_delay {:?}",
                    self.max_delay, self.base_delay
                ),
            ));
        }
        if !(self.backoff_factor.is_finite() && self.backoff_factor > 1.0) {
            problems.push(ConfigError::invalid(
                "backoff_factor",
                format!("must be a finite value above 1.0, got {}", self.backoff_factor),
            ));
        }
        if self.jitter_floor.is_zero() {
            problems.push(ConfigError::invalid("jitter_floor", "must be greater than zero"));
        }
        problems
    }

    /// Replace the retryable kinds
    pub fn with_retryable<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the non-retryable kinds
    pub fn with_non_retryable<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_retryable = kinds.into_iter().map(Into::into).collect();
        self
    }
}

/// What the retry loop does after a failed attempt
enum Decision<E> {
    RetryAfter(Duration),
    GiveUp(ResilienceError<E>),
}

/// Immutable retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: Arc<RetryConfig>,
}

impl RetryPolicy {
    /// Create a policy, rejecting out-of-range parameters
    pub fn new(config: RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Policy with [`RetryConfig::default`] parameters
    pub fn new_default() -> Self {
        Self {
            config: Arc::new(RetryConfig::default()),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Delay to wait after the zero-indexed `attempt` failed.
    ///
    /// Without jitter this is `min(base_delay * backoff_factor^attempt, max_delay)`.
    /// With jitter it is drawn uniformly from `[jitter_floor, that value]`, or is
    /// that value itself when it does not exceed the floor.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let config = &self.config;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw_secs = config.base_delay.as_secs_f64() * config.backoff_factor.powi(exponent);

        let raw = if raw_secs >= config.max_delay.as_secs_f64() {
            config.max_delay
        } else {
            Duration::from_secs_f64(raw_secs)
        };

        if !config.jitter || raw <= config.jitter_floor {
            return raw;
        }

        let floor = duration_nanos(config.jitter_floor);
        let ceiling = duration_nanos(raw);
        Duration::from_nanos(rand::rng().random_range(floor..=ceiling))
    }

    /// Classify a failure against the configured kind sets
    pub fn classify<E: Classify + ?Sized>(&self, error: &E) -> ErrorClass {
        let kind = error.kind();
        if self.config.non_retryable.contains(&*kind) {
            ErrorClass::Fatal
        } else if self.config.retryable.contains(&*kind) {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        }
    }

    /// Run `operation` until it succeeds, fails fatally, or runs out of attempts.
    ///
    /// Backoff delays use `tokio::time::sleep`, so other tasks keep running
    /// while this one waits.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => match self.decide(attempt, error) {
                    Decision::RetryAfter(delay) => {
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Decision::GiveUp(error) => return Err(error),
                },
            }
        }
    }

    /// Blocking twin of [`execute`](Self::execute) for synchronous operations.
    ///
    /// Sleeps the calling thread between attempts; do not call from async code.
    pub fn execute_blocking<F, T, E>(&self, mut operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify,
    {
        let mut attempt = 0;

        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) => match self.decide(attempt, error) {
                    Decision::RetryAfter(delay) => {
                        std::thread::sleep(delay);
                        attempt += 1;
                    }
                    Decision::GiveUp(error) => return Err(error),
                },
            }
        }
    }

    fn decide<E: Classify>(&self, attempt: u32, error: E) -> Decision<E> {
        if self.classify(&error) == ErrorClass::Fatal {
            debug!(attempt, kind = %error.kind(), "Fatal failure, not retrying");
            return Decision::GiveUp(ResilienceError::Operation(error));
        }

        let attempts = attempt + 1;
        if attempts >= self.config.max_attempts {
            warn!(attempts, kind = %error.kind(), "Retries exhausted");
            return Decision::GiveUp(ResilienceError::RetriesExhausted {
                attempts,
                source: error,
            });
        }

        let delay = self.calculate_delay(attempt);
        debug!(
            attempt,
            max_attempts = self.config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            kind = %error.kind(),
            "Transient failure, retrying"
        );
        Decision::RetryAfter(delay)
    }

    /// Configured parameters, for observability
    pub fn metrics(&self) -> RetryPolicySnapshot {
        let config = &self.config;
        RetryPolicySnapshot {
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay.as_millis() as u64,
            max_delay_ms: config.max_delay.as_millis() as u64,
            backoff_factor: config.backoff_factor,
            jitter: config.jitter,
            jitter_floor_ms: config.jitter_floor.as_millis() as u64,
            retryable: config.retryable.iter().cloned().collect(),
            non_retryable: config.non_retryable.iter().cloned().collect(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new_default()
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Flaky,
        Broken,
        Weird,
    }

    impl Classify for TestError {
        fn kind(&self) -> Cow<'_, str> {
            match self {
                TestError::Flaky => Cow::Borrowed("transient"),
                TestError::Broken => Cow::Borrowed("permanent"),
                TestError::Weird => Cow::Borrowed("unheard-of"),
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_deterministic_backoff_sequence() {
        let policy = RetryPolicy::new(RetryConfig {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: false,
            ..Default::default()
        })
        .unwrap();

        let delays: Vec<_> = (0..5).map(|a| policy.calculate_delay(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(10),
            ]
        );
    }

    #[test]
    fn test_jittered_delay_bounds() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 8,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();

        for attempt in 0..policy.max_attempts() {
            for _ in 0..100 {
                let delay = policy.calculate_delay(attempt);
                assert!(delay > Duration::ZERO);
                assert!(delay <= Duration::from_secs(2));
                assert!(delay >= DEFAULT_JITTER_FLOOR);
            }
        }
        for _ in 0..100 {
            assert!(policy.calculate_delay(0) <= Duration::from_millis(50));
        }
    }

    #[test]
    fn test_delay_below_floor_is_not_jittered() {
        let policy = RetryPolicy::new(RetryConfig {
            base_delay: Duration::from_millis(2),
            jitter_floor: Duration::from_millis(10),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(2));
    }

    #[test]
    fn test_huge_attempt_is_capped() {
        let policy = fast_policy(3);
        assert_eq!(policy.calculate_delay(u32::MAX), Duration::from_millis(5));
    }

    #[test]
    fn test_validation() {
        let bad = [
            RetryConfig {
                max_attempts: 0,
                ..Default::default()
            },
            RetryConfig {
                base_delay: Duration::ZERO,
                ..Default::default()
            },
            RetryConfig {
                max_delay: Duration::from_millis(1),
                ..Default::default()
            },
            RetryConfig {
                backoff_factor: 1.0,
                ..Default::default()
            },
            RetryConfig {
                jitter_floor: Duration::ZERO,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(RetryPolicy::new(config).is_err());
        }
        assert!(RetryPolicy::new(RetryConfig::default()).is_ok());
    }

    #[test]
    fn test_problems_reports_every_bad_field() {
        let config = RetryConfig {
            max_attempts: 0,
            base_delay: Duration::ZERO,
            jitter_floor: Duration::ZERO,
            ..Default::default()
        };
        let fields: Vec<_> = config
            .problems()
            .into_iter()
            .map(|ConfigError::Invalid { field, .. }| field)
            .collect();
        assert_eq!(fields, vec!["max_attempts", "base_delay", "jitter_floor"]);
        assert!(RetryConfig::default().problems().is_empty());
    }

    #[test]
    fn test_classification() {
        let policy = RetryPolicy::new_default();
        assert_eq!(policy.classify(&TestError::Flaky), ErrorClass::Transient);
        assert_eq!(policy.classify(&TestError::Broken), ErrorClass::Fatal);
        assert_eq!(policy.classify(&TestError::Weird), ErrorClass::Fatal);

        // Non-retryable membership wins when a kind is in both sets
        let both = RetryPolicy::new(
            RetryConfig::default()
                .with_retryable(["transient"])
                .with_non_retryable(["transient"]),
        )
        .unwrap();
        assert_eq!(both.classify(&TestError::Flaky), ErrorClass::Fatal);
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .execute(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Flaky)
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(5)
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Broken)
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Operation(TestError::Broken))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unclassified_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(5)
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Weird)
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Operation(TestError::Weird))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_wraps_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(4)
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Flaky)
            })
            .await;

        match result {
            Err(ResilienceError::RetriesExhausted { attempts, source }) => {
                assert_eq!(attempts, 4);
                assert_eq!(source, TestError::Flaky);
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: false,
            ..Default::default()
        })
        .unwrap();

        let start = tokio::time::Instant::now();
        let _: Result<(), _> = policy.execute(|| async { Err(TestError::Flaky) }).await;

        // 100ms after the first attempt, 200ms after the second
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(310));
    }

    #[test]
    fn test_blocking_execute() {
        let mut calls = 0;
        let result = fast_policy(3).execute_blocking(|| {
            calls += 1;
            if calls < 3 {
                Err(TestError::Flaky)
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_single_attempt_policy() {
        let mut calls = 0;
        let result: Result<(), _> = fast_policy(1).execute_blocking(|| {
            calls += 1;
            Err(TestError::Flaky)
        });
        assert!(matches!(
            result,
            Err(ResilienceError::RetriesExhausted { attempts: 1, .. })
        ));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_metrics_reflect_config() {
        let policy = fast_policy(7);
        let snapshot = policy.metrics();
        assert_eq!(snapshot.max_attempts, 7);
        assert_eq!(snapshot.base_delay_ms, 1);
        assert!(!snapshot.jitter);
        assert_eq!(snapshot.retryable, vec!["timeout".to_string(), "transient".to_string()]);
        assert_eq!(snapshot, policy.metrics());
    }
}
