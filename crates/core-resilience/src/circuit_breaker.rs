//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker prevents cascading failures by failing fast when a
//! protected resource is experiencing issues. It has three states:
//! - Closed: Normal operation, calls pass through
//! - Open: Resource is unhealthy, calls are rejected without running
//! - HalfOpen: One probe at a time is admitted to test recovery
//!
//! # State Transitions
//! ```text
//! Closed   --failure x failure_threshold-->             Open
//! Open     --recovery_timeout elapsed, 1 probe-->       HalfOpen
//! HalfOpen --success x half_open_required_successes-->  Closed
//! HalfOpen --any failure-->                             Open
//! ```
//!
//! The breaker never runs operations itself. A caller asks [`CircuitBreaker::guard`]
//! for an [`Admission`], runs the operation, and hands the admission back through
//! exactly one of [`observe_success`](CircuitBreaker::observe_success),
//! [`observe_failure`](CircuitBreaker::observe_failure) or
//! [`abandon`](CircuitBreaker::abandon). All state lives behind one mutex that is
//! only held for the bookkeeping, never across an await point.
//!
//! # Example
//! ```
//! use bulwark_core_resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//!
//! let breaker = CircuitBreaker::new("inventory-db", CircuitBreakerConfig {
//!     failure_threshold: 2,
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! for _ in 0..2 {
//!     let admission = breaker.guard().unwrap();
//!     breaker.observe_failure(admission);
//! }
//! assert_eq!(breaker.state(), CircuitState::Open);
//! assert!(breaker.guard().is_err());
//! ```

use crate::error::{CircuitOpenError, ConfigError};
use crate::metrics::{ratio, CircuitBreakerMetrics};
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, calls pass through normally
    Closed,
    /// Circuit is open, calls are rejected
    Open,
    /// Circuit is half-open, testing recovery with probe calls
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Duration to wait before admitting a probe while open
    pub recovery_timeout: Duration,
    /// Number of probe successes in half-open needed to close circuit
    pub half_open_required_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_required_successes: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Reject the first out-of-range parameter
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.problems().into_iter().next() {
            Some(problem) => Err(problem),
            None => Ok(()),
        }
    }

    /// Every out-of-range parameter, in field order
    pub fn problems(&self) -> Vec<ConfigError> {
        let mut problems = Vec::new();
        if self.failure_threshold < 1 {
            problems.push(ConfigError::invalid("failure_threshold", "must be at least 1"));
        }
        if self.half_open_required_successes < 1 {
            problems.push(ConfigError::invalid(
                "half_open_required_successes",
                "must be at least 1",
            ));
        }
        problems
    }
}

/// Permission to run one call, handed out by [`CircuitBreaker::guard`].
///
/// Must be returned to the breaker that issued it through exactly one of
/// `observe_success`, `observe_failure` or `abandon`.
#[derive(Debug)]
#[must_use = "an admission must be reported back to the circuit breaker"]
pub struct Admission {
    probe: Option<u64>,
}

impl Admission {
    /// Whether this call is the half-open recovery probe
    pub fn is_probe(&self) -> bool {
        self.probe.is_some()
    }
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    /// Ticket of the probe currently in flight while half-open
    probe_in_flight: Option<u64>,
    next_probe_ticket: u64,
    last_transition: Instant,
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    rejected_calls: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            probe_in_flight: None,
            next_probe_ticket: 0,
            last_transition: Instant::now(),
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            rejected_calls: 0,
        }
    }

    fn transition(&mut self, to: CircuitState) {
        self.state = to;
        self.last_transition = Instant::now();
        self.probe_in_flight = None;
        self.half_open_successes = 0;
    }

    fn take_probe(&mut self) -> Admission {
        let ticket = self.next_probe_ticket;
        self.next_probe_ticket = self.next_probe_ticket.wrapping_add(1);
        self.probe_in_flight = Some(ticket);
        Admission {
            probe: Some(ticket),
        }
    }

    /// Whether `admission` is the probe currently holding the slot
    fn holds_probe(&self, admission: &Admission) -> bool {
        admission.probe.is_some() && self.probe_in_flight == admission.probe
    }

    /// Free the probe slot if `admission` is the probe currently holding it
    fn release_probe(&mut self, admission: &Admission) {
        if self.holds_probe(admission) {
            self.probe_in_flight = None;
        }
    }
}

/// Circuit breaker guarding a single named resource.
///
/// Share one instance per resource through an `Arc` (see
/// [`ResilienceRegistry`](crate::ResilienceRegistry)).
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::new()),
        })
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: CircuitBreakerConfig::default(),
            state: Mutex::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // Bookkeeping never panics mid-update, so a poisoned lock still holds
        // consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Get current consecutive failure count
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Get current half-open success count
    pub fn half_open_successes(&self) -> u32 {
        self.lock().half_open_successes
    }

    /// Ask to run one call.
    ///
    /// While open and inside the recovery timeout, or while half-open with a
    /// probe already in flight, the call is rejected and counted in
    /// `rejected_calls`. The first call after the timeout moves the breaker to
    /// half-open and becomes the probe.
    pub fn guard(&self) -> Result<Admission, CircuitOpenError> {
        let mut state = self.lock();
        state.total_calls += 1;

        match state.state {
            CircuitState::Closed => Ok(Admission { probe: None }),
            CircuitState::Open => {
                if state.last_transition.elapsed() >= self.config.recovery_timeout {
                    state.transition(CircuitState::HalfOpen);
                    info!(breaker = %self.name, "Circuit half-open, admitting probe");
                    Ok(state.take_probe())
                } else {
                    self.reject(&mut state)
                }
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight.is_none() {
                    Ok(state.take_probe())
                } else {
                    self.reject(&mut state)
                }
            }
        }
    }

    fn reject(&self, state: &mut BreakerState) -> Result<Admission, CircuitOpenError> {
        state.rejected_calls += 1;
        debug!(breaker = %self.name, state = %state.state, "Circuit rejecting call");
        Err(CircuitOpenError {
            name: self.name.clone(),
        })
    }

    /// Report that an admitted call succeeded.
    ///
    /// While half-open, only the success of the probe currently in flight
    /// counts toward closing the circuit.
    pub fn observe_success(&self, admission: Admission) {
        let mut state = self.lock();
        state.successful_calls += 1;
        let is_current_probe = state.holds_probe(&admission);
        state.release_probe(&admission);

        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                // Only the probe in flight counts toward recovery
                if !is_current_probe {
                    return;
                }
                state.half_open_successes += 1;
                if state.half_open_successes >= self.config.half_open_required_successes {
                    state.transition(CircuitState::Closed);
                    state.consecutive_failures = 0;
                    info!(breaker = %self.name, "Circuit closed, resource recovered");
                }
            }
            CircuitState::Open => {
                // Call was admitted before the circuit opened; it does not
                // shorten the recovery timeout.
            }
        }
    }

    /// Report that an admitted call failed
    pub fn observe_failure(&self, admission: Admission) {
        let mut state = self.lock();
        state.failed_calls += 1;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.release_probe(&admission);

        match state.state {
            CircuitState::Closed => {
                if state.consecutive_failures >= self.config.failure_threshold {
                    state.transition(CircuitState::Open);
                    warn!(
                        breaker = %self.name,
                        consecutive_failures = state.consecutive_failures,
                        recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                state.transition(CircuitState::Open);
                warn!(breaker = %self.name, "Probe failed, circuit reopened");
            }
            CircuitState::Open => {}
        }
    }

    /// Hand back an admitted call that produced no outcome (e.g. it was cancelled).
    ///
    /// Frees the probe slot if the call was the probe; counters and state are
    /// left untouched.
    pub fn abandon(&self, admission: Admission) {
        let mut state = self.lock();
        if admission.is_probe() {
            debug!(breaker = %self.name, "Probe abandoned without an outcome");
        }
        state.release_probe(&admission);
    }

    /// Reset the circuit breaker to closed state.
    ///
    /// Lifetime counters are kept.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.transition(CircuitState::Closed);
        state.consecutive_failures = 0;
        info!(breaker = %self.name, "Circuit manually reset");
    }

    /// Point-in-time view of state and counters
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.lock();
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: state.state,
            failure_threshold: self.config.failure_threshold,
            consecutive_failures: state.consecutive_failures,
            half_open_successes: state.half_open_successes,
            total_calls: state.total_calls,
            successful_calls: state.successful_calls,
            failed_calls: state.failed_calls,
            rejected_calls: state.rejected_calls,
            success_rate: ratio(
                state.successful_calls,
                state.successful_calls + state.failed_calls,
            ),
            state_age_ms: state.last_transition.elapsed().as_millis() as u64,
        }
    }
}
