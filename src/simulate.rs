/*!
 * Synthetic workload driven through a resource's resilience policies
 */

use bulwark_core_resilience::{Classify, ResilienceError, ResilienceManager, ResilienceMetrics};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use futures::stream::{self, StreamExt};
use rand::Rng;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

use crate::error::{BulwarkError, Result};

/// Failure produced by a simulated operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedError {
    /// Injected at random, retryable under the default policy
    Transient,
}

impl std::fmt::Display for SimulatedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulatedError::Transient => write!(f, "injected transient failure"),
        }
    }
}

impl std::error::Error for SimulatedError {}

impl Classify for SimulatedError {
    fn kind(&self) -> Cow<'_, str> {
        match self {
            SimulatedError::Transient => Cow::Borrowed("transient"),
        }
    }
}

/// Shape of the synthetic workload
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOptions {
    /// Number of `execute` calls
    pub requests: u64,
    /// Calls in flight at once
    pub concurrency: usize,
    /// Probability that a single attempt fails
    pub failure_rate: f64,
    /// Time each attempt takes
    pub latency: Duration,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            requests: 100,
            concurrency: 8,
            failure_rate: 0.2,
            latency: Duration::from_millis(10),
        }
    }
}

impl SimulationOptions {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency < 1 {
            return Err(BulwarkError::InvalidArgument {
                name: "concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(BulwarkError::InvalidArgument {
                name: "failure-rate",
                reason: format!("must be between 0.0 and 1.0, got {}", self.failure_rate),
            });
        }
        Ok(())
    }
}

/// Outcome tally for one simulation run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationReport {
    pub resource: String,
    pub requests: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries_exhausted: u64,
    pub circuit_open: u64,
    pub bulkhead_full: u64,
    /// Classified kind of the last operation error, per failed call
    pub failure_kinds: BTreeMap<String, u64>,
    /// Times the operation itself ran, retries included
    pub attempts: u64,
    pub elapsed_ms: u64,
    pub metrics: ResilienceMetrics,
}

impl SimulationReport {
    fn record(&mut self, outcome: std::result::Result<(), ResilienceError<SimulatedError>>) {
        let outcome = outcome.map_err(|e| e.map_operation(|source| source.kind().into_owned()));
        match outcome {
            Ok(()) => self.succeeded += 1,
            Err(ResilienceError::CircuitOpen { .. }) => self.circuit_open += 1,
            Err(ResilienceError::BulkheadFull { .. }) => self.bulkhead_full += 1,
            Err(ResilienceError::RetriesExhausted { source, .. }) => {
                self.retries_exhausted += 1;
                *self.failure_kinds.entry(source).or_default() += 1;
            }
            Err(ResilienceError::Operation(kind)) => {
                self.failed += 1;
                *self.failure_kinds.entry(kind).or_default() += 1;
            }
        }
    }

    /// Calls that were turned away before the operation ran
    pub fn rejected(&self) -> u64 {
        self.circuit_open + self.bulkhead_full
    }
}

/// Run `options.requests` synthetic operations through `manager`
pub async fn run_simulation(
    manager: &ResilienceManager,
    resource: &str,
    options: &SimulationOptions,
) -> Result<SimulationReport> {
    options.validate()?;

    info!(
        resource,
        requests = options.requests,
        concurrency = options.concurrency,
        failure_rate = options.failure_rate,
        "Starting simulation"
    );

    let attempts = AtomicU64::new(0);
    let started = Instant::now();

    let operation = || {
        attempts.fetch_add(1, Ordering::Relaxed);
        let fail = rand::rng().random_bool(options.failure_rate);
        let latency = options.latency;
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if fail {
                Err(SimulatedError::Transient)
            } else {
                Ok(())
            }
        }
    };

    let outcomes: Vec<_> = stream::iter(0..options.requests)
        .map(|_| manager.execute(operation))
        .buffer_unordered(options.concurrency)
        .collect()
        .await;

    let mut report = SimulationReport {
        resource: resource.to_string(),
        requests: options.requests,
        ..Default::default()
    };
    for outcome in outcomes {
        report.record(outcome);
    }
    report.attempts = attempts.load(Ordering::Relaxed);
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    report.metrics = manager.metrics();

    info!(
        resource,
        succeeded = report.succeeded,
        rejected = report.rejected(),
        elapsed_ms = report.elapsed_ms,
        "Simulation finished"
    );

    Ok(report)
}

/// Create a styled data table
fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(title: &str) -> Cell {
    Cell::new(title)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Outcome tally followed by the flattened metrics snapshot
pub fn render_table(report: &SimulationReport) -> String {
    let mut outcomes = create_table();
    outcomes.set_header(vec![header("Outcome"), header("Count")]);

    let rows = [
        ("succeeded", report.succeeded, Color::Green),
        ("failed", report.failed, Color::Red),
        ("retries exhausted", report.retries_exhausted, Color::Red),
        ("circuit open", report.circuit_open, Color::Yellow),
        ("bulkhead full", report.bulkhead_full, Color::Yellow),
    ];
    for (label, count, color) in rows {
        outcomes.add_row(vec![Cell::new(label), Cell::new(count).fg(color)]);
    }
    outcomes.add_row(vec![
        Cell::new("operation attempts").fg(Color::DarkGrey),
        Cell::new(report.attempts).fg(Color::DarkGrey),
    ]);
    for (kind, count) in &report.failure_kinds {
        outcomes.add_row(vec![
            Cell::new(format!("failed as {}", kind)).fg(Color::DarkGrey),
            Cell::new(count).fg(Color::DarkGrey),
        ]);
    }

    let mut metrics = create_table();
    metrics.set_header(vec![header("Metric"), header("Value")]);
    for (key, value) in report.metrics.to_flat_map() {
        metrics.add_row(vec![Cell::new(key), Cell::new(value)]);
    }

    format!(
        "Resource '{}': {} requests in {} ms\n{}\n{}",
        report.resource, report.requests, report.elapsed_ms, outcomes, metrics
    )
}

pub fn render_json(report: &SimulationReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}
