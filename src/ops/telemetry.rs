// * Telemetry - JSON Logging, Prometheus Metrics and batch progress
// * Provides structured logging, outcome counters and the progress read model

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::engine::pipeline::RecordOutcome;
use crate::persistence::schema::RegNo;

const DEFAULT_FILTER: &str = "transcript_flow=debug,info";

pub const STATUS_IDLE: &str = "Idle";

lazy_static! {
    // * Records finished, by outcome
    pub static ref RECORDS_TOTAL: CounterVec = register_counter_vec!(
        "transcript_records_total",
        "Total registration numbers processed by outcome",
        &["outcome"]
    ).unwrap();

    // * Batches finished, by how they ended
    pub static ref BATCHES_TOTAL: CounterVec = register_counter_vec!(
        "transcript_batches_total",
        "Total ingestion batches by result",
        &["result"]
    ).unwrap();

    // * 1 while a batch holds the admission flag
    pub static ref BATCH_RUNNING: Gauge = register_gauge!(
        "transcript_batch_running",
        "Whether an ingestion batch is running"
    ).unwrap();

    // * Wall time per registration number
    pub static ref RECORD_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "transcript_record_duration_seconds",
        "Per-record processing time in seconds",
        &["outcome"],
        vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 80.0]
    ).unwrap();
}

/// Initializes the tracing subscriber with JSON formatting
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initializes tracing with pretty formatting (for development)
pub fn init_tracing_pretty() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().pretty())
        .init();
}

/// Returns the current metrics in the Prometheus text format
pub fn get_metrics_string() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Metrics encoding failed");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_outcome_metric(outcome: &str, elapsed: Duration) {
    RECORDS_TOTAL.with_label_values(&[outcome]).inc();
    RECORD_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64());
}

pub fn record_batch_result(result: &str) {
    BATCHES_TOTAL.with_label_values(&[result]).inc();
}

/// Point-in-time copy of batch progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub processed_count: u64,
    pub total_count: u64,
    pub running: bool,
    pub last_status: String,
    pub indexed_count: u64,
    pub skipped_count: u64,
    pub failed_count: u64,
}

/// Progress counters for the current (or last) batch.
///
/// Updated after every record, so a poll always sees the latest completion.
#[derive(Debug)]
pub struct IngestionTelemetry {
    processed: AtomicU64,
    total: AtomicU64,
    running: AtomicBool,
    indexed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    last_status: RwLock<String>,
}

impl Default for IngestionTelemetry {
    fn default() -> Self {
        Self {
            processed: AtomicU64::new(0),
            total: AtomicU64::new(0),
            running: AtomicBool::new(false),
            indexed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            last_status: RwLock::new(STATUS_IDLE.to_string()),
        }
    }
}

impl IngestionTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every counter for a new batch of `total` records
    pub fn begin(&self, total: u64) {
        self.processed.store(0, Ordering::SeqCst);
        self.indexed.store(0, Ordering::SeqCst);
        self.skipped.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        self.set_status(format!("Batch Started: {total} records"));
        BATCH_RUNNING.set(1.0);
    }

    pub fn record(&self, reg_no: RegNo, outcome: &RecordOutcome, elapsed: Duration) {
        let counter = match outcome {
            RecordOutcome::Ready(_) => &self.indexed,
            RecordOutcome::Skipped(_) => &self.skipped,
            RecordOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.set_status(outcome.status_line(reg_no));
        record_outcome_metric(outcome.label(), elapsed);
    }

    /// Counts the record that hit a batch-fatal fault
    pub fn record_critical(&self, message: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.set_status(format!("Error: {message}"));
        record_outcome_metric("failed", Duration::ZERO);
    }

    pub fn finish(&self, status: impl Into<String>) {
        self.set_status(status.into());
        self.running.store(false, Ordering::SeqCst);
        BATCH_RUNNING.set(0.0);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, status: String) {
        match self.last_status.write() {
            Ok(mut guard) => *guard = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
    }

    pub fn status(&self) -> String {
        match self.last_status.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            processed_count: self.processed.load(Ordering::SeqCst),
            total_count: self.total.load(Ordering::SeqCst),
            running: self.is_running(),
            last_status: self.status(),
            indexed_count: self.indexed.load(Ordering::SeqCst),
            skipped_count: self.skipped.load(Ordering::SeqCst),
            failed_count: self.failed.load(Ordering::SeqCst),
        }
    }
}
