// * Job Controller
// * IDLE -> RUNNING -> IDLE. At most one batch at a time; requests during a run are
// * rejected, never queued. The admission flag is claimed before anything is spawned.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::EngineSettings;
use crate::engine::pipeline::{process_record, PollingPolicy};
use crate::engine::registry::{build_target_url, validate_template, SourceRegistry};
use crate::network::{NavigationThrottle, SessionFactory};
use crate::ops::telemetry::{record_batch_result, IngestionTelemetry, TelemetrySnapshot};
use crate::persistence::schema::RegNo;
use crate::persistence::store::RecordStore;

pub const STATUS_FINALIZED: &str = "Batch Ingestion Finalized Successfully.";
pub const STATUS_CANCELLED: &str = "Batch Ingestion Cancelled.";

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Invalid range: start {start} is greater than end {end}")]
    InvalidRange { start: RegNo, end: RegNo },

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Invalid URL template {template}: {source}")]
    InvalidTemplate {
        template: String,
        #[source]
        source: url::ParseError,
    },

    #[error("A batch is already running")]
    Busy,
}

/// Immediate answer to a start request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchAck {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BatchAck {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(error: &AdmissionError) -> Self {
        Self {
            accepted: false,
            reason: Some(error.to_string()),
        }
    }
}

/// How a batch ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BatchEnd {
    Completed,
    Cancelled,
    Aborted(String),
}

impl BatchEnd {
    fn metric_label(&self) -> &'static str {
        match self {
            BatchEnd::Completed => "completed",
            BatchEnd::Cancelled => "cancelled",
            BatchEnd::Aborted(_) => "aborted",
        }
    }

    fn status(&self) -> String {
        match self {
            BatchEnd::Completed => STATUS_FINALIZED.to_string(),
            BatchEnd::Cancelled => STATUS_CANCELLED.to_string(),
            BatchEnd::Aborted(reason) => format!("Batch Aborted: {reason}"),
        }
    }
}

/// Returned by the batch task once the controller is IDLE again
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub end: BatchEnd,
    pub progress: TelemetrySnapshot,
}

struct ControllerInner {
    registry: SourceRegistry,
    store: Arc<dyn RecordStore>,
    sessions: Arc<dyn SessionFactory>,
    telemetry: Arc<IngestionTelemetry>,
    policy: PollingPolicy,
    navigations_per_second: u32,
    running: AtomicBool,
    cancel_requested: AtomicBool,
    // * Serializes claim, cancel and release so none of them interleave
    admission: Mutex<()>,
}

impl ControllerInner {
    fn admission(&self) -> MutexGuard<'_, ()> {
        self.admission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Finalizes telemetry and frees the slot in one step, so a client that
    /// sees `running == false` can start the next batch straight away.
    fn release(&self, status: &str) -> TelemetrySnapshot {
        let _admission = self.admission();
        self.telemetry.finish(status);
        let progress = self.telemetry.snapshot();
        self.cancel_requested.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        progress
    }
}

// * Releases the admission flag even if the batch task unwinds
struct AdmissionGuard {
    inner: Arc<ControllerInner>,
    released: bool,
}

impl AdmissionGuard {
    fn release(mut self, status: &str) -> TelemetrySnapshot {
        self.released = true;
        self.inner.release(status)
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        if !self.released {
            self.inner.release("Batch Aborted: task ended unexpectedly");
        }
    }
}

/// Single-flight ingestion controller; cheap to clone
#[derive(Clone)]
pub struct JobController {
    inner: Arc<ControllerInner>,
}

impl JobController {
    pub fn new(
        settings: &EngineSettings,
        registry: SourceRegistry,
        store: Arc<dyn RecordStore>,
        sessions: Arc<dyn SessionFactory>,
        telemetry: Arc<IngestionTelemetry>,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                registry,
                store,
                sessions,
                telemetry,
                policy: PollingPolicy::from_settings(settings),
                navigations_per_second: settings.navigations_per_second,
                running: AtomicBool::new(false),
                cancel_requested: AtomicBool::new(false),
                admission: Mutex::new(()),
            }),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.inner.registry
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.inner.telemetry.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Starts a batch in the background and acknowledges immediately
    pub fn start_batch(&self, source: &str, start: RegNo, end: RegNo) -> BatchAck {
        match self.try_start(source, start, end) {
            Ok(_) => BatchAck::accepted(),
            Err(e) => {
                warn!(source, start, end, error = %e, "Batch rejected");
                BatchAck::rejected(&e)
            }
        }
    }

    /// Admits and spawns a batch; the handle resolves once the controller is IDLE again.
    ///
    /// Rejections never touch telemetry.
    pub fn try_start(
        &self,
        source: &str,
        start: RegNo,
        end: RegNo,
    ) -> Result<JoinHandle<BatchSummary>, AdmissionError> {
        if start > end {
            return Err(AdmissionError::InvalidRange { start, end });
        }

        let template = self
            .inner
            .registry
            .resolve_template(source)
            .ok_or_else(|| AdmissionError::UnknownSource(source.to_string()))?;
        validate_template(&template).map_err(|source| AdmissionError::InvalidTemplate {
            template: template.clone(),
            source,
        })?;

        let total = (end - start).saturating_add(1);
        {
            let _admission = self.inner.admission();
            self.inner
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .map_err(|_| AdmissionError::Busy)?;
            self.inner.cancel_requested.store(false, Ordering::SeqCst);
            self.inner.telemetry.begin(total);
        }
        info!(source, start, end, total, "Batch admitted");

        let guard = AdmissionGuard {
            inner: Arc::clone(&self.inner),
            released: false,
        };
        Ok(tokio::spawn(run_batch(guard, template, start, end)))
    }

    /// Asks the running batch to stop before its next record; false when idle
    pub fn cancel(&self) -> bool {
        let _admission = self.inner.admission();
        if !self.is_running() {
            return false;
        }
        self.inner.cancel_requested.store(true, Ordering::SeqCst);
        info!("Batch cancellation requested");
        true
    }
}

async fn run_batch(guard: AdmissionGuard, template: String, start: RegNo, end: RegNo) -> BatchSummary {
    let inner = Arc::clone(&guard.inner);
    let telemetry = &inner.telemetry;

    let end_state = match inner.sessions.open().await {
        Ok(session) => {
            let throttle = NavigationThrottle::per_second(inner.navigations_per_second);
            let mut layout = None;
            let mut end_state = BatchEnd::Completed;

            for reg_no in start..=end {
                if inner.cancel_requested.load(Ordering::SeqCst) {
                    info!(reg_no, "Batch cancelled before record");
                    end_state = BatchEnd::Cancelled;
                    break;
                }

                throttle.acquire().await;
                let url = build_target_url(&template, reg_no);
                let started = Instant::now();

                match process_record(
                    session.as_ref(),
                    inner.store.as_ref(),
                    &url,
                    reg_no,
                    &mut layout,
                    &inner.policy,
                )
                .await
                {
                    Ok(outcome) => telemetry.record(reg_no, &outcome, started.elapsed()),
                    Err(e) => {
                        error!(reg_no, url = %url, error = %e, "Critical session failure, aborting batch");
                        telemetry.record_critical(&e.to_string());
                        end_state = BatchEnd::Aborted(e.to_string());
                        break;
                    }
                }
            }

            session.close().await;
            end_state
        }
        Err(e) => {
            error!(error = %e, "Browser session could not be opened");
            BatchEnd::Aborted(e.to_string())
        }
    };

    record_batch_result(end_state.metric_label());
    let progress = guard.release(&end_state.status());
    info!(
        processed = progress.processed_count,
        indexed = progress.indexed_count,
        skipped = progress.skipped_count,
        failed = progress.failed_count,
        "Batch finished"
    );

    BatchSummary {
        end: end_state,
        progress,
    }
}
