// * The Engine (Batch Ingestion)
// * Source resolution, the per-record pipeline and the single-flight job controller

pub mod controller;
pub mod pipeline;
pub mod registry;

// * Re-exports for convenient access
pub use controller::{AdmissionError, BatchAck, BatchEnd, BatchSummary, JobController};
pub use pipeline::{
    await_data_completeness, evaluate_snapshot, persist_record, process_record, PollingPolicy,
    RecordOutcome, SkipReason,
};
pub use registry::{build_target_url, validate_template, SourceRegistry};
