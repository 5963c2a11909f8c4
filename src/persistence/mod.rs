// * Persistence & Reconciliation
// * Canonical record schema, the keyed store boundary and the monotonic merge rules

pub mod reconcile;
pub mod schema;
pub mod store;

// * Re-exports for convenient access
pub use reconcile::{max_observed_semester, merge_backlog, merge_grades, resolve_higher_score};
pub use schema::{
    BacklogRecord, GradeRecord, RegNo, Semester, SourceLink, StudentProfile,
};
pub use store::{InMemoryRecordStore, RecordStore, StoreError, StoreFuture, StoreSnapshot};
