// * Record Store boundary
// * Point lookups and upserts keyed by registration number, plus an in-memory implementation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::persistence::schema::{BacklogRecord, GradeRecord, RegNo, StudentProfile};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Cannot write {kind} for {reg_no}: parent record missing")]
    Orphan { kind: &'static str, reg_no: RegNo },

    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Boxed future returned by store operations
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Keyed persistence required by the ingestion engine.
///
/// Grades hang off a profile and backlogs hang off a grade sheet, all sharing
/// the registration number as key.
pub trait RecordStore: Send + Sync {
    fn find_profile(&self, reg_no: RegNo) -> StoreFuture<'_, Option<StudentProfile>>;
    fn upsert_profile(&self, profile: StudentProfile) -> StoreFuture<'_, ()>;
    fn find_grade(&self, reg_no: RegNo) -> StoreFuture<'_, Option<GradeRecord>>;
    fn upsert_grade(&self, record: GradeRecord) -> StoreFuture<'_, ()>;
    fn find_backlog(&self, reg_no: RegNo) -> StoreFuture<'_, Option<BacklogRecord>>;
    fn upsert_backlog(&self, record: BacklogRecord) -> StoreFuture<'_, ()>;
}

/// Serialisable copy of every record, ordered by registration number
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub profiles: Vec<StudentProfile>,
    pub grades: Vec<GradeRecord>,
    pub backlogs: Vec<BacklogRecord>,
}

#[derive(Debug, Default)]
struct Tables {
    profiles: HashMap<RegNo, StudentProfile>,
    grades: HashMap<RegNo, GradeRecord>,
    backlogs: HashMap<RegNo, BacklogRecord>,
}

/// In-memory record store with JSON snapshot persistence
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let tables = Tables {
            profiles: snapshot
                .profiles
                .into_iter()
                .map(|p| (p.registration_number, p))
                .collect(),
            grades: snapshot
                .grades
                .into_iter()
                .map(|g| (g.registration_number, g))
                .collect(),
            backlogs: snapshot
                .backlogs
                .into_iter()
                .map(|b| (b.registration_number, b))
                .collect(),
        };
        Self {
            tables: RwLock::new(tables),
        }
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;

        let mut snapshot = StoreSnapshot {
            profiles: tables.profiles.values().cloned().collect(),
            grades: tables.grades.values().cloned().collect(),
            backlogs: tables.backlogs.values().cloned().collect(),
        };
        snapshot.profiles.sort_by_key(|p| p.registration_number);
        snapshot.grades.sort_by_key(|g| g.registration_number);
        snapshot.backlogs.sort_by_key(|b| b.registration_number);
        Ok(snapshot)
    }

    /// Loads a snapshot file; a missing file yields an empty store
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;
                tracing::info!(
                    path = %path.display(),
                    profiles = snapshot.profiles.len(),
                    "Record store snapshot loaded"
                );
                Ok(Self::from_snapshot(snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        let snapshot = self.snapshot()?;
        let json = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(path, json).await?;
        tracing::info!(
            path = %path.display(),
            profiles = snapshot.profiles.len(),
            "Record store snapshot saved"
        );
        Ok(())
    }

    pub fn profile_count(&self) -> usize {
        self.tables.read().map(|t| t.profiles.len()).unwrap_or(0)
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&tables))
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        f(&mut tables)
    }
}

impl RecordStore for InMemoryRecordStore {
    fn find_profile(&self, reg_no: RegNo) -> StoreFuture<'_, Option<StudentProfile>> {
        let result = self.read(|t| t.profiles.get(&reg_no).cloned());
        Box::pin(async move { result })
    }

    fn upsert_profile(&self, profile: StudentProfile) -> StoreFuture<'_, ()> {
        let result = self.write(|t| {
            t.profiles.insert(profile.registration_number, profile);
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn find_grade(&self, reg_no: RegNo) -> StoreFuture<'_, Option<GradeRecord>> {
        let result = self.read(|t| t.grades.get(&reg_no).cloned());
        Box::pin(async move { result })
    }

    fn upsert_grade(&self, record: GradeRecord) -> StoreFuture<'_, ()> {
        let result = self.write(|t| {
            let reg_no = record.registration_number;
            if !t.profiles.contains_key(&reg_no) {
                return Err(StoreError::Orphan { kind: "grade", reg_no });
            }
            t.grades.insert(reg_no, record);
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn find_backlog(&self, reg_no: RegNo) -> StoreFuture<'_, Option<BacklogRecord>> {
        let result = self.read(|t| t.backlogs.get(&reg_no).cloned());
        Box::pin(async move { result })
    }

    fn upsert_backlog(&self, record: BacklogRecord) -> StoreFuture<'_, ()> {
        let result = self.write(|t| {
            let reg_no = record.registration_number;
            if !t.grades.contains_key(&reg_no) {
                return Err(StoreError::Orphan { kind: "backlog", reg_no });
            }
            t.backlogs.insert(reg_no, record);
            Ok(())
        });
        Box::pin(async move { result })
    }
}

// * Shared ownership between the controller task and the HTTP surface
impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn find_profile(&self, reg_no: RegNo) -> StoreFuture<'_, Option<StudentProfile>> {
        (**self).find_profile(reg_no)
    }

    fn upsert_profile(&self, profile: StudentProfile) -> StoreFuture<'_, ()> {
        (**self).upsert_profile(profile)
    }

    fn find_grade(&self, reg_no: RegNo) -> StoreFuture<'_, Option<GradeRecord>> {
        (**self).find_grade(reg_no)
    }

    fn upsert_grade(&self, record: GradeRecord) -> StoreFuture<'_, ()> {
        (**self).upsert_grade(record)
    }

    fn find_backlog(&self, reg_no: RegNo) -> StoreFuture<'_, Option<BacklogRecord>> {
        (**self).find_backlog(reg_no)
    }

    fn upsert_backlog(&self, record: BacklogRecord) -> StoreFuture<'_, ()> {
        (**self).upsert_backlog(record)
    }
}
