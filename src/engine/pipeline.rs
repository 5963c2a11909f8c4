// * Per-record pipeline
// * navigate -> settle -> classify (with bounded polling) -> extract -> reconcile.
// * Each record ends as exactly one RecordOutcome; only a critical session
// * fault escapes as an error.

use scraper::Html;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineSettings;
use crate::network::{PortalSession, SessionError};
use crate::persistence::reconcile::{merge_backlog, merge_grades};
use crate::persistence::schema::RegNo;
use crate::persistence::store::{RecordStore, StoreError};
use crate::refinery::{classify, ExtractedRecord, PageSnapshot, PageState, PortalLayout};

/// Timing of the settle-and-poll phase after each navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    pub settle_delay: Duration,
    pub settle_timeout: Duration,
    pub poll_interval: Duration,
}

impl PollingPolicy {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            settle_delay: settings.settle_delay(),
            settle_timeout: settings.settle_timeout(),
            poll_interval: settings.poll_interval(),
        }
    }
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self::from_settings(&EngineSettings::default())
    }
}

/// Why a record produced no write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Page(PageState),
    /// Classified READY but the adapter could not read a profile
    ParseError,
}

impl SkipReason {
    pub fn describe(self) -> &'static str {
        match self {
            SkipReason::Page(state) => state.describe(),
            SkipReason::ParseError => "Parse Error",
        }
    }
}

/// Final result of one registration number
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Ready(Box<ExtractedRecord>),
    Skipped(SkipReason),
    Failed(String),
}

impl RecordOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RecordOutcome::Ready(_) => "indexed",
            RecordOutcome::Skipped(_) => "skipped",
            RecordOutcome::Failed(_) => "failed",
        }
    }

    /// Human-readable progress line for telemetry
    pub fn status_line(&self, reg_no: RegNo) -> String {
        match self {
            RecordOutcome::Ready(record) => format!("Indexed: {}", record.profile.name),
            RecordOutcome::Skipped(reason) => format!("Skipped ({}): {}", reason.describe(), reg_no),
            RecordOutcome::Failed(message) => format!("Error: {message}"),
        }
    }
}

/// Re-snapshots the page until it settles or `settle_timeout` elapses.
///
/// Returns `Loading` with the last snapshot when the page never settles.
pub async fn await_data_completeness<S>(
    session: &S,
    policy: &PollingPolicy,
) -> Result<(PageState, PageSnapshot), SessionError>
where
    S: PortalSession + ?Sized,
{
    let deadline = Instant::now() + policy.settle_timeout;

    loop {
        let snapshot = session.snapshot().await?;
        let state = classify(&snapshot);
        if state.is_settled() {
            return Ok((state, snapshot));
        }

        if Instant::now() + policy.poll_interval > deadline {
            debug!(url = %snapshot.url, last_state = %state, "Page did not settle in time");
            return Ok((PageState::Loading, snapshot));
        }
        tokio::time::sleep(policy.poll_interval).await;
    }
}

/// Turns a classified snapshot into an outcome without touching the store.
///
/// The portal layout is detected on the first READY page and then reused for
/// the rest of the batch.
pub fn evaluate_snapshot(
    snapshot: &PageSnapshot,
    state: PageState,
    reg_no: RegNo,
    layout: &mut Option<PortalLayout>,
) -> RecordOutcome {
    match state {
        PageState::Ready => {}
        PageState::EmptyTable
        | PageState::NameEmpty
        | PageState::NoRecord
        | PageState::Unknown
        | PageState::Loading => return RecordOutcome::Skipped(SkipReason::Page(state)),
    }

    let document = Html::parse_document(&snapshot.html);
    let layout = *layout.get_or_insert_with(|| {
        let detected = PortalLayout::detect(&document);
        info!(layout = %detected, "Portal layout locked for batch");
        detected
    });

    match layout.adapter().extract(&document, &snapshot.url, reg_no) {
        Some(record) => RecordOutcome::Ready(Box::new(record)),
        None => RecordOutcome::Skipped(SkipReason::ParseError),
    }
}

/// Writes the profile, then reconciles grades and the backlog for the observed semester
pub async fn persist_record<S>(store: &S, record: &ExtractedRecord) -> Result<(), StoreError>
where
    S: RecordStore + ?Sized,
{
    let reg_no = record.profile.registration_number;
    store.upsert_profile(record.profile.clone()).await?;

    let has_grades = match &record.grades {
        Some(incoming) => {
            let existing = store.find_grade(reg_no).await?;
            let merged = merge_grades(existing, incoming.clone(), record.semester.as_deref());
            store.upsert_grade(merged).await?;
            true
        }
        None => store.find_grade(reg_no).await?.is_some(),
    };

    let Some(label) = record.semester.as_deref() else {
        debug!(reg_no, "No semester label resolved, backlog untouched");
        return Ok(());
    };
    if !has_grades {
        debug!(reg_no, "No grade sheet stored, backlog untouched");
        return Ok(());
    }

    let existing = store.find_backlog(reg_no).await?;
    if let Some(backlog) = merge_backlog(existing, reg_no, label, &record.remarks) {
        store.upsert_backlog(backlog).await?;
    }
    Ok(())
}

/// Runs one registration number end to end.
///
/// Soft failures come back as `RecordOutcome::Failed`; `Err` means the session is gone.
pub async fn process_record<S, T>(
    session: &S,
    store: &T,
    url: &str,
    reg_no: RegNo,
    layout: &mut Option<PortalLayout>,
    policy: &PollingPolicy,
) -> Result<RecordOutcome, SessionError>
where
    S: PortalSession + ?Sized,
    T: RecordStore + ?Sized,
{
    let loaded = async {
        session.navigate(url).await?;
        tokio::time::sleep(policy.settle_delay).await;
        await_data_completeness(session, policy).await
    }
    .await;

    let (state, snapshot) = match loaded {
        Ok(loaded) => loaded,
        Err(e) if e.is_critical() => return Err(e),
        Err(e) => {
            warn!(reg_no, url, error = %e, "Record load failed");
            return Ok(RecordOutcome::Failed(e.to_string()));
        }
    };

    let record = match evaluate_snapshot(&snapshot, state, reg_no, layout) {
        RecordOutcome::Ready(record) => record,
        other => {
            debug!(reg_no, state = %state, "Record skipped");
            return Ok(other);
        }
    };

    match persist_record(store, &record).await {
        Ok(()) => {
            info!(reg_no, name = %record.profile.name, "Record indexed");
            Ok(RecordOutcome::Ready(record))
        }
        Err(e) => {
            warn!(reg_no, error = %e, "Record persistence failed");
            Ok(RecordOutcome::Failed(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::schema::{GradeRecord, Semester, StudentProfile};
    use crate::persistence::store::InMemoryRecordStore;
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    const READY_HTML: &str = r#"<html><body>
        <table><tr><td>Student Name</td><td>ASHA KUMARI</td></tr>
        <tr><td>Course Name</td><td>105 - Computer Science</td></tr></table>
        <table><tr><th>Subject Code</th><th>Grade</th></tr>
        <tr><td>100301</td><td>A</td></tr><tr><td>100302</td><td>B</td></tr></table>
        <table><tr><td>SGPA</td><td>7.1</td><td>7.4</td><td>7.9</td><td></td><td></td><td></td><td></td><td></td><td>7.5</td></tr></table>
        </body></html>"#;

    fn record(reg_no: RegNo, semester: Option<&str>, remarks: &str) -> ExtractedRecord {
        ExtractedRecord {
            profile: StudentProfile {
                registration_number: reg_no,
                name: "ASHA KUMARI".into(),
                father_name: String::new(),
                mother_name: String::new(),
                course: "B.Tech".into(),
                branch: "Computer Science".into(),
            },
            grades: Some(GradeRecord::empty(reg_no).with_score(Semester::III, "7.9").with_cgpa("7.5")),
            semester: semester.map(str::to_string),
            remarks: remarks.into(),
        }
    }

    // * Serves the queued pages in order, repeating the last one
    struct SequencedSession(Mutex<Vec<&'static str>>);

    impl PortalSession for SequencedSession {
        fn navigate<'a>(&'a self, _url: &'a str) -> crate::network::SessionFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn snapshot(&self) -> crate::network::SessionFuture<'_, PageSnapshot> {
            Box::pin(async move {
                let mut pages = self.0.lock().unwrap();
                let html = if pages.len() > 1 { pages.remove(0) } else { pages[0] };
                Ok(PageSnapshot::new("https://x.edu/?semester=III", html))
            })
        }

        fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
            Box::pin(async {})
        }
    }

    fn polling(timeout_ms: u64) -> PollingPolicy {
        PollingPolicy {
            settle_delay: Duration::ZERO,
            settle_timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_polling_waits_for_hydration() {
        let session = SequencedSession(Mutex::new(vec![
            "<html><body>loading</body></html>",
            "<html><body>loading</body></html>",
            READY_HTML,
        ]));
        let (state, _) = await_data_completeness(&session, &polling(1_000)).await.unwrap();
        assert_eq!(state, PageState::Ready);
    }

    #[tokio::test]
    async fn test_polling_times_out_as_loading() {
        let session = SequencedSession(Mutex::new(vec!["<html><body>loading</body></html>"]));
        let (state, _) = await_data_completeness(&session, &polling(5)).await.unwrap();
        assert_eq!(state, PageState::Loading);
    }

    #[test]
    fn test_non_ready_states_skip() {
        let snapshot = PageSnapshot::new("https://x.edu/?semester=III", READY_HTML);
        let mut layout = None;
        let outcome = evaluate_snapshot(&snapshot, PageState::NoRecord, 5, &mut layout);
        assert_eq!(outcome, RecordOutcome::Skipped(SkipReason::Page(PageState::NoRecord)));
        assert_eq!(outcome.status_line(5), "Skipped (No Record): 5");
        assert!(layout.is_none());
    }

    #[test]
    fn test_ready_snapshot_extracts_and_locks_layout() {
        let snapshot = PageSnapshot::new("https://x.edu/?semester=III", READY_HTML);
        let mut layout = None;
        let outcome = evaluate_snapshot(&snapshot, PageState::Ready, 5, &mut layout);

        let RecordOutcome::Ready(record) = outcome else {
            panic!("expected ready outcome");
        };
        assert_eq!(layout, Some(PortalLayout::Modern));
        assert_eq!(record.profile.branch, "Computer Science");
        assert_eq!(record.semester.as_deref(), Some("III"));
        assert_eq!(record.grades.unwrap().cgpa, "7.5");
    }

    #[test]
    fn test_locked_layout_is_not_redetected() {
        let snapshot = PageSnapshot::new("https://x.edu/", READY_HTML);
        let mut layout = Some(PortalLayout::Legacy);
        let outcome = evaluate_snapshot(&snapshot, PageState::Ready, 5, &mut layout);
        // * Legacy ids are absent on a modern page, so the profile cannot be read
        assert_eq!(outcome, RecordOutcome::Skipped(SkipReason::ParseError));
        assert_eq!(layout, Some(PortalLayout::Legacy));
    }

    #[tokio::test]
    async fn test_persist_writes_all_three_records() {
        let store = InMemoryRecordStore::new();
        persist_record(&store, &record(9, Some("III"), "")).await.unwrap();

        assert!(store.find_profile(9).await.unwrap().is_some());
        assert_eq!(store.find_grade(9).await.unwrap().unwrap().cgpa, "7.5");
        let backlog = store.find_backlog(9).await.unwrap().unwrap();
        assert_eq!(backlog.remark(Semester::III), Some("PASS"));
    }

    #[tokio::test]
    async fn test_persist_without_semester_skips_backlog() {
        let store = InMemoryRecordStore::new();
        persist_record(&store, &record(9, None, "FAIL")).await.unwrap();
        assert!(store.find_grade(9).await.unwrap().is_some());
        assert!(store.find_backlog(9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persist_without_grades_skips_backlog() {
        let store = InMemoryRecordStore::new();
        let mut incoming = record(9, Some("III"), "");
        incoming.grades = None;
        persist_record(&store, &incoming).await.unwrap();
        assert!(store.find_profile(9).await.unwrap().is_some());
        assert!(store.find_backlog(9).await.unwrap().is_none());
    }

    #[test]
    fn test_status_lines() {
        let ready = RecordOutcome::Ready(Box::new(record(1, None, "")));
        assert_eq!(ready.status_line(1), "Indexed: ASHA KUMARI");
        assert_eq!(ready.label(), "indexed");
        assert_eq!(
            RecordOutcome::Failed("Page timeout after 10ms".into()).status_line(1),
            "Error: Page timeout after 10ms"
        );
        assert_eq!(
            RecordOutcome::Skipped(SkipReason::ParseError).status_line(3),
            "Skipped (Parse Error): 3"
        );
    }
}
