// * Page Classifier
// * Decides whether a loaded result page carries a complete record.
// *
// * Priority (first match wins):
// * 1. "no record" banner              -> NoRecord
// * 2. name cell missing / blank       -> Unknown / NameEmpty
// * 3. results table missing / header  -> Unknown / EmptyTable
// * 4. otherwise                       -> Ready

use regex::Regex;
use scraper::Html;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

use crate::config::constants::LEGACY_NAME_ID;
use crate::refinery::dom::{document_text, table_row_count, text_by_id, value_after_label};
use crate::refinery::PageSnapshot;

static PATTERN_NO_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)No Record Found|Invalid Registration|Data Not Available")
        .expect("Invalid no-record regex")
});

const NAME_LABEL: &str = "Student Name";
const RESULTS_TABLE_MARKER: &str = "Subject Code";

// * Header row plus at least one subject row
const MIN_READY_ROWS: usize = 3;

/// Data-completeness state of a result page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageState {
    /// Name and a populated results table are present
    Ready,
    /// Results table rendered with no subject rows
    EmptyTable,
    /// Name cell present but blank
    NameEmpty,
    /// Portal reported that the registration number has no result
    NoRecord,
    /// Neither layout's markers were found
    Unknown,
    /// Polling gave up before the page settled
    Loading,
}

impl PageState {
    /// States that end the polling loop early
    pub fn is_settled(self) -> bool {
        match self {
            PageState::Ready | PageState::EmptyTable | PageState::NameEmpty | PageState::NoRecord => {
                true
            }
            PageState::Unknown | PageState::Loading => false,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            PageState::Ready => "Ready",
            PageState::EmptyTable => "Empty Table",
            PageState::NameEmpty => "Name Empty",
            PageState::NoRecord => "No Record",
            PageState::Unknown => "Unknown State",
            PageState::Loading => "Still Loading",
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

pub fn classify(snapshot: &PageSnapshot) -> PageState {
    let document = Html::parse_document(&snapshot.html);
    classify_document(&document)
}

pub fn classify_document(document: &Html) -> PageState {
    if PATTERN_NO_RECORD.is_match(&document_text(document)) {
        return PageState::NoRecord;
    }

    let name = value_after_label(document, NAME_LABEL).or_else(|| text_by_id(document, LEGACY_NAME_ID));
    match name {
        None => return PageState::Unknown,
        Some(name) if is_blank_name(&name) => return PageState::NameEmpty,
        Some(_) => {}
    }

    match table_row_count(document, RESULTS_TABLE_MARKER) {
        None => PageState::Unknown,
        Some(rows) if rows < MIN_READY_ROWS => PageState::EmptyTable,
        Some(_) => PageState::Ready,
    }
}

// * NBSP is already collapsed by the text helpers; the literal entity can survive double-escaping
fn is_blank_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name == "&nbsp;"
}
