// * Portal Adapters
// * Two extraction strategies for the two known result page layouts.
// * Every method degrades to None / "PASS" instead of failing, so one malformed
// * page never aborts a batch.

use regex::Regex;
use scraper::Html;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

use crate::config::constants::{
    DEFAULT_COURSE, LEGACY_COURSE_ID, LEGACY_EXAM_NAME_ID, LEGACY_FATHER_ID, LEGACY_GRID_ID,
    LEGACY_MOTHER_ID, LEGACY_NAME_ID, LEGACY_REMARK_ID, NA, PASS,
};
use crate::persistence::schema::{is_absent, GradeRecord, RegNo, Semester, StudentProfile};
use crate::refinery::dom::{
    element_text, find_by_id, innermost_containing, row_cells, text_by_id, value_after_label,
    SELECTOR_CELL, SELECTOR_TD, SELECTOR_TR,
};

static PATTERN_SEMESTER_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:semester|sem)=([IVX0-9]+)").expect("Invalid semester param regex")
});

static PATTERN_SEMESTER_CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)semester\s*:\s*(.*)").expect("Invalid semester cell regex")
});

// * "105 - Computer Science & Engineering" -> "Computer Science & Engineering"
static PATTERN_BRANCH_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s*-\s*").expect("Invalid branch code regex"));

static SELECTOR_DANGER_SPAN: LazyLock<scraper::Selector> = LazyLock::new(|| {
    scraper::Selector::parse("span.text-danger").expect("Invalid danger span selector")
});

/// Everything one READY page yields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRecord {
    pub profile: StudentProfile,
    pub grades: Option<GradeRecord>,
    pub semester: Option<String>,
    pub remarks: String,
}

/// Extraction strategy for one portal layout
pub trait PortalAdapter: Send + Sync {
    fn layout(&self) -> PortalLayout;

    fn extract_profile(&self, document: &Html, reg_no: RegNo) -> Option<StudentProfile>;

    fn extract_grades(&self, document: &Html, reg_no: RegNo) -> Option<GradeRecord>;

    fn extract_current_semester(&self, document: &Html, page_url: &str) -> Option<String>;

    fn extract_remarks(&self, document: &Html) -> String;

    /// Runs all extractors; `None` when the profile cannot be read
    fn extract(&self, document: &Html, page_url: &str, reg_no: RegNo) -> Option<ExtractedRecord> {
        let profile = self.extract_profile(document, reg_no)?;
        Some(ExtractedRecord {
            profile,
            grades: self.extract_grades(document, reg_no),
            semester: self.extract_current_semester(document, page_url),
            remarks: self.extract_remarks(document),
        })
    }
}

/// Known result page layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PortalLayout {
    /// ASP.NET pages with fixed element ids and a grade grid
    Legacy,
    /// Client-rendered pages with labelled table rows
    Modern,
}

impl PortalLayout {
    /// Probes for the legacy-only grade grid
    pub fn detect(document: &Html) -> Self {
        if find_by_id(document, LEGACY_GRID_ID).is_some() {
            PortalLayout::Legacy
        } else {
            PortalLayout::Modern
        }
    }

    pub fn adapter(self) -> &'static dyn PortalAdapter {
        match self {
            PortalLayout::Legacy => &LegacyPortal,
            PortalLayout::Modern => &ModernPortal,
        }
    }
}

impl fmt::Display for PortalLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortalLayout::Legacy => write!(f, "legacy"),
            PortalLayout::Modern => write!(f, "modern"),
        }
    }
}

/// Trimmed cell text, or the NA sentinel when missing, blank, "-" or "NA"
pub fn normalize_cell(cells: &[String], index: usize) -> String {
    match cells.get(index) {
        Some(value) if !is_absent(value) => value.trim().to_string(),
        _ => NA.to_string(),
    }
}

fn grades_from_cells(reg_no: RegNo, cells: &[String], first_semester_column: usize) -> GradeRecord {
    let mut record = GradeRecord::empty(reg_no);
    for semester in Semester::ALL {
        let column = first_semester_column + usize::from(semester.index() - 1);
        record.set_score(semester, normalize_cell(cells, column));
    }
    record.cgpa = normalize_cell(cells, first_semester_column + Semester::ALL.len());
    record
}

/// `semester=` / `sem=` query parameter of the page URL
pub fn semester_from_url(page_url: &str) -> Option<String> {
    PATTERN_SEMESTER_PARAM
        .captures(page_url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Client-rendered result pages
#[derive(Debug, Clone, Copy, Default)]
pub struct ModernPortal;

impl PortalAdapter for ModernPortal {
    fn layout(&self) -> PortalLayout {
        PortalLayout::Modern
    }

    fn extract_profile(&self, document: &Html, reg_no: RegNo) -> Option<StudentProfile> {
        let name = non_empty(value_after_label(document, "Student Name"))?;
        let branch = value_after_label(document, "Course Name").unwrap_or_default();

        Some(StudentProfile {
            registration_number: reg_no,
            name,
            father_name: value_after_label(document, "Father").unwrap_or_default(),
            mother_name: value_after_label(document, "Mother").unwrap_or_default(),
            course: DEFAULT_COURSE.to_string(),
            branch: PATTERN_BRANCH_CODE.replace(&branch, "").trim().to_string(),
        })
    }

    fn extract_grades(&self, document: &Html, reg_no: RegNo) -> Option<GradeRecord> {
        // * Label sits in column 0, semesters I..VIII follow, then CGPA
        let row = innermost_containing(document, &SELECTOR_TR, "SGPA").pop()?;
        let cells = row_cells(&row, &SELECTOR_CELL);
        Some(grades_from_cells(reg_no, &cells, 1))
    }

    fn extract_current_semester(&self, document: &Html, page_url: &str) -> Option<String> {
        let from_cell = innermost_containing(document, &SELECTOR_TD, "Semester:")
            .first()
            .and_then(|cell| {
                PATTERN_SEMESTER_CELL
                    .captures(&element_text(cell))
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().trim().to_string())
            });

        non_empty(from_cell).or_else(|| semester_from_url(page_url))
    }

    fn extract_remarks(&self, document: &Html) -> String {
        let flagged: Vec<String> = document
            .select(&SELECTOR_DANGER_SPAN)
            .map(|span| element_text(&span))
            .collect();

        if let Some(fail) = flagged.iter().find(|text| text.to_uppercase().contains("FAIL")) {
            return fail.clone();
        }
        if flagged.iter().any(|text| text.to_uppercase().contains("ABSENT")) {
            return "ABSENT".to_string();
        }
        PASS.to_string()
    }
}

/// ASP.NET result pages
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyPortal;

impl PortalAdapter for LegacyPortal {
    fn layout(&self) -> PortalLayout {
        PortalLayout::Legacy
    }

    fn extract_profile(&self, document: &Html, reg_no: RegNo) -> Option<StudentProfile> {
        let name = non_empty(text_by_id(document, LEGACY_NAME_ID))?;

        Some(StudentProfile {
            registration_number: reg_no,
            name,
            father_name: text_by_id(document, LEGACY_FATHER_ID).unwrap_or_default(),
            mother_name: text_by_id(document, LEGACY_MOTHER_ID).unwrap_or_default(),
            course: DEFAULT_COURSE.to_string(),
            branch: text_by_id(document, LEGACY_COURSE_ID).unwrap_or_default(),
        })
    }

    fn extract_grades(&self, document: &Html, reg_no: RegNo) -> Option<GradeRecord> {
        // * Row 0 is the grid header; semesters start at column 0
        let grid = find_by_id(document, LEGACY_GRID_ID)?;
        let row = grid.select(&SELECTOR_TR).nth(1)?;
        let cells = row_cells(&row, &SELECTOR_TD);
        Some(grades_from_cells(reg_no, &cells, 0))
    }

    fn extract_current_semester(&self, document: &Html, page_url: &str) -> Option<String> {
        match non_empty(text_by_id(document, LEGACY_EXAM_NAME_ID)) {
            Some(label) if Semester::from_label(&label).is_some() => Some(label),
            // * Exam titles that name no semester lose to an explicit URL parameter
            Some(label) => semester_from_url(page_url).or(Some(label)),
            None => semester_from_url(page_url),
        }
    }

    fn extract_remarks(&self, document: &Html) -> String {
        non_empty(text_by_id(document, LEGACY_REMARK_ID)).unwrap_or_else(|| PASS.to_string())
    }
}
