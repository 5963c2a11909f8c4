// * Canonical record schema
// * Profiles, grade sheets and backlog remarks keyed by registration number

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::config::constants::NA;

pub type RegNo = u64;

// * "5th Semester", "2nd sem"
static PATTERN_ORDINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([1-8])\s*(?:st|nd|rd|th)\b").expect("Invalid ordinal semester regex")
});

// * "Semester: VI", "Sem-3"
static PATTERN_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bsem(?:ester)?\b[^A-Za-z0-9]*([IVX]+|[1-8])\b")
        .expect("Invalid labelled semester regex")
});

/// Template for one result portal page, keyed by a human-readable name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub key: String,
    pub url_template: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl SourceLink {
    pub fn new(key: impl Into<String>, url_template: impl Into<String>, active: bool) -> Self {
        Self {
            key: key.into(),
            url_template: url_template.into(),
            active,
        }
    }
}

/// Semester ordinal I..VIII
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Semester {
    I,
    II,
    III,
    IV,
    V,
    VI,
    VII,
    VIII,
}

impl Semester {
    pub const ALL: [Semester; 8] = [
        Semester::I,
        Semester::II,
        Semester::III,
        Semester::IV,
        Semester::V,
        Semester::VI,
        Semester::VII,
        Semester::VIII,
    ];

    /// 1-based index
    pub fn index(self) -> u8 {
        self as u8 + 1
    }

    fn slot(self) -> usize {
        self as usize
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1..=8 => Some(Self::ALL[usize::from(index - 1)]),
            _ => None,
        }
    }

    pub fn roman(self) -> &'static str {
        match self {
            Semester::I => "I",
            Semester::II => "II",
            Semester::III => "III",
            Semester::IV => "IV",
            Semester::V => "V",
            Semester::VI => "VI",
            Semester::VII => "VII",
            Semester::VIII => "VIII",
        }
    }

    /// Maps a scraped semester label to its ordinal.
    ///
    /// The label is first reduced to a clean token (uppercase, only digits and
    /// Roman letters kept) and matched exactly; free-text labels such as
    /// `"B.Tech. 5th Semester Examination"` fall back to ordinal patterns.
    pub fn from_label(label: &str) -> Option<Self> {
        let token = clean_token(label);
        if let Some(semester) = Self::from_token(&token) {
            return Some(semester);
        }

        PATTERN_ORDINAL
            .captures(label)
            .or_else(|| PATTERN_LABELLED.captures(label))
            .and_then(|caps| caps.get(1))
            .and_then(|m| Self::from_token(&m.as_str().to_uppercase()))
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "1" | "I" => Some(Semester::I),
            "2" | "II" => Some(Semester::II),
            "3" | "III" => Some(Semester::III),
            "4" | "IV" => Some(Semester::IV),
            "5" | "V" => Some(Semester::V),
            "6" | "VI" => Some(Semester::VI),
            "7" | "VII" => Some(Semester::VII),
            "8" | "VIII" => Some(Semester::VIII),
            _ => None,
        }
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.roman())
    }
}

/// Index of a semester label, 0 when unrecognised
pub fn semester_index(label: Option<&str>) -> u8 {
    label
        .and_then(Semester::from_label)
        .map(Semester::index)
        .unwrap_or(0)
}

// * Uppercase and keep only characters that can form an Arabic or Roman numeral
pub fn clean_token(label: &str) -> String {
    label
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, 'I' | 'V' | 'X'))
        .collect()
}

/// True for every marker that means "no score on this scrape"
pub fn is_absent(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == NA || value == "-"
}

/// Personal details; the registration number never changes once written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub registration_number: RegNo,
    pub name: String,
    pub father_name: String,
    pub mother_name: String,
    pub course: String,
    pub branch: String,
}

/// Per-semester SGPA and running CGPA, "NA" where a value was never observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub registration_number: RegNo,
    pub semesters: [String; 8],
    pub cgpa: String,
}

impl GradeRecord {
    pub fn empty(registration_number: RegNo) -> Self {
        Self {
            registration_number,
            semesters: std::array::from_fn(|_| NA.to_string()),
            cgpa: NA.to_string(),
        }
    }

    pub fn with_score(mut self, semester: Semester, score: impl Into<String>) -> Self {
        self.semesters[semester.slot()] = score.into();
        self
    }

    pub fn with_cgpa(mut self, cgpa: impl Into<String>) -> Self {
        self.cgpa = cgpa.into();
        self
    }

    pub fn score(&self, semester: Semester) -> &str {
        &self.semesters[semester.slot()]
    }

    pub fn set_score(&mut self, semester: Semester, score: String) {
        self.semesters[semester.slot()] = score;
    }
}

/// Per-semester pass/fail remarks; `None` until that semester is observed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogRecord {
    pub registration_number: RegNo,
    pub semesters: [Option<String>; 8],
}

impl BacklogRecord {
    pub fn new(registration_number: RegNo) -> Self {
        Self {
            registration_number,
            semesters: Default::default(),
        }
    }

    pub fn remark(&self, semester: Semester) -> Option<&str> {
        self.semesters[semester.slot()].as_deref()
    }

    pub fn set_remark(&mut self, semester: Semester, remark: String) {
        self.semesters[semester.slot()] = Some(remark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semester_index_roundtrip() {
        for semester in Semester::ALL {
            assert_eq!(Semester::from_index(semester.index()), Some(semester));
        }
        assert_eq!(Semester::from_index(0), None);
        assert_eq!(Semester::from_index(9), None);
    }

    #[test]
    fn test_from_label_roman_and_arabic() {
        assert_eq!(Semester::from_label("V"), Some(Semester::V));
        assert_eq!(Semester::from_label("viii"), Some(Semester::VIII));
        assert_eq!(Semester::from_label(" 3 "), Some(Semester::III));
        assert_eq!(Semester::from_label("Semester: VI"), Some(Semester::VI));
    }

    #[test]
    fn test_from_label_free_text() {
        assert_eq!(
            Semester::from_label("B.Tech. 5th Semester Examination, 2023"),
            Some(Semester::V)
        );
        assert_eq!(Semester::from_label("Sem - II"), Some(Semester::II));
    }

    #[test]
    fn test_from_label_unrecognised() {
        assert_eq!(Semester::from_label(""), None);
        assert_eq!(Semester::from_label("IX"), None);
        assert_eq!(Semester::from_label("Annual"), None);
        assert_eq!(semester_index(None), 0);
        assert_eq!(semester_index(Some("unknown")), 0);
    }

    #[test]
    fn test_is_absent() {
        assert!(is_absent("NA"));
        assert!(is_absent("-"));
        assert!(is_absent("  "));
        assert!(!is_absent("7.5"));
        assert!(!is_absent("0"));
    }

    #[test]
    fn test_grade_record_builders() {
        let record = GradeRecord::empty(42)
            .with_score(Semester::V, "8.2")
            .with_cgpa("8.0");
        assert_eq!(record.score(Semester::V), "8.2");
        assert_eq!(record.score(Semester::I), NA);
        assert_eq!(record.cgpa, "8.0");
    }

    #[test]
    fn test_backlog_slots_start_empty() {
        let mut backlog = BacklogRecord::new(7);
        assert!(Semester::ALL.iter().all(|s| backlog.remark(*s).is_none()));
        backlog.set_remark(Semester::VI, "PASS".to_string());
        assert_eq!(backlog.remark(Semester::VI), Some("PASS"));
    }
}
