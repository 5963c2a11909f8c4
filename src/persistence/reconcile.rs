// * Reconciliation Engine
// * Merges freshly scraped grades and remarks into stored records without regressing them.
// *
// * Rules:
// * 1. Per-semester scores keep the numerically larger value; NA/blank/dash never overwrite.
// * 2. CGPA is a high-water mark: only data from a semester at or beyond the highest
// *    semester already holding a score may replace it.
// * 3. Backlog remarks are written into the slot of the observed semester.

use tracing::{debug, warn};

use crate::config::constants::PASS;
use crate::persistence::schema::{
    is_absent, semester_index, BacklogRecord, GradeRecord, RegNo, Semester,
};

/// Picks the score to keep for one semester field.
///
/// Ties return `new`; if either side fails to parse as a number `new` wins.
pub fn resolve_higher_score(old: &str, new: &str) -> String {
    if is_absent(new) {
        return old.to_string();
    }
    if is_absent(old) {
        return new.to_string();
    }

    match (old.trim().parse::<f64>(), new.trim().parse::<f64>()) {
        // * NaN and infinities parse but carry no grade
        (_, Ok(new_value)) if !new_value.is_finite() => old.to_string(),
        (Ok(old_value), Ok(new_value)) if old_value > new_value => old.to_string(),
        _ => new.to_string(),
    }
}

/// Highest semester holding a real score, scanning VIII down to I
pub fn max_observed_semester(record: &GradeRecord) -> Option<Semester> {
    Semester::ALL
        .iter()
        .rev()
        .copied()
        .find(|semester| !is_absent(record.score(*semester)))
}

/// Merges an incoming grade sheet into the stored one.
///
/// With no stored record the incoming one is taken as the first observation.
pub fn merge_grades(
    existing: Option<GradeRecord>,
    incoming: GradeRecord,
    incoming_semester: Option<&str>,
) -> GradeRecord {
    let Some(mut target) = existing else {
        return incoming;
    };

    // * Gate is computed against the stored record, before this merge raises it
    let db_max = max_observed_semester(&target).map(Semester::index).unwrap_or(0);
    let incoming_index = semester_index(incoming_semester);

    for semester in Semester::ALL {
        let merged = resolve_higher_score(target.score(semester), incoming.score(semester));
        target.set_score(semester, merged);
    }

    if is_absent(&incoming.cgpa) {
        return target;
    }

    if incoming_index >= db_max {
        target.cgpa = incoming.cgpa;
    } else {
        debug!(
            reg_no = target.registration_number,
            incoming_index,
            db_max,
            "Stale semester scrape, keeping stored CGPA"
        );
    }

    target
}

/// Writes `remarks` (or PASS when empty) into the semester slot named by the label.
///
/// Returns `None` when the label maps to no semester, leaving the store untouched.
pub fn merge_backlog(
    existing: Option<BacklogRecord>,
    reg_no: RegNo,
    semester_label: &str,
    remarks: &str,
) -> Option<BacklogRecord> {
    let Some(semester) = Semester::from_label(semester_label) else {
        warn!(reg_no, label = semester_label, "Unrecognised semester label, backlog not updated");
        return None;
    };

    let remarks = remarks.trim();
    let value = if remarks.is_empty() { PASS } else { remarks };

    let mut backlog = existing.unwrap_or_else(|| BacklogRecord::new(reg_no));
    backlog.set_remark(semester, value.to_string());
    Some(backlog)
}
