// * DOM helpers over scraper snapshots
// * Emulates the locator patterns the result portals need: "row containing label",
// * "innermost table containing text" and plain id lookup.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

// * Precompiled CSS selectors for performance
pub static SELECTOR_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("Invalid table selector"));
pub static SELECTOR_TR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("Invalid tr selector"));
pub static SELECTOR_TD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("Invalid td selector"));
pub static SELECTOR_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td, th").expect("Invalid cell selector"));
static SELECTOR_WITH_ID: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[id]").expect("Invalid id selector"));
static SELECTOR_BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("Invalid body selector"));

/// Visible-ish text of an element with whitespace (including NBSP) collapsed
pub fn element_text(element: &ElementRef) -> String {
    let raw: String = element.text().collect();
    collapse_whitespace(&raw)
}

pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

// * Elements whose text never renders
const NON_RENDERED_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Rendered text under `element`: script, style, noscript and template bodies are left out
pub fn rendered_text(element: &ElementRef) -> String {
    let raw: String = element
        .descendants()
        .filter_map(|node| node.value().as_text().map(|text| (node, text)))
        .filter(|(node, _)| {
            !node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| NON_RENDERED_TAGS.contains(&el.name()))
            })
        })
        .map(|(_, text)| &**text)
        .collect();
    collapse_whitespace(&raw)
}

/// Rendered text of the whole body, falling back to the root element
pub fn document_text(document: &Html) -> String {
    match document.select(&SELECTOR_BODY).next() {
        Some(body) => rendered_text(&body),
        None => rendered_text(&document.root_element()),
    }
}

pub fn find_by_id<'a>(document: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    document
        .select(&SELECTOR_WITH_ID)
        .find(|element| element.value().id() == Some(id))
}

pub fn text_by_id(document: &Html, id: &str) -> Option<String> {
    find_by_id(document, id).map(|element| element_text(&element))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Elements matching `selector` whose text contains `needle`, keeping only the
/// innermost ones (an outer layout table that merely wraps a match is dropped).
/// Document order is preserved.
pub fn innermost_containing<'a>(
    document: &'a Html,
    selector: &Selector,
    needle: &str,
) -> Vec<ElementRef<'a>> {
    let candidates: Vec<ElementRef<'a>> = document
        .select(selector)
        .filter(|element| contains_ignore_case(&element_text(element), needle))
        .collect();

    candidates
        .iter()
        .filter(|outer| {
            !candidates.iter().any(|inner| {
                inner.id() != outer.id() && inner.ancestors().any(|a| a.id() == outer.id())
            })
        })
        .copied()
        .collect()
}

/// Trimmed texts of the cells of a row
pub fn row_cells(row: &ElementRef, cell_selector: &Selector) -> Vec<String> {
    row.select(cell_selector).map(|cell| element_text(&cell)).collect()
}

/// Text of the cell following the `label` cell, from the first row where the
/// label sits in a data cell with another cell after it.
///
/// Rows that pack two pairs ("Father's Name | X | Mother's Name | Y") resolve
/// each label to its own value.
pub fn value_after_label(document: &Html, label: &str) -> Option<String> {
    innermost_containing(document, &SELECTOR_TR, label)
        .into_iter()
        .find_map(|row| {
            let cells = row_cells(&row, &SELECTOR_TD);
            let position = cells
                .iter()
                .position(|cell| contains_ignore_case(cell, label))?;
            cells.into_iter().nth(position + 1)
        })
}

/// Number of rows in the innermost table containing `needle`, if such a table exists
pub fn table_row_count(document: &Html, needle: &str) -> Option<usize> {
    innermost_containing(document, &SELECTOR_TABLE, needle)
        .into_iter()
        .next()
        .map(|table| table.select(&SELECTOR_TR).count())
}
