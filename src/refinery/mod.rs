// * The Refinery (Result Page Interpretation)
// * Classifies rendered result pages and extracts canonical records from them.
// * Everything here is pure over HTML snapshots; the browser never leaks in.

pub mod adapters;
pub mod classifier;
pub mod dom;

// * Re-exports for convenient access
pub use adapters::{ExtractedRecord, LegacyPortal, ModernPortal, PortalAdapter, PortalLayout};
pub use classifier::{classify, classify_document, PageState};

use serde::{Deserialize, Serialize};

/// Rendered page as captured from the browser session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Final URL after redirects
    pub url: String,
    /// Serialized DOM
    pub html: String,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}
