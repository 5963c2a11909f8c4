use thiserror::Error;

// * Unified Error type for the browser session layer.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("Page navigation failed: {0}")]
    Navigation(String),

    #[error("Page timeout after {0}ms")]
    Timeout(u64),

    #[error("Content extraction failed: {0}")]
    ContentRead(String),

    #[error("Browser crashed: {0}")]
    BrowserCrash(String),
}

impl SessionError {
    /// Batch-fatal faults; everything else only costs the current record
    pub fn is_critical(&self) -> bool {
        match self {
            SessionError::BrowserLaunch(_) | SessionError::BrowserCrash(_) => true,
            SessionError::Navigation(_) | SessionError::Timeout(_) | SessionError::ContentRead(_) => {
                false
            }
        }
    }
}
