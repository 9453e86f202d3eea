//! Browser error types.

use thiserror::Error;

/// Errors that can occur while driving a page.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser not available: {0}")]
    BrowserNotAvailable(String),

    #[error("unsupported browser: {0}")]
    UnsupportedBrowser(String),

    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("JavaScript evaluation failed: {0}")]
    JsEvalFailed(String),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BrowserError {
    /// Whether this error is the library's timeout, the one
    /// [`catch_timeout`](crate::surf::catch_timeout) translates.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        match err {
            chromiumoxide::error::CdpError::Timeout => BrowserError::Timeout(err.to_string()),
            other => BrowserError::Cdp(other.to_string()),
        }
    }
}
