//! Typed errors for one scrape cycle.
//!
//! Field-level misses are not errors: a selector that matches nothing
//! becomes the sentinel value in the record. Everything here is fatal for
//! the cycle it happens in.

use std::time::Duration;

use thiserror::Error;

/// Errors that can end a scrape cycle.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Target URL missing or not an absolute http(s) URL.
    /// Raised before any browser is launched.
    #[error("{reason}")]
    Validation { reason: String },

    /// Browser process failed to start
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// Network, DNS or protocol failure while loading the page
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// Expected content never appeared on an otherwise loaded page
    #[error("timed out after {}ms waiting for `{selector}`", .timeout.as_millis())]
    ReadinessTimeout { selector: String, timeout: Duration },

    /// Reading the loaded DOM back from the browser failed
    #[error("failed to read page content: {0}")]
    Snapshot(String),

    /// Browser process could not be shut down cleanly
    #[error("browser teardown failed: {0}")]
    Teardown(String),

    /// Caller cancelled the cycle
    #[error("scrape cancelled")]
    Cancelled,

    /// Caller-supplied deadline elapsed
    #[error("scrape deadline of {}ms exceeded", .budget.as_millis())]
    Deadline { budget: Duration },

    /// CSS selector failed to parse
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// Extraction schema is malformed (duplicate or empty field names, bad accessor)
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Configuration could not be loaded
    #[error("config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of [`ScrapeError`], for retry policy and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Launch,
    Navigation,
    /// Usually "zero results" or "site layout changed", not an outage.
    ReadinessTimeout,
    Snapshot,
    Teardown,
    Cancelled,
    Deadline,
    Configuration,
}

impl ScrapeError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        ScrapeError::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn navigation(url: impl Into<String>, reason: impl Into<String>) -> Self {
        ScrapeError::Navigation {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeError::Validation { .. } => ErrorKind::Validation,
            ScrapeError::Launch(_) => ErrorKind::Launch,
            ScrapeError::Navigation { .. } => ErrorKind::Navigation,
            ScrapeError::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
            ScrapeError::Snapshot(_) => ErrorKind::Snapshot,
            ScrapeError::Teardown(_) => ErrorKind::Teardown,
            ScrapeError::Cancelled => ErrorKind::Cancelled,
            ScrapeError::Deadline { .. } => ErrorKind::Deadline,
            ScrapeError::InvalidSelector { .. }
            | ScrapeError::InvalidSchema(_)
            | ScrapeError::Config(_)
            | ScrapeError::Json(_)
            | ScrapeError::Io(_) => ErrorKind::Configuration,
        }
    }

    /// Bad input from the caller, as opposed to an internal failure.
    pub fn is_client_error(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

/// Result type alias for scrape operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;
