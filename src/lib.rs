//! Headless-browser scraper for paginated business directories
//!
//! One fetch cycle launches a browser, loads a listing page, waits for its
//! dynamic content and maps every listing fragment to a [`Record`]:
//! - Declarative field schema (CSS selector + text / html / attribute accessor)
//! - `"N/A"` sentinel for missing fields, multi-match fields joined
//! - Next-page resolution from a "next" link or a page counter
//! - Guaranteed browser teardown, cancellation and deadlines
//! - Multi-page walks as a `Stream`
//! - JSON request/response boundary

pub mod boundary;
pub mod browser;
pub mod config;
pub mod error;
pub mod extractors;
pub mod orchestrator;
pub mod pagination;
pub mod schema;
pub mod walker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use boundary::{handle_json, handle_request, ScrapeReply, ScrapeRequest, ScrapeResponse};
pub use browser::{BrowserLauncher, BrowserSession, ChromeLauncher, SessionState};
pub use config::{ScrapeConfig, SessionConfig, SiteProfile};
pub use error::{ErrorKind, Result, ScrapeError};
pub use extractors::{Record, SENTINEL};
pub use orchestrator::{validate_target, FetchRequest, FetchResult, Scraper};
pub use pagination::{NextTarget, PaginationMode, PaginationState};
pub use schema::{ExtractionSchema, FieldSpec};
pub use walker::{collect_records, walk_pages, WalkOptions};
