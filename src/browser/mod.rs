//! Browser session lifecycle
//!
//! A session is one browser process with one page, owned by exactly one
//! scrape cycle: `Created -> Launched -> Navigated -> Ready -> Closed`.
//! Sessions are never pooled or shared between cycles.

mod chrome;

pub use chrome::{ChromeLauncher, ChromeSession};

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::SessionConfig;
use crate::error::Result;

/// Lifecycle position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Launched,
    Navigated,
    Ready,
    Closed,
}

/// Starts browser sessions. Each call owns a fresh browser process.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession;

    /// Start a headless browser with one blank page.
    /// A partially started browser is torn down before the error is returned.
    async fn launch(&self, config: &SessionConfig) -> Result<Self::Session>;
}

/// One browser process and its single page.
#[async_trait]
pub trait BrowserSession: Send {
    fn state(&self) -> SessionState;

    /// Load `url`, returning once the DOM content is loaded (not all resources).
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<()>;

    /// Block until `selector` matches at least one element, or fail with
    /// [`crate::ScrapeError::ReadinessTimeout`].
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()>;

    /// Serialized DOM of the loaded page.
    async fn content(&mut self) -> Result<String>;

    /// Terminate the browser process. Idempotent.
    async fn close(&mut self) -> Result<()>;
}
