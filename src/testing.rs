//! In-memory browser fakes for tests.
//!
//! `FakeLauncher` serves canned HTML per URL and counts launches, closes and
//! navigations, so cycle behavior can be checked without a real browser.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use scraper::Html;
use url::Url;

use crate::browser::{BrowserLauncher, BrowserSession, SessionState};
use crate::config::SessionConfig;
use crate::error::{Result, ScrapeError};
use crate::schema::parse_selector;

/// Scripted failure mode of a [`FakeLauncher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FakeBehavior {
    #[default]
    Normal,
    FailLaunch,
    /// `navigate` never completes
    HangOnNavigate,
    /// `wait_for_selector` never completes
    HangOnReady,
}

#[derive(Default)]
struct Shared {
    pages: RwLock<HashMap<String, String>>,
    behavior: RwLock<FakeBehavior>,
    launches: AtomicUsize,
    closes: AtomicUsize,
    navigations: Mutex<Vec<String>>,
    last_state: Mutex<Option<SessionState>>,
}

impl Shared {
    fn behavior(&self) -> FakeBehavior {
        *self.behavior.read().unwrap()
    }

    fn record_state(&self, state: SessionState) {
        *self.last_state.lock().unwrap() = Some(state);
    }
}

/// Launcher serving canned pages. Clones share counters.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    shared: Arc<Shared>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` when `url` is loaded. URLs are matched exactly.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.shared
            .pages
            .write()
            .unwrap()
            .insert(url.into(), html.into());
        self
    }

    pub fn with_behavior(self, behavior: FakeBehavior) -> Self {
        *self.shared.behavior.write().unwrap() = behavior;
        self
    }

    pub fn launches(&self) -> usize {
        self.shared.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Every URL passed to `navigate`, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.shared.navigations.lock().unwrap().clone()
    }

    /// State of the most recently touched session.
    pub fn last_state(&self) -> Option<SessionState> {
        *self.shared.last_state.lock().unwrap()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    type Session = FakeSession;

    async fn launch(&self, _config: &SessionConfig) -> Result<FakeSession> {
        self.shared.launches.fetch_add(1, Ordering::SeqCst);
        if self.shared.behavior() == FakeBehavior::FailLaunch {
            return Err(ScrapeError::Launch("no browser executable found".into()));
        }

        self.shared.record_state(SessionState::Launched);
        Ok(FakeSession {
            shared: Arc::clone(&self.shared),
            html: None,
            state: SessionState::Launched,
        })
    }
}

/// Session handed out by [`FakeLauncher`].
pub struct FakeSession {
    shared: Arc<Shared>,
    html: Option<String>,
    state: SessionState,
}

impl FakeSession {
    fn transition(&mut self, state: SessionState) {
        self.state = state;
        self.shared.record_state(state);
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    fn state(&self) -> SessionState {
        self.state
    }

    async fn navigate(&mut self, url: &Url, _timeout: Duration) -> Result<()> {
        self.shared
            .navigations
            .lock()
            .unwrap()
            .push(url.to_string());

        if self.shared.behavior() == FakeBehavior::HangOnNavigate {
            std::future::pending::<()>().await;
        }

        let html = self.shared.pages.read().unwrap().get(url.as_str()).cloned();
        match html {
            Some(html) => {
                self.html = Some(html);
                self.transition(SessionState::Navigated);
                Ok(())
            }
            None => Err(ScrapeError::navigation(url.as_str(), "net::ERR_NAME_NOT_RESOLVED")),
        }
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        if self.shared.behavior() == FakeBehavior::HangOnReady {
            std::future::pending::<()>().await;
        }

        let html = self.html.as_deref().unwrap_or_default();
        if has_match(html, selector)? {
            self.transition(SessionState::Ready);
            Ok(())
        } else {
            Err(ScrapeError::ReadinessTimeout {
                selector: selector.to_string(),
                timeout,
            })
        }
    }

    async fn content(&mut self) -> Result<String> {
        self.html
            .clone()
            .ok_or_else(|| ScrapeError::Snapshot("no page loaded".into()))
    }

    async fn close(&mut self) -> Result<()> {
        if self.state != SessionState::Closed {
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
            self.transition(SessionState::Closed);
        }
        Ok(())
    }
}

fn has_match(html: &str, selector: &str) -> Result<bool> {
    let selector = parse_selector(selector)?;
    let document = Html::parse_document(html);
    let found = document.select(&selector).next().is_some();
    Ok(found)
}
