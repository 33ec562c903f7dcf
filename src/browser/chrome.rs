//! Headless Chrome sessions over the DevTools protocol

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::{BrowserLauncher, BrowserSession, SessionState};
use crate::config::SessionConfig;
use crate::error::{Result, ScrapeError};

/// Resolves once `DOMContentLoaded` has fired for the current document.
const DOM_CONTENT_LOADED_JS: &str = r#"new Promise(resolve => {
    if (document.readyState !== 'loading') { resolve(true); return; }
    document.addEventListener('DOMContentLoaded', () => resolve(true), { once: true });
})"#;

/// Injected before any page script runs when stealth is enabled.
const STEALTH_JS: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {
    window.navigator.permissions.query = (parameters) =>
        parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters);
}
"#;

/// Launches a local Chrome/Chromium per session.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeLauncher;

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    type Session = ChromeSession;

    async fn launch(&self, config: &SessionConfig) -> Result<ChromeSession> {
        let browser_config = browser_config(config)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScrapeError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("chromiumoxide handler event error: {}", e);
                }
            }
        });

        let mut session = ChromeSession {
            browser: Some(browser),
            page: None,
            handler_task: Some(handler_task),
            state: SessionState::Launched,
            poll_interval: config.poll_interval(),
        };

        // A half-started browser must not outlive the failed launch
        if let Err(e) = session.open_page(config).await {
            if let Err(close_err) = session.close().await {
                warn!("teardown after failed launch: {}", close_err);
            }
            return Err(e);
        }

        Ok(session)
    }
}

/// Expression evaluating to `true` once `selector` matches in the page.
fn selector_present_js(selector: &str) -> Result<String> {
    let literal = serde_json::to_string(selector)?;
    Ok(format!("document.querySelector({}) !== null", literal))
}

/// Only a successful `false` keeps the readiness wait polling; a failed
/// check means the browser itself is in trouble.
fn readiness_outcome(selector: &str, evaluated: std::result::Result<bool, String>) -> Result<bool> {
    evaluated.map_err(|reason| {
        ScrapeError::Snapshot(format!("readiness check for `{}` failed: {}", selector, reason))
    })
}

fn browser_config(config: &SessionConfig) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .request_timeout(config.navigation_timeout())
        .window_size(config.window_width, config.window_height);

    if !config.headless {
        builder = builder.with_head();
    }
    if config.no_sandbox {
        builder = builder.no_sandbox();
    }
    if let Some(path) = &config.executable {
        builder = builder.chrome_executable(path);
    }
    for arg in &config.extra_args {
        builder = builder.arg(arg.as_str());
    }

    builder.build().map_err(ScrapeError::Launch)
}

/// One Chrome process with one page.
pub struct ChromeSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
    state: SessionState,
    poll_interval: Duration,
}

impl ChromeSession {
    async fn open_page(&mut self, config: &SessionConfig) -> Result<()> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| ScrapeError::Launch("browser already closed".into()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::Launch(format!("failed to open page: {}", e)))?;

        if let Some(user_agent) = &config.user_agent {
            page.execute(SetUserAgentOverrideParams::new(user_agent.clone()))
                .await
                .map_err(|e| ScrapeError::Launch(format!("failed to set user agent: {}", e)))?;
        }

        if config.stealth {
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_JS))
                .await
                .map_err(|e| ScrapeError::Launch(format!("failed to inject stealth script: {}", e)))?;
        }

        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| ScrapeError::Snapshot("session has no open page".into()))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    fn state(&self) -> SessionState {
        self.state
    }

    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<()> {
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| ScrapeError::navigation(url.as_str(), "session has no open page"))?;

        let load = async {
            let response = page
                .execute(NavigateParams::new(url.as_str()))
                .await
                .map_err(|e| ScrapeError::navigation(url.as_str(), e.to_string()))?;

            // DNS and connection failures are reported here, not as a CDP error
            if let Some(error_text) = response.result.error_text.clone() {
                return Err(ScrapeError::navigation(url.as_str(), error_text));
            }

            let wait = EvaluateParams::builder()
                .expression(DOM_CONTENT_LOADED_JS)
                .await_promise(true)
                .build()
                .map_err(|e| ScrapeError::navigation(url.as_str(), e))?;
            page.evaluate_expression(wait)
                .await
                .map_err(|e| ScrapeError::navigation(url.as_str(), e.to_string()))?;
            Ok(())
        };

        match tokio::time::timeout(timeout, load).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ScrapeError::navigation(
                    url.as_str(),
                    format!("no DOMContentLoaded within {}ms", timeout.as_millis()),
                ))
            }
        }

        self.state = SessionState::Navigated;
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let page = self.page()?;
        let check = selector_present_js(selector)?;

        loop {
            let evaluated = page
                .evaluate(check.clone())
                .await
                .map_err(|e| e.to_string())
                .and_then(|result| result.into_value::<bool>().map_err(|e| e.to_string()));
            if readiness_outcome(selector, evaluated)? {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ScrapeError::ReadinessTimeout {
                    selector: selector.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }

        self.state = SessionState::Ready;
        Ok(())
    }

    async fn content(&mut self) -> Result<String> {
        self.page()?
            .content()
            .await
            .map_err(|e| ScrapeError::Snapshot(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        self.page = None;

        let mut outcome = Ok(());
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                outcome = Err(ScrapeError::Teardown(e.to_string()));
                if let Some(Err(kill_err)) = browser.kill().await {
                    warn!("failed to kill browser process: {}", kill_err);
                }
            }
            if let Err(e) = browser.wait().await {
                warn!("failed to reap browser process: {}", e);
            }
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }

        outcome
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            // chromiumoxide kills the child process when `Browser` drops
            warn!("browser session dropped without close()");
            if let Some(task) = self.handler_task.take() {
                task.abort();
            }
        }
    }
}
