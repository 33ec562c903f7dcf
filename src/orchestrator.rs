//! One fetch cycle: validate, open a session, load the page, extract
//! records, resolve pagination, close the session.
//!
//! The session is closed on every path that opened one, including
//! navigation failures, readiness timeouts, cancellation and deadlines.
//! Nothing is retried here.

use std::future::Future;
use std::time::Duration;

use scraper::Html;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{BrowserLauncher, BrowserSession, ChromeLauncher};
use crate::config::{CompiledSite, ScrapeConfig, SessionConfig};
use crate::error::{Result, ScrapeError};
use crate::extractors::{extract_records, Record};
use crate::pagination::{NextTarget, PaginationState};

/// Input of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Absolute http(s) URL of the listing page (or a continuation URL)
    pub target_url: String,
    /// 1-based page number; counter mode only, defaults to 1
    pub page: Option<u32>,
}

impl FetchRequest {
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            page: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// The request that continues from `next`, given the base URL of the walk.
    pub fn continue_from(base_url: &str, next: &NextTarget) -> Self {
        match next {
            NextTarget::Url(url) => Self::new(url.as_str()),
            NextTarget::Page(page) => Self::new(base_url).with_page(*page),
        }
    }
}

/// Output of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Records in document order
    pub records: Vec<Record>,
    pub pagination: PaginationState,
    /// The URL actually loaded
    pub page_url: Url,
    pub page: u32,
}

/// Cycle stages, reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Idle,
    SessionOpen,
    PageLoaded,
    RecordsExtracted,
    PaginationResolved,
    SessionClosed,
}

/// Validate `raw` as an absolute http(s) URL.
pub fn validate_target(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ScrapeError::validation("A valid URL is required."));
    }
    let url = Url::parse(raw).map_err(|e| {
        ScrapeError::validation(format!("A valid URL is required: `{}` ({})", raw, e))
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ScrapeError::validation(format!(
            "A valid URL is required: `{}` is not an http(s) URL",
            raw
        )));
    }
    Ok(url)
}

/// Runs fetch cycles against one configured site.
pub struct Scraper<L = ChromeLauncher> {
    launcher: L,
    site: CompiledSite,
    session: SessionConfig,
}

impl Scraper<ChromeLauncher> {
    /// Scraper backed by a local headless Chrome.
    pub fn from_config(config: ScrapeConfig) -> Result<Self> {
        Self::with_launcher(ChromeLauncher, config)
    }
}

impl<L: BrowserLauncher> Scraper<L> {
    pub fn with_launcher(launcher: L, config: ScrapeConfig) -> Result<Self> {
        Ok(Self {
            launcher,
            site: config.site.compile()?,
            session: config.session,
        })
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// The URL a cycle for `request` would load.
    pub fn resolve_target(&self, request: &FetchRequest) -> Result<(Url, u32)> {
        let base = validate_target(&request.target_url)?;
        let page = request.page.unwrap_or(1).max(1);
        Ok((self.site.pagination.page_url(&base, page), page))
    }

    /// Run one cycle with no cancellation or deadline.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        self.run(request, &CancellationToken::new(), None).await
    }

    /// Run one cycle; cancelling `cancel` tears the session down immediately.
    pub async fn fetch_with_cancel(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResult> {
        self.run(request, cancel, None).await
    }

    /// Run one cycle that must finish within `budget`, launch included.
    pub async fn fetch_with_deadline(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
        budget: Duration,
    ) -> Result<FetchResult> {
        self.run(request, cancel, Some(budget)).await
    }

    async fn run(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
        budget: Option<Duration>,
    ) -> Result<FetchResult> {
        // Validation happens before any browser cost is paid
        let (target, page) = self.resolve_target(request)?;
        let guard = CycleGuard {
            cancel,
            deadline: budget.map(|b| (Instant::now() + b, b)),
        };

        debug!(stage = ?CycleStage::Idle, url = %target, "starting scrape cycle");
        info!("Launching browser...");
        let mut session = guard.run(self.launcher.launch(&self.session)).await?;
        debug!(stage = ?CycleStage::SessionOpen, "browser launched");

        let outcome = guard.run(self.load_and_extract(&mut session, &target, page)).await;

        if let Err(e) = session.close().await {
            warn!("browser teardown failed: {}", e);
        }
        debug!(stage = ?CycleStage::SessionClosed, ok = outcome.is_ok(), "scrape cycle finished");

        outcome
    }

    async fn load_and_extract<S: BrowserSession>(
        &self,
        session: &mut S,
        target: &Url,
        page: u32,
    ) -> Result<FetchResult> {
        info!("Scraping URL: {}", target);
        session
            .navigate(target, self.session.navigation_timeout())
            .await?;

        if let Some(ready) = &self.site.ready_selector {
            session
                .wait_for_selector(ready, self.session.readiness_timeout())
                .await?;
        }
        debug!(stage = ?CycleStage::PageLoaded, "page ready");

        let html = session.content().await?;
        let (records, pagination) = self.extract_page(&html, target, page);

        Ok(FetchResult {
            records,
            pagination,
            page_url: target.clone(),
            page,
        })
    }

    /// Extraction and pagination over one parsed snapshot of the page.
    fn extract_page(&self, html: &str, target: &Url, page: u32) -> (Vec<Record>, PaginationState) {
        let document = Html::parse_document(html);

        let records = extract_records(&document, &self.site.container, &self.site.schema);
        debug!(stage = ?CycleStage::RecordsExtracted, count = records.len());

        let pagination = self.site.pagination.resolve(&document, target, page);
        debug!(stage = ?CycleStage::PaginationResolved, next = ?pagination.next_target());

        info!("Scraping complete. Total companies scraped: {}", records.len());
        (records, pagination)
    }
}

/// Races a cycle step against cancellation and the deadline.
struct CycleGuard<'a> {
    cancel: &'a CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl CycleGuard<'_> {
    async fn run<T>(&self, step: impl Future<Output = Result<T>>) -> Result<T> {
        let expired = async {
            match self.deadline {
                Some((at, _)) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ScrapeError::Cancelled),
            _ = expired => Err(ScrapeError::Deadline {
                budget: self.deadline.map(|(_, b)| b).unwrap_or_default(),
            }),
            result = step => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::SessionState;
    use crate::error::ErrorKind;
    use crate::pagination::PaginationMode;
    use crate::testing::{FakeBehavior, FakeLauncher};

    const PAGE_WITH_NEXT: &str = r#"
    <html><body>
        <div class="company--details">
            <article class="row">
                <h2 class="article--title">Alpha Ltd</h2>
                <div class="company--phones"><a href="tel:1">111</a><a href="tel:2">222</a></div>
            </article>
            <article class="row">
                <h2 class="article--title">Beta GmbH</h2>
            </article>
        </div>
        <nav class="pagination"><a href="?page=2">2</a></nav>
    </body></html>
    "#;

    const EMPTY_PAGE: &str = r#"
    <html><body><div class="company--details"><p>No results</p></div></body></html>
    "#;

    fn scraper(launcher: FakeLauncher) -> Scraper<FakeLauncher> {
        Scraper::with_launcher(launcher, ScrapeConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_counter_cycle() {
        let launcher = FakeLauncher::new().with_page("https://dir.example/plumbers?page=1", PAGE_WITH_NEXT);
        let scraper = scraper(launcher.clone());

        let result = scraper
            .fetch(&FetchRequest::new("https://dir.example/plumbers"))
            .await
            .unwrap();

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].get("phones"), Some("111, 222"));
        assert_eq!(result.records[1].get("email"), Some("N/A"));
        assert_eq!(result.pagination, PaginationState::Continuation(NextTarget::Page(2)));
        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.closes(), 1);
        assert_eq!(launcher.last_state(), Some(SessionState::Closed));
    }

    #[tokio::test]
    async fn test_explicit_page_is_requested() {
        let launcher = FakeLauncher::new().with_page("https://dir.example/plumbers?page=3", EMPTY_PAGE);
        let scraper = scraper(launcher.clone());

        let result = scraper
            .fetch(&FetchRequest::new("https://dir.example/plumbers").with_page(3))
            .await
            .unwrap();

        assert_eq!(result.page, 3);
        assert_eq!(launcher.navigations(), vec!["https://dir.example/plumbers?page=3"]);
    }

    #[tokio::test]
    async fn test_invalid_url_never_launches() {
        let launcher = FakeLauncher::new();
        let scraper = scraper(launcher.clone());

        for bad in ["not-a-url", "", "ftp://dir.example/x", "mailto:a@b.c"] {
            let err = scraper.fetch(&FetchRequest::new(bad)).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "input {:?}", bad);
        }
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test]
    async fn test_empty_page_is_success() {
        let launcher = FakeLauncher::new().with_page("https://dir.example/x?page=1", EMPTY_PAGE);
        let result = scraper(launcher)
            .fetch(&FetchRequest::new("https://dir.example/x"))
            .await
            .unwrap();

        assert!(result.records.is_empty());
        assert!(result.pagination.is_exhausted());
    }

    #[tokio::test]
    async fn test_navigation_failure_closes_session() {
        let launcher = FakeLauncher::new();
        let err = scraper(launcher.clone())
            .fetch(&FetchRequest::new("https://unreachable.example/"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Navigation);
        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.closes(), 1);
    }

    #[tokio::test]
    async fn test_readiness_timeout_is_distinct() {
        let launcher = FakeLauncher::new().with_page("https://dir.example/x?page=1", "<html><body>maintenance</body></html>");
        let err = scraper(launcher.clone())
            .fetch(&FetchRequest::new("https://dir.example/x"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ReadinessTimeout);
        assert_eq!(launcher.closes(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let launcher = FakeLauncher::new().with_behavior(FakeBehavior::FailLaunch);
        let err = scraper(launcher.clone())
            .fetch(&FetchRequest::new("https://dir.example/x"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Launch);
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_cancel_tears_down_hung_navigation() {
        let launcher = FakeLauncher::new().with_behavior(FakeBehavior::HangOnNavigate);
        let scraper = scraper(launcher.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = scraper
            .fetch_with_cancel(&FetchRequest::new("https://dir.example/x"), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(launcher.closes(), 1);
    }

    #[tokio::test]
    async fn test_deadline_tears_down_hung_navigation() {
        let launcher = FakeLauncher::new().with_behavior(FakeBehavior::HangOnNavigate);
        let err = scraper(launcher.clone())
            .fetch_with_deadline(
                &FetchRequest::new("https://dir.example/x"),
                &CancellationToken::new(),
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::Deadline { budget } if budget == Duration::from_millis(20)));
        assert_eq!(launcher.closes(), 1);
    }

    #[tokio::test]
    async fn test_cancel_tears_down_hung_readiness_wait() {
        let launcher = FakeLauncher::new()
            .with_page("https://dir.example/x?page=1", EMPTY_PAGE)
            .with_behavior(FakeBehavior::HangOnReady);
        let scraper = scraper(launcher.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = scraper
            .fetch_with_cancel(&FetchRequest::new("https://dir.example/x"), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(launcher.navigations(), vec!["https://dir.example/x?page=1"]);
        assert_eq!(launcher.closes(), 1);
        assert_eq!(launcher.last_state(), Some(SessionState::Closed));
    }

    #[tokio::test]
    async fn test_deadline_tears_down_hung_readiness_wait() {
        let launcher = FakeLauncher::new()
            .with_page("https://dir.example/x?page=1", EMPTY_PAGE)
            .with_behavior(FakeBehavior::HangOnReady);
        let err = scraper(launcher.clone())
            .fetch_with_deadline(
                &FetchRequest::new("https://dir.example/x"),
                &CancellationToken::new(),
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Deadline);
        assert_eq!(launcher.closes(), 1);
    }

    #[tokio::test]
    async fn test_url_anchor_cycle() {
        let html = r#"
        <html><body><div class="company--details"></div>
            <article class="row"><h2 class="article--title">Only</h2></article>
            <a rel="next" href="?page=2">Next</a>
        </body></html>
        "#;
        let mut config = ScrapeConfig::default();
        config.site.pagination = PaginationMode::url_anchor();

        let launcher = FakeLauncher::new().with_page("https://dir.example/list?z=1", html);
        let scraper = Scraper::with_launcher(launcher.clone(), config).unwrap();

        let result = scraper
            .fetch(&FetchRequest::new("https://dir.example/list?z=1").with_page(5))
            .await
            .unwrap();

        assert_eq!(
            result.pagination.next_target(),
            Some(&NextTarget::Url(Url::parse("https://dir.example/list?page=2").unwrap()))
        );
        assert_eq!(launcher.navigations(), vec!["https://dir.example/list?z=1"]);
    }

    #[test]
    fn test_continue_from() {
        let next = NextTarget::Page(4);
        assert_eq!(
            FetchRequest::continue_from("https://x/y", &next),
            FetchRequest::new("https://x/y").with_page(4)
        );

        let next = NextTarget::Url(Url::parse("https://x/y?page=2").unwrap());
        assert_eq!(
            FetchRequest::continue_from("https://x/y", &next),
            FetchRequest::new("https://x/y?page=2")
        );
    }
}
