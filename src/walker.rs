//! Multi-page walk as a stream of cycles.
//!
//! Each item is one independent fetch cycle with its own browser session.
//! The walk follows each page's continuation and ends when pagination is
//! exhausted, a cycle fails (the error is the last item), the page cap is
//! hit, or a continuation points back at a page already loaded.
//!
//! To resume an interrupted walk, start from
//! `FetchRequest::continue_from(base_url, &last_next_target)`.

use std::collections::HashSet;
use std::time::Duration;

use futures::stream::{self, Stream, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::BrowserLauncher;
use crate::error::Result;
use crate::extractors::Record;
use crate::orchestrator::{FetchRequest, FetchResult, Scraper};

pub const DEFAULT_MAX_PAGES: usize = 50;

#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Upper bound on cycles run by one walk
    pub max_pages: usize,
    pub cancel: CancellationToken,
    /// Deadline applied to each cycle separately
    pub page_budget: Option<Duration>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            cancel: CancellationToken::new(),
            page_budget: None,
        }
    }
}

impl WalkOptions {
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_page_budget(mut self, budget: Duration) -> Self {
        self.page_budget = Some(budget);
        self
    }
}

struct WalkState {
    /// Counter-mode continuations are applied to this URL
    base_url: String,
    next: Option<FetchRequest>,
    visited: HashSet<String>,
    fetched: usize,
    options: WalkOptions,
}

/// Stream one [`FetchResult`] per page, starting at `start`.
pub fn walk_pages<'a, L: BrowserLauncher>(
    scraper: &'a Scraper<L>,
    start: FetchRequest,
    options: WalkOptions,
) -> impl Stream<Item = Result<FetchResult>> + 'a {
    let state = WalkState {
        base_url: start.target_url.clone(),
        next: Some(start),
        visited: HashSet::new(),
        fetched: 0,
        options,
    };

    stream::unfold(state, move |mut state| async move {
        if state.fetched >= state.options.max_pages {
            if state.next.is_some() {
                info!("page cap of {} reached, stopping walk", state.options.max_pages);
            }
            return None;
        }
        let request = state.next.take()?;
        state.fetched += 1;

        let result = match state.options.page_budget {
            Some(budget) => {
                scraper
                    .fetch_with_deadline(&request, &state.options.cancel, budget)
                    .await
            }
            None => scraper.fetch_with_cancel(&request, &state.options.cancel).await,
        };

        if let Ok(page) = &result {
            state.visited.insert(page.page_url.to_string());
            state.next = next_request(scraper, &state, page);
        }
        Some((result, state))
    })
}

fn next_request<L: BrowserLauncher>(
    scraper: &Scraper<L>,
    state: &WalkState,
    page: &FetchResult,
) -> Option<FetchRequest> {
    let next = page.pagination.next_target()?;
    let request = FetchRequest::continue_from(&state.base_url, next);

    match scraper.resolve_target(&request) {
        Ok((url, _)) if state.visited.contains(url.as_str()) => {
            warn!("next page {} was already scraped, stopping walk", url);
            None
        }
        Ok(_) => Some(request),
        Err(e) => {
            warn!("unusable next page {:?}: {}", next, e);
            None
        }
    }
}

/// Walk every page and concatenate the records in page order.
/// Fails with the first cycle error.
pub async fn collect_records<L: BrowserLauncher>(
    scraper: &Scraper<L>,
    start: FetchRequest,
    options: WalkOptions,
) -> Result<Vec<Record>> {
    walk_pages(scraper, start, options)
        .try_fold(Vec::new(), |mut records, page| async move {
            records.extend(page.records);
            Ok(records)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScrapeConfig;
    use crate::error::ErrorKind;
    use crate::pagination::{NextTarget, PaginationMode};
    use crate::testing::FakeLauncher;
    use futures::StreamExt;

    fn listing(name: &str, has_next: bool) -> String {
        let pagination = if has_next {
            r#"<div class="pagination"><a href="?page=99">next</a></div>"#
        } else {
            ""
        };
        format!(
            r#"<html><body><div class="company--details">
                <article class="row"><h2 class="article--title">{}</h2></article>
            </div>{}</body></html>"#,
            name, pagination
        )
    }

    fn counter_site() -> FakeLauncher {
        FakeLauncher::new()
            .with_page("https://dir.example/x?page=1", listing("one", true))
            .with_page("https://dir.example/x?page=2", listing("two", true))
            .with_page("https://dir.example/x?page=3", listing("three", false))
    }

    fn names(records: &[Record]) -> Vec<&str> {
        records.iter().filter_map(|r| r.get("companyName")).collect()
    }

    #[tokio::test]
    async fn test_walks_until_exhausted() {
        let launcher = counter_site();
        let scraper = Scraper::with_launcher(launcher.clone(), ScrapeConfig::default()).unwrap();

        let pages: Vec<_> = walk_pages(&scraper, FetchRequest::new("https://dir.example/x"), WalkOptions::default())
            .collect()
            .await;

        assert_eq!(pages.len(), 3);
        let last = pages[2].as_ref().unwrap();
        assert_eq!(last.page, 3);
        assert!(last.pagination.is_exhausted());
        // One session per page, each closed
        assert_eq!(launcher.launches(), 3);
        assert_eq!(launcher.closes(), 3);
    }

    #[tokio::test]
    async fn test_collect_records_in_page_order() {
        let scraper = Scraper::with_launcher(counter_site(), ScrapeConfig::default()).unwrap();
        let records = collect_records(&scraper, FetchRequest::new("https://dir.example/x"), WalkOptions::default())
            .await
            .unwrap();
        assert_eq!(names(&records), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_page_cap() {
        let launcher = counter_site();
        let scraper = Scraper::with_launcher(launcher.clone(), ScrapeConfig::default()).unwrap();

        let records = collect_records(
            &scraper,
            FetchRequest::new("https://dir.example/x"),
            WalkOptions::default().with_max_pages(2),
        )
        .await
        .unwrap();

        assert_eq!(names(&records), vec!["one", "two"]);
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test]
    async fn test_resume_from_continuation() {
        let launcher = counter_site();
        let scraper = Scraper::with_launcher(launcher.clone(), ScrapeConfig::default()).unwrap();

        let start = FetchRequest::continue_from("https://dir.example/x", &NextTarget::Page(2));
        let records = collect_records(&scraper, start, WalkOptions::default()).await.unwrap();

        assert_eq!(names(&records), vec!["two", "three"]);
        assert_eq!(
            launcher.navigations(),
            vec!["https://dir.example/x?page=2", "https://dir.example/x?page=3"]
        );
    }

    #[tokio::test]
    async fn test_error_ends_walk() {
        let launcher = FakeLauncher::new()
            .with_page("https://dir.example/x?page=1", listing("one", true));
        let scraper = Scraper::with_launcher(launcher.clone(), ScrapeConfig::default()).unwrap();

        let pages: Vec<_> = walk_pages(&scraper, FetchRequest::new("https://dir.example/x"), WalkOptions::default())
            .collect()
            .await;

        assert_eq!(pages.len(), 2);
        assert!(pages[0].is_ok());
        assert_eq!(pages[1].as_ref().unwrap_err().kind(), ErrorKind::Navigation);
        assert_eq!(launcher.closes(), 2);
    }

    #[tokio::test]
    async fn test_self_link_stops_walk() {
        let html = r#"<html><body><div class="company--details">
            <article class="row"><h2 class="article--title">loop</h2></article>
            <a rel="next" href="/list">Next</a>
        </div></body></html>"#;
        let launcher = FakeLauncher::new().with_page("https://dir.example/list", html);
        let mut config = ScrapeConfig::default();
        config.site.pagination = PaginationMode::url_anchor();
        let scraper = Scraper::with_launcher(launcher.clone(), config).unwrap();

        let records = collect_records(&scraper, FetchRequest::new("https://dir.example/list"), WalkOptions::default())
            .await
            .unwrap();

        assert_eq!(names(&records), vec!["loop"]);
        assert_eq!(launcher.launches(), 1);
    }
}
