//! Next-page resolution
//!
//! Two site conventions are supported, chosen by configuration:
//!
//! - URL anchor: the page carries a "next" link. Its href is resolved against
//!   the current URL (query stripped) and becomes the next fetch target.
//! - Counter: the caller tracks a page number. The page only has to show that
//!   a further page exists; the next target is `current + 1`, requested by
//!   setting a page query parameter on the base URL.
//!
//! Resolution runs on the already loaded document and never navigates.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;
use crate::schema::parse_selector;

/// Default query parameter carrying the page number in counter mode
pub const DEFAULT_PAGE_PARAM: &str = "page";

/// Serializable pagination settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PaginationMode {
    UrlAnchor {
        /// Selector for the "next page" control; only the first match is used
        #[serde(default = "default_next_selector")]
        next_selector: String,
    },
    Counter {
        /// Any match means another page exists
        #[serde(default = "default_indicator_selector")]
        indicator_selector: String,
        #[serde(default = "default_page_param")]
        page_param: String,
    },
}

fn default_next_selector() -> String {
    "a[rel='next'], .pagination a.next, .pagination .next a".to_string()
}

fn default_indicator_selector() -> String {
    ".pagination a[href*='?page=']".to_string()
}

fn default_page_param() -> String {
    DEFAULT_PAGE_PARAM.to_string()
}

impl Default for PaginationMode {
    fn default() -> Self {
        PaginationMode::Counter {
            indicator_selector: default_indicator_selector(),
            page_param: default_page_param(),
        }
    }
}

impl PaginationMode {
    pub fn url_anchor() -> Self {
        PaginationMode::UrlAnchor {
            next_selector: default_next_selector(),
        }
    }

    pub fn compile(&self) -> Result<PaginationResolver> {
        Ok(match self {
            PaginationMode::UrlAnchor { next_selector } => PaginationResolver::UrlAnchor {
                next: parse_selector(next_selector)?,
            },
            PaginationMode::Counter {
                indicator_selector,
                page_param,
            } => PaginationResolver::Counter {
                indicator: parse_selector(indicator_selector)?,
                page_param: page_param.clone(),
            },
        })
    }
}

/// Where the next cycle should fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NextTarget {
    /// URL-anchor mode
    Url(Url),
    /// Counter mode
    Page(u32),
}

/// Outcome of pagination for one loaded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationState {
    Continuation(NextTarget),
    Exhausted,
}

impl PaginationState {
    pub fn next_target(&self) -> Option<&NextTarget> {
        match self {
            PaginationState::Continuation(target) => Some(target),
            PaginationState::Exhausted => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, PaginationState::Exhausted)
    }
}

/// Compiled pagination strategy.
#[derive(Debug, Clone)]
pub enum PaginationResolver {
    UrlAnchor { next: Selector },
    Counter { indicator: Selector, page_param: String },
}

impl PaginationResolver {
    /// Compute the continuation for `document`, loaded from `page_url`.
    /// `current_page` is only consulted in counter mode.
    pub fn resolve(&self, document: &Html, page_url: &Url, current_page: u32) -> PaginationState {
        match self {
            PaginationResolver::UrlAnchor { next } => {
                let href = document
                    .select(next)
                    .next()
                    .and_then(|el| el.value().attr("href"));

                match href.and_then(|href| resolve_next_href(page_url, href)) {
                    Some(url) => PaginationState::Continuation(NextTarget::Url(url)),
                    None => PaginationState::Exhausted,
                }
            }
            PaginationResolver::Counter { indicator, .. } => {
                let has_more = document.select(indicator).next().is_some();
                match current_page.checked_add(1) {
                    Some(next) if has_more => PaginationState::Continuation(NextTarget::Page(next)),
                    _ => PaginationState::Exhausted,
                }
            }
        }
    }

    /// The URL to load for `page`. Counter mode sets the page parameter,
    /// URL-anchor mode uses the base as-is.
    pub fn page_url(&self, base: &Url, page: u32) -> Url {
        match self {
            PaginationResolver::UrlAnchor { .. } => base.clone(),
            PaginationResolver::Counter { page_param, .. } => with_page_param(base, page_param, page),
        }
    }
}

/// Resolve a next-page href against the current page with its query removed.
/// Placeholders (`#...`, `javascript:`) and non-http(s) results yield `None`.
pub fn resolve_next_href(page_url: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    let mut base = page_url.clone();
    base.set_query(None);
    base.set_fragment(None);

    let resolved = base.join(href).ok()?;
    if resolved.scheme() == "http" || resolved.scheme() == "https" {
        Some(resolved)
    } else {
        None
    }
}

/// Set `param=page` on `base`, replacing any existing value and keeping other pairs.
pub fn with_page_param(base: &Url, param: &str, page: u32) -> Url {
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| k != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = base.clone();
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        for (k, v) in &kept {
            query.append_pair(k, v);
        }
        query.append_pair(param, &page.to_string());
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn anchor() -> PaginationResolver {
        PaginationMode::UrlAnchor {
            next_selector: "a.next".into(),
        }
        .compile()
        .unwrap()
    }

    #[test]
    fn test_anchor_query_relative_href() {
        let doc = Html::parse_document(r#"<a class="next" href="?page=2">Next</a>"#);
        let state = anchor().resolve(&doc, &url("https://x/y?z=1"), 1);
        assert_eq!(
            state,
            PaginationState::Continuation(NextTarget::Url(url("https://x/y?page=2")))
        );
    }

    #[test]
    fn test_anchor_placeholder_is_exhausted() {
        let doc = Html::parse_document(r##"<a class="next" href="#">Next</a>"##);
        let state = anchor().resolve(&doc, &url("https://x/y?z=1"), 1);
        assert_eq!(state, PaginationState::Exhausted);

        let doc = Html::parse_document(r#"<a class="next" href="javascript:void(0)">Next</a>"#);
        assert!(anchor().resolve(&doc, &url("https://x/y"), 1).is_exhausted());
    }

    #[test]
    fn test_anchor_missing_control() {
        let doc = Html::parse_document(r#"<a class="prev" href="?page=1">Prev</a>"#);
        assert!(anchor().resolve(&doc, &url("https://x/y"), 1).is_exhausted());

        // No href at all
        let doc = Html::parse_document(r#"<a class="next">Next</a>"#);
        assert!(anchor().resolve(&doc, &url("https://x/y"), 1).is_exhausted());
    }

    #[test]
    fn test_anchor_path_and_absolute_hrefs() {
        let base = url("https://dir.example/list/plumbers?sort=az");

        let doc = Html::parse_document(r#"<a class="next" href="/list/plumbers/page/2">Next</a>"#);
        assert_eq!(
            anchor().resolve(&doc, &base, 1).next_target(),
            Some(&NextTarget::Url(url("https://dir.example/list/plumbers/page/2")))
        );

        let doc = Html::parse_document(r#"<a class="next" href="https://cdn.example/p3">Next</a>"#);
        assert_eq!(
            anchor().resolve(&doc, &base, 1).next_target(),
            Some(&NextTarget::Url(url("https://cdn.example/p3")))
        );

        let doc = Html::parse_document(r#"<a class="next" href="mailto:x@y.z">Next</a>"#);
        assert!(anchor().resolve(&doc, &base, 1).is_exhausted());
    }

    #[test]
    fn test_anchor_first_control_wins() {
        let doc = Html::parse_document(
            r#"<a class="next" href="?page=2">Next</a><a class="next" href="?page=9">Next</a>"#,
        );
        assert_eq!(
            anchor().resolve(&doc, &url("https://x/y"), 1).next_target(),
            Some(&NextTarget::Url(url("https://x/y?page=2")))
        );
    }

    #[test]
    fn test_counter_mode() {
        let resolver = PaginationMode::default().compile().unwrap();

        let doc = Html::parse_document(
            r#"<nav class="pagination"><a href="?page=2">2</a><a href="?page=4">4</a></nav>"#,
        );
        assert_eq!(
            resolver.resolve(&doc, &url("https://x/y?page=3"), 3),
            PaginationState::Continuation(NextTarget::Page(4))
        );

        let doc = Html::parse_document(r#"<nav class="pagination"><span>3</span></nav>"#);
        assert_eq!(
            resolver.resolve(&doc, &url("https://x/y?page=3"), 3),
            PaginationState::Exhausted
        );

        let doc = Html::parse_document(r#"<nav class="pagination"><a href="?page=2">2</a></nav>"#);
        assert!(resolver.resolve(&doc, &url("https://x/y"), u32::MAX).is_exhausted());
    }

    #[test]
    fn test_with_page_param() {
        assert_eq!(
            with_page_param(&url("https://x/y"), "page", 1).as_str(),
            "https://x/y?page=1"
        );
        assert_eq!(
            with_page_param(&url("https://x/y?q=plumbers&page=2"), "page", 3).as_str(),
            "https://x/y?q=plumbers&page=3"
        );
        assert_eq!(
            with_page_param(&url("https://x/y?p=2"), "p", 5).as_str(),
            "https://x/y?p=5"
        );

        let anchor = anchor();
        assert_eq!(anchor.page_url(&url("https://x/y?z=1"), 7).as_str(), "https://x/y?z=1");
    }

    #[test]
    fn test_mode_json() {
        let mode: PaginationMode = serde_json::from_str(r#"{"mode": "url_anchor"}"#).unwrap();
        assert_eq!(mode, PaginationMode::url_anchor());

        let mode: PaginationMode =
            serde_json::from_str(r#"{"mode": "counter", "page_param": "p"}"#).unwrap();
        assert!(matches!(mode, PaginationMode::Counter { ref page_param, .. } if page_param == "p"));

        let json = serde_json::to_string(&NextTarget::Page(4)).unwrap();
        assert_eq!(json, "4");
        let json = serde_json::to_string(&NextTarget::Url(url("https://x/y?page=2"))).unwrap();
        assert_eq!(json, r#""https://x/y?page=2""#);
    }
}
