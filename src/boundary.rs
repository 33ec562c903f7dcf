//! Request/response boundary
//!
//! Decodes a scrape request from query pairs or JSON and maps the outcome of
//! one cycle onto the `{success, data, nextPage, error}` body returned to
//! callers, together with an HTTP-style status code. Invalid input is
//! answered without launching a browser.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::error;
use url::Url;

use crate::browser::BrowserLauncher;
use crate::error::{Result, ScrapeError};
use crate::extractors::Record;
use crate::orchestrator::{validate_target, FetchRequest, FetchResult, Scraper};
use crate::pagination::NextTarget;

/// Incoming scrape request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    #[serde(default, alias = "targetUrl")]
    pub url: Option<String>,
    /// Missing, non-numeric and non-positive values all mean page 1
    #[serde(default, deserialize_with = "lenient_page")]
    pub page: Option<u32>,
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            page: None,
        }
    }

    /// Decode `url` and `page` from query pairs. The first occurrence of a
    /// key wins; unknown keys are ignored.
    pub fn from_query<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = Self::default();
        let mut page_seen = false;
        for (key, value) in pairs {
            match key.as_ref() {
                "url" | "targetUrl" if request.url.is_none() => {
                    request.url = Some(value.as_ref().to_string());
                }
                "page" if !page_seen => {
                    page_seen = true;
                    request.page = parse_page(value.as_ref());
                }
                _ => {}
            }
        }
        request
    }

    /// Decode from a raw query string such as `url=https%3A%2F%2F...&page=2`.
    pub fn from_query_string(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_query(url::form_urlencoded::parse(query.as_bytes()))
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1)
    }

    /// Check the target URL without touching a browser.
    pub fn validate(&self) -> Result<Url> {
        match &self.url {
            Some(url) => validate_target(url),
            None => Err(ScrapeError::validation("A valid URL is required.")),
        }
    }

    pub fn into_fetch_request(self) -> Result<FetchRequest> {
        self.validate()?;
        let page = self.page();
        let url = self.url.unwrap_or_default();
        Ok(FetchRequest::new(url).with_page(page))
    }
}

/// Leading decimal digits of `raw`, if they form a page number >= 1.
fn parse_page(raw: &str) -> Option<u32> {
    let raw = raw.trim_start();
    let digits_end = raw
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    raw[..digits_end].parse::<u32>().ok().filter(|page| *page >= 1)
}

fn lenient_page<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .filter(|page| *page >= 1),
        Some(Value::String(s)) => parse_page(&s),
        _ => None,
    })
}

/// Response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScrapeResponse {
    Success {
        success: bool,
        data: Vec<Record>,
        /// `null` exactly when pagination is exhausted
        #[serde(rename = "nextPage")]
        next_page: Option<NextTarget>,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl ScrapeResponse {
    pub fn success(result: FetchResult) -> Self {
        ScrapeResponse::Success {
            success: true,
            next_page: result.pagination.next_target().cloned(),
            data: result.records,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ScrapeResponse::Failure {
            success: false,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScrapeResponse::Success { .. })
    }
}

/// Response body plus status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeReply {
    pub status: u16,
    pub body: ScrapeResponse,
}

impl ScrapeReply {
    /// Map a cycle outcome: 200 on success, 400 for caller mistakes (message
    /// verbatim), 500 for everything else.
    pub fn from_result(result: Result<FetchResult>) -> Self {
        match result {
            Ok(result) => Self {
                status: 200,
                body: ScrapeResponse::success(result),
            },
            Err(e) if e.is_client_error() => Self {
                status: 400,
                body: ScrapeResponse::failure(e.to_string()),
            },
            Err(e) => {
                error!(kind = ?e.kind(), "Error during scraping: {}", e);
                Self {
                    status: 500,
                    body: ScrapeResponse::failure(format!("Failed to scrape data. Error: {}", e)),
                }
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.body)?)
    }
}

/// Validate `request`, run one cycle and build the reply.
pub async fn handle_request<L: BrowserLauncher>(
    scraper: &Scraper<L>,
    request: ScrapeRequest,
    cancel: &CancellationToken,
) -> ScrapeReply {
    let result = match request.into_fetch_request() {
        Ok(fetch) => scraper.fetch_with_cancel(&fetch, cancel).await,
        Err(e) => Err(e),
    };
    ScrapeReply::from_result(result)
}

/// JSON in, JSON out. A request that does not parse is a 400.
pub async fn handle_json<L: BrowserLauncher>(
    scraper: &Scraper<L>,
    request_json: &str,
    cancel: &CancellationToken,
) -> ScrapeReply {
    match serde_json::from_str::<ScrapeRequest>(request_json) {
        Ok(request) => handle_request(scraper, request, cancel).await,
        Err(e) => ScrapeReply::from_result(Err(ScrapeError::validation(format!(
            "Failed to parse request JSON: {}",
            e
        )))),
    }
}
