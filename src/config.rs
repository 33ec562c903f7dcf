//! Scrape configuration
//!
//! Everything is data: a site profile (selectors, schema, pagination mode)
//! and per-session browser settings. Defaults reproduce the business
//! directory layout the scraper was written for.

use std::path::{Path, PathBuf};
use std::time::Duration;

use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeError};
use crate::pagination::{PaginationMode, PaginationResolver};
use crate::schema::{
    business_directory_extended_fields, business_directory_fields, parse_selector,
    ExtractionSchema, FieldSpec,
};

pub const DEFAULT_READINESS_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Top-level configuration for a [`crate::Scraper`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub site: SiteProfile,
    pub session: SessionConfig,
}

impl ScrapeConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScrapeError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }
}

/// Layout of one directory site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    /// One match per listing
    pub container_selector: String,
    /// Waited for after navigation; `None` skips the wait
    pub ready_selector: Option<String>,
    pub schema: Vec<FieldSpec>,
    pub pagination: PaginationMode,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self::business_directory()
    }
}

impl SiteProfile {
    pub fn business_directory() -> Self {
        Self {
            container_selector: "article.row".to_string(),
            ready_selector: Some(".company--details".to_string()),
            schema: business_directory_fields(),
            pagination: PaginationMode::default(),
        }
    }

    pub fn business_directory_extended() -> Self {
        Self {
            schema: business_directory_extended_fields(),
            ..Self::business_directory()
        }
    }

    /// Parse every selector up front so a cycle never fails on configuration.
    pub fn compile(&self) -> Result<CompiledSite> {
        Ok(CompiledSite {
            container: parse_selector(&self.container_selector)?,
            ready_selector: match &self.ready_selector {
                Some(s) if !s.trim().is_empty() => {
                    parse_selector(s)?;
                    Some(s.clone())
                }
                _ => None,
            },
            schema: ExtractionSchema::new(&self.schema)?,
            pagination: self.pagination.compile()?,
        })
    }
}

/// A [`SiteProfile`] with all selectors parsed.
#[derive(Debug, Clone)]
pub struct CompiledSite {
    pub container: Selector,
    pub ready_selector: Option<String>,
    pub schema: ExtractionSchema,
    pub pagination: PaginationResolver,
}

/// Browser settings applied to every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub headless: bool,
    /// Mask common automation fingerprints on the session's page
    pub stealth: bool,
    pub no_sandbox: bool,
    pub user_agent: Option<String>,
    pub window_width: u32,
    pub window_height: u32,
    /// Chrome/Chromium binary; autodetected when unset
    pub executable: Option<PathBuf>,
    pub extra_args: Vec<String>,
    pub navigation_timeout_ms: u64,
    pub readiness_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            stealth: true,
            no_sandbox: false,
            user_agent: None,
            window_width: 1366,
            window_height: 768,
            executable: None,
            extra_args: Vec::new(),
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            readiness_timeout_ms: DEFAULT_READINESS_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl SessionConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}
