//! Page worker: one unit in, one outcome out

use crate::config::SourceConfig;
use crate::harvester::extractor::extract;
use crate::harvester::fetcher::Fetcher;
use crate::model::{Locator, Record, Unit, UnitKind};
use url::Url;

/// Result of running one unit
#[derive(Debug)]
pub struct PageOutcome {
    pub unit: Unit,
    pub records: Vec<Record>,
    pub continuation: bool,
    /// Set when the fetch or the extraction failed; `records` is then empty
    pub error: Option<String>,
    pub attempts: u32,
}

impl PageOutcome {
    fn failed(unit: Unit, attempts: u32, error: String) -> Self {
        Self {
            unit,
            records: Vec::new(),
            continuation: false,
            error: Some(error),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Maps units to the URLs of the harvested site
#[derive(Debug, Clone)]
pub struct UnitUrls {
    base_url: String,
    api_url: String,
}

impl UnitUrls {
    pub fn new(source: &SourceConfig) -> Self {
        Self {
            base_url: source.base_url.trim_end_matches('/').to_string(),
            api_url: source.api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, unit: &Unit) -> Result<Url, url::ParseError> {
        let raw = match (&unit.kind, &unit.locator) {
            (UnitKind::ContestList, Locator::Page(page)) => {
                format!("{}/contests/page/{}", self.base_url, page)
            }
            (UnitKind::ProblemSet, Locator::Page(page)) => {
                format!("{}/problemset/page/{}", self.base_url, page)
            }
            (UnitKind::SubmissionPage, Locator::ContestPage { contest_id, page }) => format!(
                "{}/contest/{}/status/page/{}",
                self.base_url, contest_id, page
            ),
            (UnitKind::UserProfile, Locator::Username(username)) => {
                format!("{}/profile/{}", self.base_url, username)
            }
            (UnitKind::RatedUsers, Locator::Method(method)) => {
                format!("{}/{}?{}", self.api_url, method, api_query(method))
            }
            _ => return Err(url::ParseError::EmptyHost),
        };
        Url::parse(&raw)
    }
}

/// Query string for an API method
fn api_query(method: &str) -> &'static str {
    match method {
        "user.ratedList" => "activeOnly=false&includeRetired=false",
        _ => "",
    }
}

/// Fetches and extracts single units
///
/// The worker never retries on its own; the fetcher spends the retry budget
/// and a failed unit is left for a later run.
pub struct PageWorker {
    pages: Fetcher,
    api: Fetcher,
    urls: UnitUrls,
}

impl PageWorker {
    /// `pages` serves HTML units, `api` serves JSON API units
    pub fn new(pages: Fetcher, api: Fetcher, urls: UnitUrls) -> Self {
        Self { pages, api, urls }
    }

    pub async fn run(&self, unit: Unit) -> PageOutcome {
        let url = match self.urls.url_for(&unit) {
            Ok(url) => url,
            Err(e) => {
                let error = format!("cannot build URL: {}", e);
                return PageOutcome::failed(unit, 0, error);
            }
        };

        let fetcher = if unit.kind.is_api() {
            &self.api
        } else {
            &self.pages
        };

        let page = match fetcher.fetch(&url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("{} failed: {}", unit, e);
                return PageOutcome::failed(unit, e.attempts(), e.to_string());
            }
        };

        match extract(&page.body, &unit) {
            Ok(extraction) => {
                tracing::debug!(
                    "{}: {} records (HTTP {})",
                    unit,
                    extraction.records.len(),
                    page.status_code
                );
                PageOutcome {
                    unit,
                    records: extraction.records,
                    continuation: extraction.continuation,
                    error: None,
                    attempts: page.attempts,
                }
            }
            Err(e) => {
                tracing::warn!("{}: extraction failed: {}", unit, e);
                PageOutcome::failed(unit, page.attempts, e.to_string())
            }
        }
    }
}
