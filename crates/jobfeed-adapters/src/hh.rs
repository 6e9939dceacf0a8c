//! hh.ru structured API adapter.
//!
//! Paginated GET over `/vacancies` with `text`/`area`/`per_page`/`page`
//! params. A page reports the total page count; pagination stops when the
//! count is reached or a page comes back empty.

use std::time::Duration;

use async_trait::async_trait;
use jobfeed_core::RawPosting;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;
use tracing::warn;

use crate::normalize::{format_salary, hh_description, parse_hh_timestamp};
use crate::{http_client, AdapterError, FetchOutcome, SourceAdapter};

pub const HH_BASE_URL: &str = "https://api.hh.ru";
const SOURCE: &str = "hh.ru";
const PER_PAGE: u32 = 50;
const PAGE_DELAY: Duration = Duration::from_millis(500);

pub struct HhAdapter {
    client: reqwest::Client,
    base_url: String,
    area: u32,
    page_delay: Duration,
}

impl HhAdapter {
    pub fn new(user_agent: &str, timeout: Duration, area: u32) -> Result<Self, AdapterError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(Self {
            client: http_client(user_agent, timeout, headers)?,
            base_url: HH_BASE_URL.to_string(),
            area,
            page_delay: PAGE_DELAY,
        })
    }

    /// Point the adapter at a different endpoint (tests use a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    async fn fetch_page(&self, query: &str, page: u32) -> Result<HhPage, AdapterError> {
        let url = format!("{}/vacancies", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("text", query.to_string()),
                ("area", self.area.to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<HhPage>().await?)
    }
}

#[derive(Debug, Deserialize)]
struct HhPage {
    #[serde(default)]
    items: Vec<HhItem>,
    #[serde(default)]
    pages: u32,
}

#[derive(Debug, Deserialize)]
struct HhItem {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    employer: Option<HhEmployer>,
    #[serde(default)]
    area: Option<HhArea>,
    #[serde(default)]
    salary: Option<HhSalary>,
    #[serde(default)]
    snippet: Option<HhSnippet>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    alternate_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HhEmployer {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HhArea {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HhSalary {
    #[serde(default)]
    from: Option<i64>,
    #[serde(default)]
    to: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HhSnippet {
    #[serde(default)]
    requirement: Option<String>,
    #[serde(default)]
    responsibility: Option<String>,
}

fn convert_item(item: HhItem) -> Result<RawPosting, AdapterError> {
    let title = item.name.unwrap_or_default();
    if title.is_empty() {
        return Err(AdapterError::Malformed("item has no name".into()));
    }
    let employer = item
        .employer
        .ok_or_else(|| AdapterError::Malformed("item has no employer".into()))?;
    let published_at = item
        .published_at
        .as_deref()
        .and_then(parse_hh_timestamp)
        .ok_or_else(|| AdapterError::Malformed("unparseable published_at".into()))?;
    let original_url = item
        .alternate_url
        .filter(|url| !url.is_empty())
        .or_else(|| item.id.map(|id| format!("https://hh.ru/vacancy/{id}")))
        .ok_or_else(|| AdapterError::Malformed("item has no url".into()))?;
    let salary = item
        .salary
        .and_then(|s| format_salary(s.from, s.to, s.currency.as_deref().unwrap_or("RUR")));
    let snippet = item.snippet.unwrap_or_default();

    Ok(RawPosting {
        title,
        company: employer.name.unwrap_or_default(),
        location: item.area.and_then(|a| a.name).unwrap_or_default(),
        salary,
        description: hh_description(
            snippet.requirement.as_deref(),
            snippet.responsibility.as_deref(),
        ),
        published_at,
        source: SOURCE.to_string(),
        original_url,
    })
}

#[async_trait]
impl SourceAdapter for HhAdapter {
    fn source(&self) -> &'static str {
        SOURCE
    }

    async fn fetch(&self, query: &str) -> FetchOutcome {
        let mut out = FetchOutcome::default();
        let mut page = 0u32;
        loop {
            let body = match self.fetch_page(query, page).await {
                Ok(body) => body,
                Err(err) => {
                    warn!(source = SOURCE, page, error = %err, "page fetch failed, stopping pagination");
                    out.last_error = Some(err);
                    break;
                }
            };
            if body.items.is_empty() {
                break;
            }
            for item in body.items {
                match convert_item(item) {
                    Ok(posting) => out.postings.push(posting),
                    Err(err) => {
                        warn!(source = SOURCE, error = %err, "skipping malformed item");
                        out.skipped += 1;
                    }
                }
            }
            if page + 1 >= body.pages {
                break;
            }
            page += 1;
            tokio::time::sleep(self.page_delay).await;
        }
        out
    }
}
