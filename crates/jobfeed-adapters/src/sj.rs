//! superjob.ru structured API adapter.
//!
//! Same overall shape as hh.ru but a different schema: `objects` instead of
//! `items`, epoch-second timestamps, an explicit `more` flag instead of a
//! page count, and an optional application key sent as a header.

use std::time::Duration;

use async_trait::async_trait;
use jobfeed_core::RawPosting;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;
use tracing::warn;

use crate::normalize::{parse_epoch_seconds, sj_salary};
use crate::{http_client, AdapterError, FetchOutcome, SourceAdapter};

pub const SJ_BASE_URL: &str = "https://api.superjob.ru/2.0";
const SOURCE: &str = "superjob.ru";
const PER_PAGE: u32 = 50;
const PAGE_DELAY: Duration = Duration::from_millis(500);

pub struct SjAdapter {
    client: reqwest::Client,
    base_url: String,
    town: u32,
    page_delay: Duration,
}

impl SjAdapter {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        town: u32,
        api_key: Option<&str>,
    ) -> Result<Self, AdapterError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|_| AdapterError::Malformed("api key is not a valid header value".into()))?;
            headers.insert("X-Api-App-Id", value);
        }
        Ok(Self {
            client: http_client(user_agent, timeout, headers)?,
            base_url: SJ_BASE_URL.to_string(),
            town,
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

    async fn fetch_page(&self, query: &str, page: u32) -> Result<SjPage, AdapterError> {
        let url = format!("{}/vacancies/", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("keyword", query.to_string()),
                ("town", self.town.to_string()),
                ("count", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<SjPage>().await?)
    }
}

#[derive(Debug, Deserialize)]
struct SjPage {
    #[serde(default)]
    objects: Vec<SjItem>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Deserialize)]
struct SjItem {
    #[serde(default)]
    profession: Option<String>,
    #[serde(default)]
    firm_name: Option<String>,
    #[serde(default)]
    town: Option<SjTown>,
    #[serde(default)]
    payment_from: Option<i64>,
    #[serde(default)]
    payment_to: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    candidat: Option<String>,
    #[serde(default)]
    date_published: Option<i64>,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SjTown {
    #[serde(default)]
    title: Option<String>,
}

fn convert_item(item: SjItem) -> Result<RawPosting, AdapterError> {
    let title = item.profession.unwrap_or_default();
    if title.is_empty() {
        return Err(AdapterError::Malformed("item has no profession".into()));
    }
    let published_at = item
        .date_published
        .and_then(parse_epoch_seconds)
        .ok_or_else(|| AdapterError::Malformed("unparseable date_published".into()))?;
    let original_url = item
        .link
        .filter(|url| !url.is_empty())
        .ok_or_else(|| AdapterError::Malformed("item has no link".into()))?;
    let salary = sj_salary(
        item.payment_from,
        item.payment_to,
        item.currency.as_deref().unwrap_or("rub"),
    );

    Ok(RawPosting {
        title,
        company: item.firm_name.unwrap_or_default(),
        location: item.town.and_then(|t| t.title).unwrap_or_default(),
        salary,
        description: item.candidat.unwrap_or_default(),
        published_at,
        source: SOURCE.to_string(),
        original_url,
    })
}

#[async_trait]
impl SourceAdapter for SjAdapter {
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
            if body.objects.is_empty() {
                break;
            }
            for item in body.objects {
                match convert_item(item) {
                    Ok(posting) => out.postings.push(posting),
                    Err(err) => {
                        warn!(source = SOURCE, error = %err, "skipping malformed item");
                        out.skipped += 1;
                    }
                }
            }
            if !body.more {
                break;
            }
            page += 1;
            tokio::time::sleep(self.page_delay).await;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(json: serde_json::Value) -> SjItem {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn converts_a_complete_item() {
        let posting = convert_item(item(serde_json::json!({
            "profession": "Rust разработчик",
            "firm_name": "Globex",
            "town": {"title": "Москва"},
            "payment_from": 90000,
            "payment_to": 120000,
            "currency": "rub",
            "candidat": "Опыт от 3 лет.",
            "date_published": 1772000000,
            "link": "https://superjob.ru/vakansii/1.html"
        })))
        .unwrap();

        assert_eq!(posting.title, "Rust разработчик");
        assert_eq!(posting.company, "Globex");
        assert_eq!(posting.location, "Москва");
        assert_eq!(posting.salary.as_deref(), Some("от 90000 до 120000 rub"));
        assert_eq!(posting.description, "Опыт от 3 лет.");
        assert_eq!(posting.published_at.timestamp(), 1_772_000_000);
        assert_eq!(posting.source, "superjob.ru");
    }

    #[test]
    fn zero_zero_payment_is_undisclosed() {
        let posting = convert_item(item(serde_json::json!({
            "profession": "Курьер",
            "payment_from": 0,
            "payment_to": 0,
            "date_published": 1772000000,
            "link": "https://superjob.ru/vakansii/2.html"
        })))
        .unwrap();
        assert_eq!(posting.salary, None);
        assert_eq!(posting.company, "");
    }

    #[test]
    fn missing_link_is_malformed() {
        let result = convert_item(item(serde_json::json!({
            "profession": "Курьер",
            "date_published": 1772000000
        })));
        assert!(matches!(result, Err(AdapterError::Malformed(_))));
    }

    #[test]
    fn page_with_missing_fields_still_deserializes() {
        let page: SjPage = serde_json::from_str("{}").unwrap();
        assert!(page.objects.is_empty());
        assert!(!page.more);
    }
}
