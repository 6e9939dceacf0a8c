//! fl.ru HTML scraping adapter.
//!
//! Listing pages are fetched and parsed with structural selectors; each
//! listing then costs one more GET for the full description on its detail
//! page. All HTML work happens in sync helpers returning owned data, so no
//! parsed document is held across an await point.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobfeed_core::RawPosting;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION};
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use crate::normalize::{fl_salary, parse_relative_date};
use crate::{http_client, AdapterError, FetchOutcome, SourceAdapter};

pub const FL_BASE_URL: &str = "https://www.fl.ru";
const SOURCE: &str = "fl.ru";
// Long delay; the site blocks aggressive clients.
const PAGE_DELAY: Duration = Duration::from_millis(2000);
const LOCATION: &str = "Удалённая работа";
const DEFAULT_COMPANY: &str = "Частное лицо";

pub struct FlAdapter {
    client: reqwest::Client,
    base_url: String,
    page_delay: Duration,
}

impl FlAdapter {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, AdapterError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("ru-RU,ru;q=0.8,en-US;q=0.5,en;q=0.3"),
        );
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        Ok(Self {
            client: http_client(user_agent, timeout, headers)?,
            base_url: FL_BASE_URL.to_string(),
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

    async fn fetch_listing_page(&self, query: &str, page: u32) -> Result<String, AdapterError> {
        let url = format!("{}/projects/", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("kind", "1"), ("sb", "1"), ("q", query), ("page", &page.to_string())])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    async fn fetch_description(&self, url: &str) -> Result<String, AdapterError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let html = response.text().await?;
        parse_detail_description(&html)
    }
}

/// One listing block extracted from a search-results page.
#[derive(Debug, Clone, PartialEq)]
pub struct FlListing {
    pub title: String,
    pub url: String,
    pub company: String,
    pub salary: Option<String>,
    pub published_at: DateTime<Utc>,
}

fn selector(input: &str) -> Result<Selector, AdapterError> {
    Selector::parse(input).map_err(|e| AdapterError::Selector(e.to_string()))
}

fn element_text(el: &ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract all listing blocks from a search-results page. A block without a
/// title link is dropped.
pub fn parse_listing_page(
    html: &str,
    base_url: &str,
    now: DateTime<Utc>,
) -> Result<Vec<FlListing>, AdapterError> {
    let document = Html::parse_document(html);
    let block_sel = selector("div.project")?;
    let title_sel = selector("a.b-post__link")?;
    let price_sel = selector("span.b-post__price")?;
    let employer_sel = selector("a.b-post__link_txt")?;
    let time_sel = selector("span.b-post__time")?;

    let mut listings = Vec::new();
    for block in document.select(&block_sel) {
        let Some(link) = block.select(&title_sel).next() else {
            continue;
        };
        let title = element_text(&link);
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if title.is_empty() {
            continue;
        }
        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{base_url}{href}")
        };
        let salary = block
            .select(&price_sel)
            .next()
            .map(|el| element_text(&el))
            .and_then(|text| fl_salary(&text));
        let company = block
            .select(&employer_sel)
            .next()
            .map(|el| element_text(&el))
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| DEFAULT_COMPANY.to_string());
        let published_at = block
            .select(&time_sel)
            .next()
            .map(|el| parse_relative_date(&element_text(&el), now))
            .unwrap_or(now);

        listings.push(FlListing {
            title,
            url,
            company,
            salary,
            published_at,
        });
    }
    Ok(listings)
}

/// Full project description from a detail page; empty when the block is
/// missing.
pub fn parse_detail_description(html: &str) -> Result<String, AdapterError> {
    let document = Html::parse_document(html);
    let sel = selector("div.b-layout__txt")?;
    Ok(document
        .select(&sel)
        .next()
        .map(|el| {
            el.text()
                .map(str::trim)
                .filter(|chunk| !chunk.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default())
}

#[async_trait]
impl SourceAdapter for FlAdapter {
    fn source(&self) -> &'static str {
        SOURCE
    }

    async fn fetch(&self, query: &str) -> FetchOutcome {
        let mut out = FetchOutcome::default();
        let mut page = 1u32;
        loop {
            let html = match self.fetch_listing_page(query, page).await {
                Ok(html) => html,
                Err(err) => {
                    warn!(source = SOURCE, page, error = %err, "page fetch failed, stopping pagination");
                    out.last_error = Some(err);
                    break;
                }
            };
            let listings = match parse_listing_page(&html, &self.base_url, Utc::now()) {
                Ok(listings) => listings,
                Err(err) => {
                    warn!(source = SOURCE, page, error = %err, "page parse failed, stopping pagination");
                    out.last_error = Some(err);
                    break;
                }
            };
            if listings.is_empty() {
                break;
            }
            for listing in listings {
                let description = match self.fetch_description(&listing.url).await {
                    Ok(description) => description,
                    Err(err) => {
                        warn!(source = SOURCE, url = %listing.url, error = %err,
                              "detail fetch failed, keeping listing without description");
                        String::new()
                    }
                };
                tokio::time::sleep(self.page_delay).await;
                out.postings.push(RawPosting {
                    title: listing.title,
                    company: listing.company,
                    location: LOCATION.to_string(),
                    salary: listing.salary,
                    description,
                    published_at: listing.published_at,
                    source: SOURCE.to_string(),
                    original_url: listing.url,
                });
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
    use chrono::TimeZone;

    const LISTING_HTML: &str = r#"
        <html><body>
          <div class="project">
            <a class="b-post__link" href="/projects/101/">Разработать парсер на Rust</a>
            <span class="b-post__price">1500 руб</span>
            <a class="b-post__link_txt">ООО Ромашка</a>
            <span class="b-post__time">сегодня в 14:30</span>
          </div>
          <div class="project">
            <a class="b-post__link" href="/projects/102/">Доработать сайт</a>
            <span class="b-post__price">Договорная</span>
            <span class="b-post__time">позавчера</span>
          </div>
          <div class="project"><span>no title link here</span></div>
        </body></html>
    "#;

    #[test]
    fn parses_listing_blocks_with_fallbacks() {
        let now = Utc.with_ymd_and_hms(2026, 2, 24, 20, 0, 0).single().unwrap();
        let listings = parse_listing_page(LISTING_HTML, "https://www.fl.ru", now).unwrap();
        assert_eq!(listings.len(), 2);

        assert_eq!(listings[0].title, "Разработать парсер на Rust");
        assert_eq!(listings[0].url, "https://www.fl.ru/projects/101/");
        assert_eq!(listings[0].salary.as_deref(), Some("1500 руб"));
        assert_eq!(listings[0].company, "ООО Ромашка");
        assert_eq!(listings[0].published_at.to_rfc3339(), "2026-02-24T14:30:00+00:00");

        // Negotiable price, missing employer, unknown date shape.
        assert_eq!(listings[1].salary, None);
        assert_eq!(listings[1].company, "Частное лицо");
        assert_eq!(listings[1].published_at, now);
    }

    #[test]
    fn empty_page_yields_no_listings() {
        let now = Utc::now();
        let listings = parse_listing_page("<html><body></body></html>", "https://www.fl.ru", now).unwrap();
        assert!(listings.is_empty());
    }

    #[test]
    fn detail_description_joins_text_blocks() {
        let html = r#"<div class="b-layout__txt"><p>Нужен парсер.</p><p>Срок неделя.</p></div>"#;
        assert_eq!(parse_detail_description(html).unwrap(), "Нужен парсер.\nСрок неделя.");
        assert_eq!(parse_detail_description("<div></div>").unwrap(), "");
    }
}
