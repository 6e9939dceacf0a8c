//! Per-source vacancy adapters and their shared contracts.
//!
//! Every adapter translates one external system (JSON API or scraped HTML)
//! into [`RawPosting`] values. Transport and data problems stay inside the
//! adapter: a page-level failure ends that adapter's pagination, a bad item
//! is dropped, and the caller sees it all aggregated in [`FetchOutcome`].

pub mod fl;
pub mod hh;
pub mod normalize;
pub mod sj;

use std::time::Duration;

use async_trait::async_trait;
use jobfeed_core::RawPosting;
use reqwest::header::HeaderMap;
use thiserror::Error;

pub use fl::FlAdapter;
pub use hh::HhAdapter;
pub use sj::SjAdapter;

pub const CRATE_NAME: &str = "jobfeed-adapters";

/// Browser-like default; some sources reject obviously non-browser agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                                      (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed item: {0}")]
    Malformed(String),
    #[error("selector error: {0}")]
    Selector(String),
}

/// Aggregate result of one `fetch` call.
///
/// `postings` holds everything collected before pagination ended, `skipped`
/// counts malformed items that were dropped, and `last_error` records the
/// transport failure that cut pagination short, if any.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub postings: Vec<RawPosting>,
    pub skipped: usize,
    pub last_error: Option<AdapterError>,
}

impl FetchOutcome {
    pub fn failed(&self) -> bool {
        self.last_error.is_some()
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier recorded on every posting this adapter produces.
    fn source(&self) -> &'static str;

    /// Exhaust pagination for `query` and return everything collected.
    /// Never raises past the adapter boundary; in the worst case the outcome
    /// is empty with `last_error` set.
    async fn fetch(&self, query: &str) -> FetchOutcome;
}

pub(crate) fn http_client(
    user_agent: &str,
    timeout: Duration,
    headers: HeaderMap,
) -> Result<reqwest::Client, AdapterError> {
    Ok(reqwest::Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .gzip(true)
        .brotli(true)
        .timeout(timeout)
        .build()?)
}
