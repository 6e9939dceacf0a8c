//! Core domain model for jobfeed postings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "jobfeed-core";

/// One job posting as produced by a source adapter, before persistence.
///
/// `salary` is free text in whatever shape the source uses; `None` means the
/// source did not disclose it. `published_at` is always converted to UTC by
/// the adapter that produced the posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPosting {
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: Option<String>,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub original_url: String,
}

impl RawPosting {
    /// The (title, company, published_at) triple that identifies a posting
    /// across sources. Storage enforces uniqueness on exactly these fields.
    pub fn natural_key(&self) -> (&str, &str, DateTime<Utc>) {
        (&self.title, &self.company, self.published_at)
    }
}

/// A persisted posting with its surrogate row id.
///
/// Rows are immutable after insert; a natural-key collision never updates an
/// existing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPosting {
    pub id: i64,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: Option<String>,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub original_url: String,
}
