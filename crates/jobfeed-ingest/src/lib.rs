//! Ingestion coordination: adapter registry, cycle driver, summaries.

pub mod scheduler;

use std::time::Duration;

use chrono::{DateTime, Utc};
use jobfeed_adapters::{FlAdapter, HhAdapter, SjAdapter, SourceAdapter, DEFAULT_USER_AGENT};
use jobfeed_storage::VacancyStore;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobfeed-ingest";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database_path: String,
    pub search_query: String,
    pub hh_area: u32,
    pub sj_town: u32,
    pub sj_api_key: Option<String>,
    pub interval_secs: u64,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        Self {
            database_path: std::env::var("JOBFEED_DB")
                .unwrap_or_else(|_| "vacancies.db".to_string()),
            search_query: std::env::var("JOBFEED_QUERY")
                .unwrap_or_else(|_| "Python".to_string()),
            hh_area: std::env::var("HH_AREA")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            sj_town: std::env::var("SJ_TOWN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            sj_api_key: std::env::var("SJ_API_KEY").ok().filter(|k| !k.is_empty()),
            interval_secs: std::env::var("JOBFEED_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            user_agent: std::env::var("JOBFEED_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            http_timeout_secs: std::env::var("JOBFEED_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }

    fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// All configured adapters. One that cannot be constructed (client build
/// failure, unusable API key header) is logged and left out so the others
/// still run.
pub fn default_adapters(config: &IngestConfig) -> Vec<Box<dyn SourceAdapter>> {
    let timeout = config.http_timeout();
    let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();
    match HhAdapter::new(&config.user_agent, timeout, config.hh_area) {
        Ok(adapter) => adapters.push(Box::new(adapter)),
        Err(err) => error!(error = %err, "hh.ru adapter unavailable"),
    }
    match SjAdapter::new(
        &config.user_agent,
        timeout,
        config.sj_town,
        config.sj_api_key.as_deref(),
    ) {
        Ok(adapter) => adapters.push(Box::new(adapter)),
        Err(err) => error!(error = %err, "superjob.ru adapter unavailable"),
    }
    match FlAdapter::new(&config.user_agent, timeout) {
        Ok(adapter) => adapters.push(Box::new(adapter)),
        Err(err) => error!(error = %err, "fl.ru adapter unavailable"),
    }
    adapters
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped_items: usize,
    pub fetch_failed: bool,
    pub storage_errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped_items: usize,
    pub removed_duplicates: u64,
    pub sources: Vec<SourceSummary>,
}

/// One complete pass: every adapter in turn, every posting upserted, one
/// dedup sweep at the end. Nothing here fails outward — a dead source or a
/// failing insert is logged, counted, and the cycle moves on.
pub async fn run_ingestion_cycle(
    store: &VacancyStore,
    adapters: &[Box<dyn SourceAdapter>],
    query: &str,
) -> CycleSummary {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(%run_id, query, adapters = adapters.len(), "ingestion cycle started");

    let mut sources = Vec::with_capacity(adapters.len());
    for adapter in adapters {
        let outcome = adapter.fetch(query).await;
        let mut summary = SourceSummary {
            source: adapter.source().to_string(),
            fetched: outcome.postings.len(),
            inserted: 0,
            duplicates: 0,
            skipped_items: outcome.skipped,
            fetch_failed: outcome.failed(),
            storage_errors: 0,
        };
        for posting in &outcome.postings {
            match store.insert(posting).await {
                Ok(true) => summary.inserted += 1,
                Ok(false) => summary.duplicates += 1,
                Err(err) => {
                    warn!(source = %summary.source, error = %err, "insert failed, continuing");
                    summary.storage_errors += 1;
                }
            }
        }
        info!(
            source = %summary.source,
            fetched = summary.fetched,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            skipped = summary.skipped_items,
            fetch_failed = summary.fetch_failed,
            "source processed"
        );
        sources.push(summary);
    }

    let removed_duplicates = match store.remove_duplicates().await {
        Ok(removed) => removed,
        Err(err) => {
            warn!(error = %err, "dedup sweep failed");
            0
        }
    };

    let summary = CycleSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        fetched: sources.iter().map(|s| s.fetched).sum(),
        inserted: sources.iter().map(|s| s.inserted).sum(),
        duplicates: sources.iter().map(|s| s.duplicates).sum(),
        skipped_items: sources.iter().map(|s| s.skipped_items).sum(),
        removed_duplicates,
        sources,
    };
    info!(
        run_id = %summary.run_id,
        fetched = summary.fetched,
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        removed = summary.removed_duplicates,
        "ingestion cycle finished"
    );
    summary
}

/// Open the store, build the registry, run one cycle. Returns `None` only
/// when the store itself cannot be opened; that too is logged rather than
/// raised.
pub async fn run_cycle_with_config(config: &IngestConfig) -> Option<CycleSummary> {
    let store = match VacancyStore::open(&config.database_path).await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, path = %config.database_path, "cannot open vacancy store, skipping cycle");
            return None;
        }
    };
    let adapters = default_adapters(config);
    Some(run_ingestion_cycle(&store, &adapters, &config.search_query).await)
}
