//! Recurring driver for the ingestion cycle.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::{run_cycle_with_config, IngestConfig};

/// Owns the background job runner. One cycle is kicked off immediately on
/// start, then one every `interval_secs`. Building a fresh scheduler replaces
/// any previous one; `shutdown` stops the runner cleanly.
///
/// Cycles are assumed to finish well inside the interval; nothing here
/// prevents an overrun, the interval is simply expected to be long enough.
pub struct IngestScheduler {
    inner: JobScheduler,
}

impl IngestScheduler {
    pub async fn start(config: IngestConfig) -> Result<Self> {
        let sched = JobScheduler::new().await.context("creating scheduler")?;

        let interval = Duration::from_secs(config.interval_secs.max(1));
        let job_config = config.clone();
        let job = Job::new_repeated_async(interval, move |_id, _lock| {
            let config = job_config.clone();
            Box::pin(async move {
                run_cycle_with_config(&config).await;
            })
        })
        .context("creating ingestion job")?;
        sched.add(job).await.context("adding ingestion job")?;
        sched.start().await.context("starting scheduler")?;

        // First cycle right away, off the startup path.
        tokio::spawn(async move {
            run_cycle_with_config(&config).await;
        });

        info!(interval_secs = interval.as_secs(), "ingestion scheduler started");
        Ok(Self { inner: sched })
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await.context("stopping scheduler")?;
        info!("ingestion scheduler stopped");
        Ok(())
    }
}
