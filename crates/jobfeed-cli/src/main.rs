use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobfeed_ingest::scheduler::IngestScheduler;
use jobfeed_ingest::{run_cycle_with_config, IngestConfig};
use jobfeed_storage::VacancyStore;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "jobfeed")]
#[command(about = "Job vacancy aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the web UI with the recurring ingestion scheduler (default).
    Serve,
    /// Run one ingestion cycle and exit.
    Ingest,
    /// Create the database and its schema, then exit.
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = IngestConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await?,
        Commands::Ingest => match run_cycle_with_config(&config).await {
            Some(summary) => println!(
                "ingestion complete: run_id={} fetched={} inserted={} duplicates={} swept={}",
                summary.run_id,
                summary.fetched,
                summary.inserted,
                summary.duplicates,
                summary.removed_duplicates
            ),
            None => anyhow::bail!("could not open the vacancy store at {}", config.database_path),
        },
        Commands::InitDb => {
            VacancyStore::open(&config.database_path)
                .await
                .context("initializing database")?;
            println!("database ready at {}", config.database_path);
        }
    }

    Ok(())
}

async fn serve(config: IngestConfig) -> Result<()> {
    let store = VacancyStore::open(&config.database_path)
        .await
        .context("opening vacancy store")?;

    // The read side keeps serving even if the scheduler cannot come up.
    let mut scheduler = match IngestScheduler::start(config).await {
        Ok(scheduler) => Some(scheduler),
        Err(err) => {
            error!(error = %err, "ingestion scheduler failed to start, serving without it");
            None
        }
    };

    jobfeed_web::serve_until(store, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await?;

    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(err) = scheduler.shutdown().await {
            error!(error = %err, "scheduler shutdown failed");
        }
    }
    Ok(())
}
