//! Provincial bills ingestion CLI.
//!
//! `bills worker` runs the job workers and the cron scheduler until Ctrl-C.
//! Every other subcommand performs one service call and prints JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use bills_core::config::Config;
use bills_core::domains::bills::{ListOptions, SearchQuery};
use bills_core::domains::ingestion::IngestJobHandler;
use bills_core::kernel::jobs::{spawn_workers, JobWorkerConfig};
use bills_core::kernel::scheduled_tasks::start_scheduler;
use bills_core::server::{build_deps, build_service, EnqueueOptions, IngestService};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "bills")]
#[command(about = "Provincial legislative bills ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run job workers and scheduled tasks
    Worker {
        /// Overrides WORKER_CONCURRENCY
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Enqueue a scrape of one source
    Enqueue {
        source_id: String,
        #[arg(long)]
        force_refresh: bool,
    },

    /// Enqueue a scrape of every registered source
    EnqueueAll {
        #[arg(long)]
        force_refresh: bool,
    },

    /// Enqueue bill details enrichment for one source
    Details {
        source_id: String,
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Show a job's status
    Status { job_id: Uuid },

    /// List stored bills for a source
    List {
        source_id: String,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one bill
    Get { source_id: String, bill_number: String },

    /// Search titles and descriptions
    Search {
        query: String,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Bill counts by source and status
    Stats,

    /// Fail stale jobs and purge expired ones
    Purge,

    /// Store and queue reachability
    Health,
}

fn output<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bills_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let deps = build_deps(pool, &config).await?;

    if let Commands::Worker { concurrency } = cli.command {
        return run_worker(deps, &config, concurrency).await;
    }

    let service = build_service(deps, &config);
    run_command(&service, cli.command).await
}

async fn run_command(service: &IngestService, command: Commands) -> Result<()> {
    match command {
        Commands::Worker { .. } => Ok(()),
        Commands::Enqueue {
            source_id,
            force_refresh,
        } => {
            let job_id = service
                .enqueue_job(&source_id, EnqueueOptions { force_refresh })
                .await?;
            output(&serde_json::json!({ "job_id": job_id, "source_id": source_id }))
        }
        Commands::EnqueueAll { force_refresh } => {
            output(&service.enqueue_all(EnqueueOptions { force_refresh }).await?)
        }
        Commands::Details { source_id, limit } => {
            let job_id = service.enqueue_bill_details(&source_id, limit).await?;
            output(&serde_json::json!({ "job_id": job_id, "source_id": source_id }))
        }
        Commands::Status { job_id } => output(&service.get_job_status(job_id).await?),
        Commands::List {
            source_id,
            limit,
            offset,
            status,
        } => {
            let options = ListOptions {
                limit,
                offset,
                status,
            };
            output(&service.list_bills(&source_id, options).await?)
        }
        Commands::Get {
            source_id,
            bill_number,
        } => output(&service.get_bill(&source_id, &bill_number).await?),
        Commands::Search {
            query,
            source,
            status,
            limit,
        } => {
            let query = SearchQuery {
                source_id: source,
                status,
                limit,
                ..SearchQuery::new(query)
            };
            output(&service.search_bills(query).await?)
        }
        Commands::Stats => output(&service.get_statistics().await?),
        Commands::Purge => {
            let purged = service.purge_expired().await?;
            output(&serde_json::json!({ "purged": purged }))
        }
        Commands::Health => output(&service.health().await?),
    }
}

async fn run_worker(
    deps: bills_core::kernel::ServerDeps,
    config: &Config,
    concurrency: Option<usize>,
) -> Result<()> {
    let concurrency = concurrency.unwrap_or(config.worker_concurrency);
    tracing::info!(concurrency, "Starting ingestion workers");

    let mut scheduler = start_scheduler(
        deps.clone(),
        &config.purge_schedule,
        config.scrape_schedule.as_deref(),
    )
    .await
    .context("Failed to start scheduler")?;

    let shutdown = CancellationToken::new();
    let handler = Arc::new(IngestJobHandler::new(deps.clone()));
    let workers = spawn_workers(
        concurrency,
        deps.queue.clone(),
        handler,
        deps.retry,
        JobWorkerConfig::default(),
        shutdown.clone(),
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, waiting for in-flight jobs");
    shutdown.cancel();

    for worker in workers {
        match worker.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Worker exited with error"),
            Err(e) => tracing::error!(error = %e, "Worker task panicked"),
        }
    }

    scheduler.shutdown().await?;
    tracing::info!("Workers stopped");
    Ok(())
}
