//! CLI command definitions for styling-jobs.
//!
//! The `worker` command runs the polling loop; the others are the operator
//! actions around it: queueing work, inspecting job state and preparing the
//! database.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::enrichment::EnrichmentProcessor;
use crate::llm::LiteLlmClient;
use crate::metrics::{export_metrics, init_metrics, serve_metrics, MetricsCollector};
use crate::scheduler::job::is_retryable;
use crate::scheduler::{
    EnrichmentJobStatus, FailureRecord, InMemoryJobStore, JobStore, Priority, QueueStats,
    RedisJobStore, Worker, DEFAULT_PRIORITY, REENRICH_PRIORITY,
};
use crate::storage::{Database, EnrichmentStatus, ProductRepository};
use crate::sync::{ShopifyClient, SyncProcessor};

/// Background jobs for catalog enrichment and brand catalog sync.
#[derive(Parser)]
#[command(name = "styling-jobs")]
#[command(about = "Run and operate the catalog enrichment and sync job queue")]
#[command(version)]
#[command(
    long_about = "styling-jobs drains a Redis-backed job queue: products are classified by an LLM and embedded, and brand catalogs are pulled from Shopify.\n\nExample usage:\n  styling-jobs migrate\n  styling-jobs re-enrich prod_123\n  styling-jobs worker"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

/// Job store selection shared by every command.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL", global = true)]
    pub redis_url: Option<String>,

    /// Namespace prefix for every queue key.
    #[arg(long, env = "JOBS_KEY_PREFIX", global = true)]
    pub key_prefix: Option<String>,

    /// Use a process-local store instead of Redis (dry runs).
    #[arg(long, global = true)]
    pub in_memory: bool,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the polling worker until Ctrl-C.
    Worker(WorkerArgs),

    /// Queue products for enrichment at import priority.
    Enqueue(EnqueueArgs),

    /// Queue products for enrichment at re-enrichment priority.
    #[command(name = "re-enrich")]
    ReEnrich(ReEnrichArgs),

    /// Queue a catalog sync for a brand.
    #[command(name = "sync-brand")]
    SyncBrand(SyncBrandArgs),

    /// Show the enrichment status of one product.
    Status(StatusArgs),

    /// Show queue statistics.
    Stats(StatsArgs),

    /// Apply the database schema.
    Migrate(MigrateArgs),
}

/// Arguments for `styling-jobs worker`.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Delay between polls of an empty queue, in milliseconds.
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Claims allowed before a failing job is no longer retryable.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Model used to classify products.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Worker identifier used in logs.
    #[arg(long)]
    pub worker_id: Option<String>,

    /// Address to serve Prometheus metrics on (e.g. 0.0.0.0:9464).
    #[arg(long, env = "JOBS_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

/// Arguments for `styling-jobs enqueue`.
#[derive(Parser, Debug)]
pub struct EnqueueArgs {
    /// Product ids to queue.
    #[arg(required = true)]
    pub product_ids: Vec<String>,

    /// Queue priority; lower values are processed first.
    #[arg(short, long, default_value_t = DEFAULT_PRIORITY, allow_negative_numbers = true)]
    pub priority: Priority,
}

/// Arguments for `styling-jobs re-enrich`.
#[derive(Parser, Debug)]
pub struct ReEnrichArgs {
    /// Product ids to queue.
    #[arg(required = true)]
    pub product_ids: Vec<String>,
}

/// Arguments for `styling-jobs sync-brand`.
#[derive(Parser, Debug)]
pub struct SyncBrandArgs {
    /// Brand id to sync.
    pub brand_id: String,

    /// Shopify Admin API access token for the brand's shop.
    #[arg(long, env = "SHOPIFY_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: String,
}

/// Arguments for `styling-jobs status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Product id to inspect.
    pub product_id: String,

    /// Also read the product row's persisted status.
    #[arg(long)]
    pub db: bool,

    /// PostgreSQL connection URL (used with --db).
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `styling-jobs stats`.
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Also count product rows per persisted status.
    #[arg(long)]
    pub db: bool,

    /// PostgreSQL connection URL (used with --db).
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Print the Prometheus exposition instead of a summary.
    #[arg(long, conflicts_with = "json")]
    pub prometheus: bool,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `styling-jobs migrate`.
#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// List applied migrations instead of applying pending ones.
    #[arg(long)]
    pub list: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.store)?;

    match cli.command {
        Commands::Worker(args) => run_worker_command(&cli.store, config, args).await,
        Commands::Enqueue(args) => {
            run_enqueue_command(&cli.store, &config, &args.product_ids, args.priority).await
        }
        Commands::ReEnrich(args) => {
            run_enqueue_command(&cli.store, &config, &args.product_ids, REENRICH_PRIORITY).await
        }
        Commands::SyncBrand(args) => run_sync_brand_command(&cli.store, &config, args).await,
        Commands::Status(args) => run_status_command(&cli.store, config, args).await,
        Commands::Stats(args) => run_stats_command(&cli.store, config, args).await,
        Commands::Migrate(args) => run_migrate_command(config, args).await,
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Loads the environment configuration with global flags applied on top.
fn load_config(store: &StoreArgs) -> anyhow::Result<WorkerConfig> {
    let mut config = WorkerConfig::from_env().context("Invalid job configuration")?;
    if let Some(url) = &store.redis_url {
        config = config.with_redis_url(url.clone());
    }
    if let Some(prefix) = &store.key_prefix {
        config = config.with_key_prefix(prefix.clone());
    }
    Ok(config)
}

async fn open_store(store: &StoreArgs, config: &WorkerConfig) -> anyhow::Result<Arc<dyn JobStore>> {
    if store.in_memory {
        warn!("Using in-memory job store; queued jobs are lost when the process exits");
        return Ok(Arc::new(
            InMemoryJobStore::new()
                .with_max_attempts(config.max_attempts)
                .with_processing_ttl(config.processing_ttl),
        ));
    }

    let redis = RedisJobStore::connect(&config.redis_url, &config.key_prefix)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))?
        .with_max_attempts(config.max_attempts)
        .with_processing_ttl(config.processing_ttl);
    Ok(Arc::new(redis))
}

async fn open_database(database_url: Option<&str>) -> anyhow::Result<Database> {
    let url = database_url.ok_or_else(|| {
        anyhow::anyhow!(
            "DATABASE_URL is required but not set.\n\
             Provide it via --database-url <URL> or set the DATABASE_URL environment variable."
        )
    })?;
    Database::connect(url)
        .await
        .context("Failed to connect to PostgreSQL")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize JSON output")?;
    println!("{}", json);
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

async fn run_worker_command(
    store_args: &StoreArgs,
    mut config: WorkerConfig,
    args: WorkerArgs,
) -> anyhow::Result<()> {
    if let Some(url) = args.database_url {
        config = config.with_database_url(url);
    }
    if let Some(ms) = args.poll_interval_ms {
        config.poll = config.poll.with_poll_interval(Duration::from_millis(ms));
    }
    if let Some(max_attempts) = args.max_attempts {
        config = config.with_max_attempts(max_attempts);
    }
    if let Some(model) = args.model {
        config = config.with_classifier_model(model);
    }
    config.validate().context("Invalid worker configuration")?;

    if let Err(e) = init_metrics() {
        warn!(error = %e, "Failed to initialize metrics");
    }

    let store = open_store(store_args, &config).await?;
    let database = Arc::new(open_database(config.database_url.as_deref()).await?);
    let llm = Arc::new(LiteLlmClient::from_env().map_err(|e| {
        anyhow::anyhow!(
            "Failed to initialize LLM client: {}. Set LITELLM_API_BASE (and LITELLM_API_KEY if required).",
            e
        )
    })?);

    let enrichment = EnrichmentProcessor::new(database.clone(), llm.clone(), llm)
        .with_classifier_model(config.classifier_model.clone())
        .with_embedding_model(config.embedding_model.clone());
    let source = ShopifyClient::new(config.shopify_api_version.clone(), config.sync_page_size);
    let sync = SyncProcessor::new(database, Arc::new(source)).with_job_store(store.clone());

    let mut worker = Worker::new(store, Arc::new(enrichment), Arc::new(sync))
        .with_policy(config.poll);
    if let Some(id) = args.worker_id {
        worker = worker.with_id(id);
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    if let Some(addr) = args.metrics_addr {
        let metrics_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(addr, metrics_shutdown).await {
                error!(addr = %addr, error = %e, "Metrics endpoint stopped");
            }
        });
    }
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested, finishing current job"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C, stopping worker"),
        }
        let _ = shutdown_tx.send(());
    });

    worker.run(shutdown_rx).await;
    Ok(())
}

async fn run_enqueue_command(
    store_args: &StoreArgs,
    config: &WorkerConfig,
    product_ids: &[String],
    priority: Priority,
) -> anyhow::Result<()> {
    let store = open_store(store_args, config).await?;

    for product_id in product_ids {
        store
            .enqueue_enrichment(product_id, priority)
            .await
            .with_context(|| format!("Failed to enqueue product {}", product_id))?;
        info!(product_id = %product_id, priority, "Enrichment job queued");
        println!("queued {} (priority {})", product_id.trim(), priority);
    }

    Ok(())
}

async fn run_sync_brand_command(
    store_args: &StoreArgs,
    config: &WorkerConfig,
    args: SyncBrandArgs,
) -> anyhow::Result<()> {
    let store = open_store(store_args, config).await?;
    store
        .enqueue_sync_shopify(&args.brand_id, &args.access_token)
        .await
        .with_context(|| format!("Failed to enqueue sync for brand {}", args.brand_id))?;

    info!(brand_id = %args.brand_id, "Sync job queued");
    println!("queued catalog sync for brand {}", args.brand_id.trim());
    Ok(())
}

/// Queue-side and database-side view of one product.
#[derive(Debug, Serialize)]
struct StatusReport {
    product_id: String,
    queue_status: EnrichmentJobStatus,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<FailureRecord>,
    /// Set only when the latest outcome is a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    db_status: Option<EnrichmentStatus>,
    diverged: bool,
}

/// The row claims to be in flight but the queue has no trace of it.
fn is_diverged(queue_status: EnrichmentJobStatus, db_status: Option<EnrichmentStatus>) -> bool {
    db_status == Some(EnrichmentStatus::Processing)
        && !matches!(
            queue_status,
            EnrichmentJobStatus::Pending | EnrichmentJobStatus::Processing
        )
}

async fn run_status_command(
    store_args: &StoreArgs,
    config: WorkerConfig,
    args: StatusArgs,
) -> anyhow::Result<()> {
    let store = open_store(store_args, &config).await?;
    let product_id = args.product_id.trim().to_string();

    let queue_status = store
        .enrichment_status(&product_id)
        .await
        .context("Failed to read queue status")?;
    let attempts = store.enrichment_attempts(&product_id).await?;
    let failure = store.enrichment_failure(&product_id).await?;

    let db_status = if args.db {
        let url = args.database_url.as_deref().or(config.database_url.as_deref());
        let database = open_database(url).await?;
        database
            .enrichment_status(&product_id)
            .await
            .context("Failed to read product row")?
    } else {
        None
    };

    let retryable = match (&failure, queue_status) {
        (Some(failure), EnrichmentJobStatus::Failed) => {
            Some(is_retryable(failure.attempts, config.max_attempts))
        }
        _ => None,
    };

    let report = StatusReport {
        diverged: is_diverged(queue_status, db_status),
        retryable,
        product_id,
        queue_status,
        attempts,
        failure,
        db_status,
    };

    if args.json {
        return print_json(&report);
    }

    println!("product:      {}", report.product_id);
    println!("queue status: {}", report.queue_status);
    println!("attempts:     {}", report.attempts);
    if let Some(failure) = &report.failure {
        println!(
            "last failure: {} (attempt {}, {})",
            failure.error, failure.attempts, failure.failed_at
        );
    }
    if let Some(retryable) = report.retryable {
        println!("retryable:    {}", if retryable { "yes" } else { "no (attempts exhausted)" });
    }
    if args.db {
        match report.db_status {
            Some(status) => println!("db status:    {}", status),
            None => println!("db status:    <no product row>"),
        }
    }
    if report.diverged {
        println!("warning: product row is 'processing' but the queue holds no job for it");
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct StatsReport {
    enrichment: QueueStats,
    sync_pending: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    products: Option<Vec<(EnrichmentStatus, u64)>>,
}

async fn run_stats_command(
    store_args: &StoreArgs,
    config: WorkerConfig,
    args: StatsArgs,
) -> anyhow::Result<()> {
    let store = open_store(store_args, &config).await?;
    let enrichment = store.enrichment_stats().await;
    let sync_pending = store
        .sync_pending()
        .await
        .context("Failed to read sync queue length")?;

    if args.prometheus {
        init_metrics().context("Failed to initialize metrics")?;
        MetricsCollector::new().set_queue_depths(&enrichment, Some(sync_pending));
        print!("{}", export_metrics());
        return Ok(());
    }

    let products = if args.db {
        let url = args.database_url.as_deref().or(config.database_url.as_deref());
        let database = open_database(url).await?;
        Some(
            database
                .count_by_enrichment_status()
                .await
                .context("Failed to count products")?,
        )
    } else {
        None
    };

    let report = StatsReport {
        enrichment,
        sync_pending,
        products,
    };

    if args.json {
        return print_json(&report);
    }

    println!("enrichment queue");
    println!("  pending:    {}", report.enrichment.pending);
    println!("  processing: {}", report.enrichment.processing);
    println!("  failed:     {}", report.enrichment.failed);
    println!("  completed:  {}", report.enrichment.completed);
    println!("sync queue");
    println!("  pending:    {}", report.sync_pending);
    if let Some(products) = &report.products {
        println!("products by enrichment status");
        for (status, count) in products {
            println!("  {:<11} {}", format!("{}:", status), count);
        }
    }

    Ok(())
}

async fn run_migrate_command(config: WorkerConfig, args: MigrateArgs) -> anyhow::Result<()> {
    let url = args.database_url.as_deref().or(config.database_url.as_deref());
    let database = open_database(url).await?;

    if args.list {
        let migrations = database
            .applied_migrations()
            .await
            .context("Failed to list migrations")?;
        if migrations.is_empty() {
            println!("no migrations applied");
        }
        for migration in &migrations {
            println!("{}  {}", migration.applied_at.to_rfc3339(), migration.name);
        }
        return Ok(());
    }

    let applied = database
        .run_migrations()
        .await
        .context("Failed to apply migrations")?;

    if applied.is_empty() {
        println!("schema is up to date");
    } else {
        for name in &applied {
            println!("applied {}", name);
        }
    }
    Ok(())
}
