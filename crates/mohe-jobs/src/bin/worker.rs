//! mohe-worker: runs one distributed batch job against the shared database.
//!
//! Usage:
//!   mohe-worker topk-refresh --chunk-size 200
//!   mohe-worker maintenance
//!
//! Several workers may run the same job at once; chunk locks keep them from
//! processing the same place range twice.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mohe_db::{log_pool_metrics, Database, PoolConfig};
use mohe_jobs::{
    plan_chunks, ChunkRunner, DistributedLockCoordinator, LockConfig, LockMaintenance,
    TopKRefreshHandler, VectorStore, WorkerIdentity, DEFAULT_CHUNK_SIZE, DEFAULT_RETRY_LIMIT,
    EMBEDDING_REFRESH_JOB, TOPK_REFRESH_JOB,
};
use mohe_search::{
    SimilarityConfig, SimilarityEngine, TopKConfig, TopKMaintainer, TraitBoostTable,
    TraitKeywordNames,
};

#[derive(Parser)]
#[command(name = "mohe-worker")]
#[command(author, version, about = "Distributed batch worker for mohe")]
struct Cli {
    /// Job to run
    #[arg(value_enum)]
    job: JobKind,

    /// Place ids per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: i64,

    /// Failed chunks to retry after the main pass
    #[arg(long, default_value_t = DEFAULT_RETRY_LIMIT)]
    retry_limit: i64,

    /// Apply pending migrations before running
    #[arg(long)]
    migrate: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum JobKind {
    /// Recompute top-K neighbor lists for every described place
    TopkRefresh,
    /// Sweep expired locks and delete old completed ones
    Maintenance,
}

fn init_tracing() {
    // LOG_FORMAT - "json" or "text" (default: "text")
    // RUST_LOG   - standard env filter (default: "mohe=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mohe_worker=info,mohe_jobs=info,mohe_search=info,mohe_db=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let topk_config = TopKConfig::from_env();
    let pool_config =
        PoolConfig::for_concurrency(topk_config.batch_concurrency).with_env_overrides();
    let db = Database::connect_with_config(&database_url, pool_config)
        .await
        .context("Failed to connect to database")?;
    if cli.migrate {
        db.migrate().await.context("Failed to apply migrations")?;
    }

    let identity = WorkerIdentity::generate();
    let coordinator = DistributedLockCoordinator::new(
        Arc::new(db.locks.clone()),
        identity,
        LockConfig::from_env(),
    );

    match cli.job {
        JobKind::TopkRefresh => {
            run_topk_refresh(&db, coordinator, topk_config, cli.chunk_size, cli.retry_limit)
                .await?
        }
        JobKind::Maintenance => run_maintenance(&coordinator).await?,
    }

    log_pool_metrics(db.pool());
    Ok(())
}

async fn run_topk_refresh(
    db: &Database,
    coordinator: DistributedLockCoordinator,
    topk_config: TopKConfig,
    chunk_size: i64,
    retry_limit: i64,
) -> anyhow::Result<()> {
    let mut traits = TraitBoostTable::from_catalog(&db.keywords, &TraitKeywordNames::default())
        .await
        .context("Failed to load keyword catalog")?;
    if traits.is_empty() {
        warn!("No trait keywords found in catalog, using built-in keyword ids");
        traits = TraitBoostTable::legacy();
    }
    let engine = SimilarityEngine::new(SimilarityConfig::from_env(), traits);

    let vectors: Arc<dyn VectorStore> = Arc::new(db.vectors.clone());
    let maintainer = TopKMaintainer::new(
        engine,
        vectors.clone(),
        Arc::new(db.bookmarks.clone()),
        Arc::new(db.topk.clone()),
        topk_config,
    );
    let handler = TopKRefreshHandler::new(maintainer, vectors.clone());

    let Some((min_id, max_id)) = vectors.described_place_id_bounds().await? else {
        info!("No described places, nothing to refresh");
        return Ok(());
    };
    let chunk_ids: Vec<String> = plan_chunks(min_id, max_id, chunk_size)
        .iter()
        .map(|c| c.chunk_id())
        .collect();
    info!(
        job_name = TOPK_REFRESH_JOB,
        chunks = chunk_ids.len(),
        min_id,
        max_id,
        "Starting top-K refresh"
    );

    let maintenance =
        LockMaintenance::new(coordinator.clone(), vec![TOPK_REFRESH_JOB.to_string()]).start();

    let runner = ChunkRunner::new(coordinator, Arc::new(handler));
    let mut summary = runner.run_all(&chunk_ids).await;
    summary.merge(&runner.run_retries(retry_limit).await?);

    maintenance.shutdown().await?;
    let stats = runner.coordinator().lock_stats(TOPK_REFRESH_JOB).await?;
    info!(
        job_name = TOPK_REFRESH_JOB,
        completed = summary.completed,
        failed = summary.failed,
        skipped = summary.skipped,
        lost = summary.lost,
        processed = summary.processed,
        exhausted = stats.exhausted,
        "Top-K refresh finished"
    );
    Ok(())
}

async fn run_maintenance(coordinator: &DistributedLockCoordinator) -> anyhow::Result<()> {
    let retention = coordinator.config().retention;
    for job_name in [TOPK_REFRESH_JOB, EMBEDDING_REFRESH_JOB] {
        let expired = coordinator.mark_expired_as_failed(job_name).await?;
        let deleted = coordinator.cleanup_completed(job_name, retention).await?;
        let stats = coordinator.lock_stats(job_name).await?;
        info!(
            job_name,
            expired,
            deleted,
            locked = stats.locked,
            processing = stats.processing,
            completed = stats.completed,
            failed = stats.failed,
            exhausted = stats.exhausted,
            "Lock maintenance finished"
        );
    }
    Ok(())
}
