use anyhow::Result;
use rollup_explorer::api::ExplorerRpc;
use rollup_explorer::config::Config;
use rollup_explorer::enrichment::EnrichmentEngine;
use rollup_explorer::feed::{FeedStart, RpcFeed, RpcFeedConfig};
use rollup_explorer::repository::{Database, L1BatchRepository};
use rollup_explorer::rpc::RpcClient;
use rollup_explorer::tracker::FinalizationTracker;
use rollup_explorer::verification::{SolcCompiler, spawn_verifier};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting rollup explorer");

    let config = Config::from_env()?;
    let rpc_urls = config.require_rpc_urls()?;
    info!("Configuration loaded");
    info!("RPC URLs: {} endpoint(s) configured", rpc_urls.len());

    let db = Database::new(&config.database_url)?;
    let first_unverified = L1BatchRepository::new(&db.conn).first_unverified_number()?;
    info!("Database initialized");

    let tracker = FinalizationTracker::new(db, EnrichmentEngine::new(config.enrichment))?;
    let head = tracker.head();
    info!(
        "Resuming at sealed block {:?}, verified batch {:?}",
        head.last_sealed_block, head.last_verified_batch
    );

    let compiler = SolcCompiler::new(&config.compilers_dir, config.compilation_timeout)?;
    let (verifier, _dispatcher) = spawn_verifier(
        Database::new(&config.database_url)?,
        compiler,
        config.verifier_workers,
    )?;

    let server = ExplorerRpc::new(
        config.database_url.clone(),
        tracker.subscribe(),
        config.limits,
        verifier,
    )
    .launch(config.api_bind_addr)
    .await?;
    info!("Explorer API listening on {}", config.api_bind_addr);

    let client = RpcClient::new(rpc_urls)?;
    info!("RPC client connected");

    let start = FeedStart {
        next_block: head
            .last_sealed_block
            .map_or(config.feed_start_block, |number| number + 1),
        next_anchor_batch: first_unverified
            .or_else(|| head.last_verified_batch.map(|number| number + 1)),
        last_sealed_batch: head.last_sealed_batch,
    };
    let mut feed = RpcFeed::new(
        client,
        RpcFeedConfig {
            poll_interval: config.feed_poll_interval,
            token_refresh_interval: config.token_refresh_interval,
        },
        start,
    );

    let result = tracker.run(&mut feed).await;
    server.stop().ok();
    if let Err(e) = result {
        error!("Indexer error: {}", e);
        return Err(e);
    }

    Ok(())
}
