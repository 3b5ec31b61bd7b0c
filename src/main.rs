//! pkgintel collector - periodic package-registry harvesting
//!
//! Walks the dependent graph from a configured root package, normalizes
//! registry metadata, aggregates download counts into calendar-aligned
//! rollups, and upserts everything into SQLite for the reporting layer.

pub mod aggregate;
pub mod config;
pub mod crawler;
pub mod normalizer;
pub mod registry;
pub mod scheduler;
pub mod store;

use {
    config::CollectorConfig,
    crawler::Crawler,
    registry::HttpRegistryClient,
    scheduler::run_collector_until_shutdown,
    std::sync::Arc,
    store::SqliteStore,
    tokio::time::Duration,
};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = CollectorConfig::from_env()?;

    log::info!("🚀 Starting pkgintel collector");
    log::info!("📊 Configuration:");
    log::info!("   ├─ Registry: {}", config.registry_url);
    log::info!("   ├─ Downloads API: {}", config.downloads_url);
    log::info!("   ├─ Database: {}", config.db_path);
    log::info!("   ├─ Root package: {}", config.root_package);
    log::info!("   ├─ Interval: {}s", config.interval_secs);
    log::info!(
        "   ├─ Buckets: {}w / {}m / {}y",
        config.buckets.weeks,
        config.buckets.months,
        config.buckets.years
    );
    log::info!("   ├─ Fan-out allowlist: {:?}", config.fanout_allowlist);
    log::info!("   └─ Node ceiling: {}", config.max_crawl_nodes);

    let store = Arc::new(SqliteStore::open(&config.db_path, &config.schema_dir)?);

    let registry = Arc::new(HttpRegistryClient::new(
        &config.registry_url,
        &config.downloads_url,
        config.http_timeout_secs,
        config.buckets.years,
    )?);

    let crawler = Arc::new(Crawler::new(
        registry,
        store,
        config.fanout_allowlist.clone(),
        config.buckets,
        config.max_crawl_nodes,
    ));

    let interval = Duration::from_secs(config.interval_secs);
    let root = config.root_package.clone();

    run_collector_until_shutdown(crawler, root, interval, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await;

    Ok(())
}
