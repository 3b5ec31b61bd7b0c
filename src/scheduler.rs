//! Crawl scheduler - one traversal per interval, forever
//!
//! The scheduler is the sole recovery boundary: every error a traversal
//! propagates ends up here, gets logged, and the next cycle is attempted
//! after a full sleep. Failures never shorten or skip the interval, so a
//! persistent outage costs one missed data point per cycle rather than
//! process death.

use crate::crawler::Crawler;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Drive repeated crawl cycles from `root`, sleeping `interval` between
/// them. Never returns; callers race it against a shutdown signal.
pub async fn run_collector(crawler: Arc<Crawler>, root: String, interval: Duration) {
    log::info!(
        "⏰ Collector scheduled: root '{}', interval {}s",
        root,
        interval.as_secs()
    );

    loop {
        let cycle_start = std::time::Instant::now();

        match crawler.crawl_from(&root).await {
            Ok(stats) => {
                log::info!(
                    "✅ Crawl cycle complete: {} packages in {}s",
                    stats.visited,
                    cycle_start.elapsed().as_secs()
                );
            }
            Err(e) => {
                log::error!("❌ Crawl cycle failed: {}", e);
                log::info!("   └─ Retrying on next scheduled cycle");
            }
        }

        sleep(interval).await;
    }
}

/// Run the collector until `shutdown` resolves.
///
/// The loop itself never returns, so this is the only way the process
/// stops cleanly; in production `shutdown` is ctrl-c.
pub async fn run_collector_until_shutdown(
    crawler: Arc<Crawler>,
    root: String,
    interval: Duration,
    shutdown: impl Future<Output = ()>,
) {
    tokio::select! {
        _ = run_collector(crawler, root, interval) => {}
        _ = shutdown => {
            log::info!("🛑 Shutdown signal received, stopping collector");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DownloadSample;
    use crate::config::BucketConfig;
    use crate::registry::{RegistryClient, RegistryError};
    use crate::store::{Collection, DocumentStore, StoreError};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Registry that fails every metadata fetch but counts attempts.
    struct AlwaysFailingRegistry {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RegistryClient for AlwaysFailingRegistry {
        async fn fetch_metadata(&self, _name: &str) -> Result<Value, RegistryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(RegistryError::Unavailable("registry is down".to_string()))
        }

        async fn fetch_downloads(&self, _name: &str) -> Result<Vec<DownloadSample>, RegistryError> {
            Ok(Vec::new())
        }

        async fn fetch_dependents(&self, _name: &str) -> Result<Vec<String>, RegistryError> {
            Ok(Vec::new())
        }
    }

    /// Store that drops everything on the floor.
    struct NullStore {
        upserts: Mutex<usize>,
    }

    #[async_trait]
    impl DocumentStore for NullStore {
        async fn upsert(
            &self,
            _collection: Collection,
            _key: &str,
            _doc: &Value,
        ) -> Result<(), StoreError> {
            *self.upserts.lock().unwrap() += 1;
            Ok(())
        }

        async fn get(
            &self,
            _collection: Collection,
            _key: &str,
        ) -> Result<Option<Value>, StoreError> {
            Ok(None)
        }
    }

    fn test_crawler(attempts: Arc<AtomicUsize>) -> Arc<Crawler> {
        let registry = Arc::new(AlwaysFailingRegistry { attempts });
        let store = Arc::new(NullStore {
            upserts: Mutex::new(0),
        });

        Arc::new(Crawler::new(
            registry,
            store,
            HashSet::new(),
            BucketConfig {
                weeks: 1,
                months: 1,
                years: 1,
            },
            10,
        ))
    }

    #[tokio::test]
    async fn test_failed_cycles_do_not_stop_the_scheduler() {
        // Test: An always-failing crawl is retried on every cycle instead
        // of killing the loop
        let attempts = Arc::new(AtomicUsize::new(0));
        let crawler = test_crawler(attempts.clone());

        let handle = tokio::spawn(run_collector(
            crawler,
            "ghost-package".to_string(),
            Duration::from_millis(10),
        ));

        // Give the scheduler time for several cycles, then stop it
        sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(
            attempts.load(Ordering::SeqCst) >= 3,
            "expected repeated retry cycles, got {}",
            attempts.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_shutdown_future_stops_collector() {
        // Test: The collector loop ends cleanly once the shutdown future
        // resolves, after having run at least one cycle
        let attempts = Arc::new(AtomicUsize::new(0));
        let crawler = test_crawler(attempts.clone());

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(run_collector_until_shutdown(
            crawler,
            "ghost-package".to_string(),
            Duration::from_millis(10),
            async {
                let _ = rx.await;
            },
        ));

        sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("collector did not stop after shutdown")
            .unwrap();

        assert!(attempts.load(Ordering::SeqCst) >= 1);
    }
}
