//! Recursive dependent-graph crawl
//!
//! One traversal walks from a root package through its dependent graph:
//! per package it fetches metadata, downloads and (when fan-out is
//! enabled) dependents, normalizes and aggregates them, and upserts the
//! results. A traversal-scoped visited set makes the walk terminate on
//! cyclic graphs and fetch each package at most once; a node ceiling
//! bounds runaway graphs. Any failure aborts the whole traversal - a
//! partial dataset is worse than a visibly failed run that retries on
//! the next scheduled cycle.

use crate::aggregate::{rollup, DownloadRollup};
use crate::config::BucketConfig;
use crate::normalizer::{normalize_module, NormalizeError};
use crate::registry::{RegistryClient, RegistryError};
use crate::store::{Collection, DocumentStore, StoreError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Debug)]
pub enum CrawlError {
    Registry(RegistryError),
    Normalize(NormalizeError),
    Store(StoreError),
    NodeLimitExceeded(usize),
}

impl From<RegistryError> for CrawlError {
    fn from(err: RegistryError) -> Self {
        CrawlError::Registry(err)
    }
}

impl From<NormalizeError> for CrawlError {
    fn from(err: NormalizeError) -> Self {
        CrawlError::Normalize(err)
    }
}

impl From<StoreError> for CrawlError {
    fn from(err: StoreError) -> Self {
        CrawlError::Store(err)
    }
}

impl std::fmt::Display for CrawlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrawlError::Registry(e) => write!(f, "Registry error: {}", e),
            CrawlError::Normalize(e) => write!(f, "Normalize error: {}", e),
            CrawlError::Store(e) => write!(f, "Store error: {}", e),
            CrawlError::NodeLimitExceeded(limit) => {
                write!(f, "Crawl aborted: node ceiling of {} exceeded", limit)
            }
        }
    }
}

impl std::error::Error for CrawlError {}

/// Dependent-name list persisted per package, overwritten each crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentSet {
    pub name: String,
    pub dependents: Vec<String>,
}

/// Summary of one finished traversal, for scheduler logging.
#[derive(Debug, Clone, Copy)]
pub struct CrawlStats {
    /// Distinct packages visited (and therefore fetched).
    pub visited: usize,
}

/// Orchestrates fetch -> normalize -> aggregate -> persist per package
/// and the sequential recursion into dependents.
pub struct Crawler {
    registry: Arc<dyn RegistryClient>,
    store: Arc<dyn DocumentStore>,
    /// Packages whose dependents fan the crawl out another level. The
    /// policy is re-evaluated against this set at every depth.
    fanout_allowlist: HashSet<String>,
    buckets: BucketConfig,
    max_nodes: usize,
}

impl Crawler {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        store: Arc<dyn DocumentStore>,
        fanout_allowlist: HashSet<String>,
        buckets: BucketConfig,
        max_nodes: usize,
    ) -> Self {
        Self {
            registry,
            store,
            fanout_allowlist,
            buckets,
            max_nodes,
        }
    }

    /// Run one full traversal from `root`, always resolving the root's
    /// dependents. The visited set lives exactly as long as this call.
    pub async fn crawl_from(&self, root: &str) -> Result<CrawlStats, CrawlError> {
        let mut visited = HashSet::new();
        self.crawl(root.to_string(), &mut visited, true).await?;

        Ok(CrawlStats {
            visited: visited.len(),
        })
    }

    /// Visit one package and, when enabled, recurse into its dependents.
    ///
    /// Recursion is sequential (one dependent at a time), which bounds
    /// outbound registry concurrency to 1. Boxed because async fns
    /// cannot recurse directly.
    fn crawl<'a>(
        &'a self,
        name: String,
        visited: &'a mut HashSet<String>,
        resolve_dependents: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), CrawlError>> + Send + 'a>> {
        Box::pin(async move {
            // Idempotence guard: a package reachable via multiple paths
            // (or a cycle) is fetched once per traversal
            if !visited.insert(name.clone()) {
                log::debug!("↩️  Already visited {}, skipping", name);
                return Ok(());
            }

            if visited.len() > self.max_nodes {
                return Err(CrawlError::NodeLimitExceeded(self.max_nodes));
            }

            log::info!("📦 Crawling {}", name);

            // Metadata first, then downloads, then dependents; readers of
            // partially-written state may see fresh metadata with stale
            // download data, never the reverse
            let raw = self.registry.fetch_metadata(&name).await?;
            let record = normalize_module(&name, &raw)?;
            self.store
                .upsert(Collection::Modules, &name, &record.to_document()?)
                .await?;

            let samples = self.registry.fetch_downloads(&name).await?;
            let now = Utc::now().date_naive();
            let downloads: DownloadRollup = rollup(&name, samples, now, self.buckets);
            let rollup_doc = serde_json::to_value(&downloads).map_err(StoreError::from)?;
            self.store
                .upsert(Collection::Downloads, &name, &rollup_doc)
                .await?;

            if resolve_dependents {
                let dependents = self.registry.fetch_dependents(&name).await?;
                log::info!("   └─ {} dependents of {}", dependents.len(), name);

                let set = DependentSet {
                    name: name.clone(),
                    dependents: dependents.clone(),
                };
                let set_doc = serde_json::to_value(&set).map_err(StoreError::from)?;
                self.store
                    .upsert(Collection::Dependents, &name, &set_doc)
                    .await?;

                for dependent in dependents {
                    let fan_out = self.fanout_allowlist.contains(&dependent);
                    self.crawl(dependent, visited, fan_out).await?;
                }
            }

            Ok(())
        })
    }
}
