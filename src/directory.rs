//! Instance directory: a TTL-bounded view of the pods to broadcast to.
//!
//! The directory never fails outward. A failed control-plane query is logged
//! and resolves to an empty target list, leaving the cache timestamp untouched
//! so the next call retries immediately.

use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error};

/// Source of instance addresses, typically the Kubernetes API
#[async_trait]
pub trait InstanceSource: Send + Sync {
    /// List the addresses of every instance currently matching the selector
    async fn list_instances(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Default)]
struct CacheEntry {
    addresses: Vec<String>,
    fetched_at: Option<Instant>,
}

/// Cached directory of instance addresses
pub struct InstanceDirectory {
    source: Arc<dyn InstanceSource>,
    ttl: Duration,
    cache: RwLock<CacheEntry>,
}

impl InstanceDirectory {
    pub fn new(source: Arc<dyn InstanceSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: RwLock::new(CacheEntry::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolve the current broadcast targets.
    ///
    /// A non-empty list fetched less than one TTL ago is returned as is.
    /// Otherwise the source is queried; only a successful query replaces the
    /// cached list and advances the fetch timestamp.
    pub async fn resolve_targets(&self) -> Vec<String> {
        let now = Instant::now();

        {
            let cache = self.cache.read().await;
            let fresh = cache
                .fetched_at
                .is_some_and(|at| now.duration_since(at) < self.ttl);

            if fresh && !cache.addresses.is_empty() {
                debug!("Returning cached pod list {:?}", cache.addresses);
                return cache.addresses.clone();
            }
        }

        debug!("Fetching instances from control plane");

        match self.source.list_instances().await {
            Ok(addresses) => {
                debug!("Fetched pods {:?}", addresses);

                let mut cache = self.cache.write().await;
                cache.addresses = addresses.clone();
                cache.fetched_at = Some(now);

                addresses
            }
            Err(e) => {
                error!("Failed to fetch pods: {}", e);
                Vec::new()
            }
        }
    }
}
