use std::sync::Arc;

use tracing::warn;

use crate::cache::{ResponseCache, LISTING_KEY};
use crate::config::Config;
use crate::observability::metrics::Metrics;
use crate::service::{InMemoryTravelerService, TravelerService};

pub const DEFAULT_LIST_FETCH_LIMIT: usize = 10_000;

pub struct AppState {
    pub service: Arc<dyn TravelerService>,
    pub cache: ResponseCache,
    pub metrics: Metrics,
    pub list_fetch_limit: usize,
}

impl AppState {
    pub fn new(service: Arc<dyn TravelerService>, cache: ResponseCache) -> Self {
        Self {
            service,
            cache,
            metrics: Metrics::new(),
            list_fetch_limit: DEFAULT_LIST_FETCH_LIMIT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let service = Arc::new(InMemoryTravelerService::new(config.upload_dir.clone()));
        Self {
            list_fetch_limit: config.list_fetch_limit,
            ..Self::new(service, ResponseCache::new(config.cache_dir.clone()))
        }
    }

    /// Drops the cached traveler listing after a mutation. Failures are
    /// logged and never surface to the caller.
    pub async fn invalidate_listing(&self) {
        match self.cache.invalidate(LISTING_KEY).await {
            Ok(true) => self.metrics.listing_cache_invalidations_total.inc(),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "failed to invalidate listing cache"),
        }
    }
}
