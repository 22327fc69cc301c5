use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub listing_cache_lookups_total: IntCounterVec,
    pub listing_cache_invalidations_total: IntCounter,
    pub file_uploads_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let listing_cache_lookups_total = IntCounterVec::new(
            Opts::new(
                "listing_cache_lookups_total",
                "Traveler listing cache lookups by outcome",
            ),
            &["outcome"],
        )
        .expect("valid listing_cache_lookups_total metric");

        let listing_cache_invalidations_total = IntCounter::new(
            "listing_cache_invalidations_total",
            "Listing cache artifacts removed after a mutation",
        )
        .expect("valid listing_cache_invalidations_total metric");

        let file_uploads_total = IntCounterVec::new(
            Opts::new("file_uploads_total", "Attachment uploads by outcome"),
            &["outcome"],
        )
        .expect("valid file_uploads_total metric");

        registry
            .register(Box::new(listing_cache_lookups_total.clone()))
            .expect("register listing_cache_lookups_total");
        registry
            .register(Box::new(listing_cache_invalidations_total.clone()))
            .expect("register listing_cache_invalidations_total");
        registry
            .register(Box::new(file_uploads_total.clone()))
            .expect("register file_uploads_total");

        Self {
            registry,
            listing_cache_lookups_total,
            listing_cache_invalidations_total,
            file_uploads_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
