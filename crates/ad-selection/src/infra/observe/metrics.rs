use {
    prometheus_metric_storage::{MetricStorage, StorageRegistry},
    std::sync::OnceLock,
};

/// Metrics of the auction pipeline.
#[derive(Debug, Clone, MetricStorage)]
#[metric(subsystem = "ad_selection")]
pub struct Metrics {
    /// Bidding logic fetches by negotiated version or error.
    #[metric(labels("result"))]
    pub script_fetches: prometheus::IntCounterVec,
    /// Trusted signals fetches.
    #[metric(labels("result"))]
    pub signals_fetches: prometheus::IntCounterVec,
    /// Per-group bidding results.
    #[metric(labels("result"))]
    pub group_bids: prometheus::IntCounterVec,
    /// Time spent bidding for one group.
    #[metric(buckets(0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0))]
    pub group_bidding_time: prometheus::Histogram,
    /// Groups cancelled because their buyer ran out of time.
    pub cancelled_groups: prometheus::IntCounter,
    /// Contextual bundles left out of auctions.
    #[metric(labels("reason"))]
    pub dropped_contextual: prometheus::IntCounterVec,
    /// Auction ids that were drawn again because they were taken.
    pub id_collisions: prometheus::IntCounter,
    /// Auction durations by result.
    #[metric(
        labels("result"),
        buckets(0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 7.5, 10.0, 15.0)
    )]
    pub auctions: prometheus::HistogramVec,
    /// Failed post-auction side effects.
    #[metric(labels("effect"))]
    pub post_effect_failures: prometheus::IntCounterVec,
}

static REGISTRY: OnceLock<StorageRegistry> = OnceLock::new();

/// Use the given registry for all metrics. Has no effect once any metric has
/// been recorded.
pub fn init(registry: prometheus::Registry) {
    REGISTRY.set(StorageRegistry::new(registry)).ok();
}

/// Get the metrics instance.
pub fn get() -> &'static Metrics {
    Metrics::instance(REGISTRY.get_or_init(StorageRegistry::default))
        .expect("unexpected error getting metrics instance")
}
