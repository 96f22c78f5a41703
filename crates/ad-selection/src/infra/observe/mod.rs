//! Observability of the auction pipeline. Every function represents an event
//! that is meaningful to the system; it logs the event and updates the
//! metrics if the event is worth measuring.

use {
    crate::{
        domain::{
            audience::{AdTechIdentifier, BuyerGroup},
            bid::BidOutcome,
            bidding::{self, Stats, StatsSink},
            selection::{self, AuctionId, AuctionResult, ContextualDrop, Effect},
        },
        infra::{
            script::{self, Script},
            trusted_signals::TrustedSignals,
        },
    },
    std::{sync::Once, time::Duration},
    tracing_subscriber::{
        EnvFilter,
        Layer,
        fmt::time::UtcTime,
        prelude::*,
        util::SubscriberInitExt,
    },
    url::Url,
};

pub mod metrics;

/// Set up logging. `filter` uses the `EnvFilter` syntax, e.g.
/// `warn,ad_selection=debug`.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init(filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(UtcTime::rfc_3339())
                .with_filter(EnvFilter::new(filter)),
        )
        .init();
}

/// Like [`init`] but can be called repeatedly, later calls are ignored.
/// Useful for tests.
pub fn init_reentrant(filter: &str) {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(EnvFilter::new(filter)),
            )
            .try_init()
            .ok();
    });
}

/// Observe that a developer override replaced the bidding logic of a group.
pub fn script_overridden(group: &BuyerGroup) {
    tracing::debug!(buyer = %group.buyer, group = %group.name, "using bidding logic override");
}

/// Observe the result of a bidding logic fetch.
pub fn script_fetched(uri: &Url, result: &Result<Script, script::Error>, elapsed: Duration) {
    let label = match result {
        Ok(script) => {
            tracing::debug!(%uri, version = ?script.version, ?elapsed, "fetched bidding logic");
            script.version.number().to_string()
        }
        Err(err) => {
            tracing::warn!(%uri, ?err, ?elapsed, "failed to fetch bidding logic");
            match err {
                script::Error::MissingBiddingLogic(_) => "missing",
                script::Error::TooHighVersion(_) => "too_high_version",
                script::Error::InvalidVersionHeader(_) => "invalid_version",
            }
            .to_owned()
        }
    };
    metrics::get()
        .script_fetches
        .with_label_values(&[label.as_str()])
        .inc();
}

/// Observe that a developer override replaced the trusted signals of a
/// group.
pub fn signals_overridden(group: &BuyerGroup) {
    tracing::debug!(buyer = %group.buyer, group = %group.name, "using trusted signals override");
}

/// Observe the result of a trusted signals fetch.
pub fn signals_fetched(uri: &Url, result: &anyhow::Result<TrustedSignals>, elapsed: Duration) {
    let label = match result {
        Ok(signals) => {
            tracing::debug!(
                %uri,
                data_version = ?signals.data_version,
                size = signals.size_bytes,
                ?elapsed,
                "fetched trusted signals"
            );
            "success"
        }
        Err(err) => {
            tracing::warn!(%uri, ?err, ?elapsed, "failed to fetch trusted signals");
            "error"
        }
    };
    metrics::get()
        .signals_fetches
        .with_label_values(&[label])
        .inc();
}

/// Observe the result of a group's bidding.
pub fn group_bid(group: &BuyerGroup, result: &Result<Option<BidOutcome>, bidding::Error>) {
    match result {
        Ok(Some(outcome)) => tracing::debug!(
            buyer = %group.buyer,
            group = %group.name,
            ad = %outcome.ad_with_bid.ad.render_uri,
            bid = outcome.ad_with_bid.bid,
            "group bid"
        ),
        Ok(None) => tracing::debug!(buyer = %group.buyer, group = %group.name, "no bid"),
        Err(err) => tracing::warn!(
            buyer = %group.buyer,
            group = %group.name,
            ?err,
            "bidding failed"
        ),
    }
}

/// Observe the structured record of a group's bidding.
pub fn bidding_stats(stats: &Stats) {
    tracing::debug!(?stats, "bidding stats");
    let label = stats.outcome.map_or("skipped", |outcome| outcome.label());
    metrics::get()
        .group_bids
        .with_label_values(&[label])
        .inc();
    if let Some(latency) = stats.latency {
        metrics::get()
            .group_bidding_time
            .observe(latency.as_secs_f64());
    }
}

/// Sends bidding stats to the logs and metrics.
pub struct StatsLogger;

impl StatsSink for StatsLogger {
    fn record(&self, stats: &Stats) {
        bidding_stats(stats);
    }
}

/// Observe that a group was cancelled because its buyer ran out of time.
pub fn bidding_cancelled(buyer: &AdTechIdentifier) {
    tracing::info!(%buyer, "cancelled bidding: buyer deadline expired");
    metrics::get().cancelled_groups.inc();
}

/// Observe that a contextual bundle was left out.
pub fn contextual_dropped(buyer: &AdTechIdentifier, reason: ContextualDrop) {
    tracing::info!(%buyer, ?reason, "dropped contextual ads");
    let reason: &'static str = reason.into();
    metrics::get()
        .dropped_contextual
        .with_label_values(&[reason])
        .inc();
}

/// Observe that the signing keys of a buyer could not be fetched.
pub fn contextual_key_unavailable(buyer: &AdTechIdentifier, err: &anyhow::Error) {
    tracing::warn!(%buyer, ?err, "failed to fetch signing keys");
    contextual_dropped(buyer, ContextualDrop::KeyUnavailable);
}

/// Observe that a drawn auction id is already taken.
pub fn auction_id_collision(id: AuctionId) {
    tracing::debug!(%id, "auction id collision");
    metrics::get().id_collisions.inc();
}

/// Observe a won auction.
pub fn auction_won(result: &AuctionResult, elapsed: Duration) {
    tracing::info!(
        id = %result.id,
        buyer = %result.buyer,
        ad = %result.render_uri,
        bid = result.bid,
        ?elapsed,
        "auction won"
    );
    metrics::get()
        .auctions
        .with_label_values(&["success"])
        .observe(elapsed.as_secs_f64());
}

/// Observe a failed auction.
pub fn auction_failed(err: &selection::Error, elapsed: Duration) {
    let category = err.category();
    tracing::warn!(%category, ?err, ?elapsed, "auction failed");
    metrics::get()
        .auctions
        .with_label_values(&[category.as_str()])
        .observe(elapsed.as_secs_f64());
}

/// Observe that a side effect of a won auction failed.
pub fn post_effect_failed(effect: Effect, err: &anyhow::Error) {
    tracing::warn!(?effect, ?err, "post auction effect failed");
    let effect: &'static str = effect.into();
    metrics::get()
        .post_effect_failures
        .with_label_values(&[effect])
        .inc();
}
