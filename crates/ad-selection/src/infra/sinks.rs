//! Destinations of the side effects of a finished auction.

use {
    crate::domain::selection::result::{AuctionId, AuctionResult},
    sha2::{Digest, Sha256},
    url::Url,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DebugReportSink: Send + Sync {
    /// Queues resolved debug report URIs for delivery.
    async fn enqueue(&self, uris: Vec<Url>) -> anyhow::Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AdCounterHistogramUpdater: Send + Sync {
    /// Records a win event for the counter keys of the winning ad.
    async fn record_win(&self, result: &AuctionResult) -> anyhow::Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait JoinSignaler: Send + Sync {
    async fn submit(&self, message: JoinMessage) -> anyhow::Result<()>;
}

/// Discards everything. Wired in for side effects that are disabled.
pub struct NoOpSink;

#[async_trait::async_trait]
impl DebugReportSink for NoOpSink {
    async fn enqueue(&self, _: Vec<Url>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl AdCounterHistogramUpdater for NoOpSink {
    async fn record_win(&self, _: &AuctionResult) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl JoinSignaler for NoOpSink {
    async fn submit(&self, _: JoinMessage) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Privacy preserving signal that an auction was won. Identifies the winning
/// ad only by a hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinMessage {
    pub auction_id: AuctionId,
    pub hash: [u8; 32],
}

impl JoinMessage {
    pub fn new(result: &AuctionResult) -> Self {
        let owner = result
            .custom_audience
            .as_ref()
            .map_or("", |audience| audience.owner.as_str());
        let preimage = format!(
            "{owner}|{}|{}|{}",
            result.buyer, result.bidding_logic_uri, result.render_uri
        );
        Self {
            auction_id: result.id,
            hash: Sha256::digest(preimage.as_bytes()).into(),
        }
    }
}
