//! Seams to the script execution engine. Bidding and scoring logic is
//! buyer/seller supplied code that runs outside of this crate.

use crate::domain::{
    audience::{Ad, BuyerGroup, CustomAudienceSignals},
    auction::AuctionConfig,
    bid::{Candidate, GeneratedBid, ScoredOutcome},
    signals::Signals,
};

/// Arguments shared by both bidding calling conventions.
#[derive(Debug, Clone, PartialEq)]
pub struct BiddingInputs {
    pub auction_signals: Signals,
    pub per_buyer_signals: Signals,
    pub trusted_bidding_signals: Signals,
    pub contextual_signals: Signals,
    pub custom_audience: CustomAudienceSignals,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BiddingEngine: Send + Sync {
    /// Legacy convention: the script bids on an explicit list of ads.
    async fn generate_bids(
        &self,
        script: &str,
        ads: &[Ad],
        inputs: &BiddingInputs,
    ) -> anyhow::Result<Vec<GeneratedBid>>;

    /// Versioned convention: the script receives the whole group.
    async fn generate_bids_v3(
        &self,
        script: &str,
        group: &BuyerGroup,
        inputs: &BiddingInputs,
    ) -> anyhow::Result<Vec<GeneratedBid>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Scorer: Send + Sync {
    /// Scores every candidate. The returned outcomes keep the order of the
    /// candidates.
    async fn score(
        &self,
        candidates: Vec<Candidate>,
        config: &AuctionConfig,
    ) -> anyhow::Result<Vec<ScoredOutcome>>;
}
