use {
    crate::domain::{
        audience::{AdTechIdentifier, CustomAudienceSignals},
        auction::Caller,
        bid::{Candidate, ScoredOutcome},
        signals::Signals,
    },
    chrono::{DateTime, Utc},
    std::collections::BTreeSet,
    url::Url,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub struct AuctionId(pub u64);

/// What is stored about a finished auction. Later reporting for the auction
/// is keyed by the id.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionResult {
    pub id: AuctionId,
    pub creation_time: DateTime<Utc>,
    pub caller_package: String,
    pub buyer: AdTechIdentifier,
    pub render_uri: Url,
    pub bid: f64,
    pub ad_cost: Option<f64>,
    pub ad_counter_keys: BTreeSet<u32>,
    /// Absent when a contextual ad won.
    pub custom_audience: Option<CustomAudienceSignals>,
    /// The bidding logic for on-device winners, the decision logic of the
    /// bundle for contextual ones.
    pub bidding_logic_uri: Url,
    pub bidding_script: Option<String>,
    pub buyer_contextual_signals: Signals,
    pub seller_contextual_signals: Signals,
}

impl AuctionResult {
    pub fn new(
        id: AuctionId,
        creation_time: DateTime<Utc>,
        caller: &Caller,
        winner: &ScoredOutcome,
    ) -> Self {
        let ad_with_bid = winner.candidate.ad_with_bid();
        let (custom_audience, bidding_logic_uri, bidding_script, buyer_contextual_signals) =
            match &winner.candidate {
                Candidate::OnDevice(outcome) => (
                    Some(outcome.info.custom_audience.clone()),
                    outcome.info.bidding_logic_uri.clone(),
                    Some(outcome.info.script.clone()),
                    outcome.info.buyer_contextual_signals.clone(),
                ),
                Candidate::Contextual(bid) => (
                    None,
                    bid.decision_logic_uri.clone(),
                    None,
                    bid.buyer_signals.clone(),
                ),
            };
        Self {
            id,
            creation_time,
            caller_package: caller.package.clone(),
            buyer: winner.candidate.buyer().clone(),
            render_uri: ad_with_bid.ad.render_uri.clone(),
            bid: ad_with_bid.bid,
            ad_cost: match &winner.candidate {
                Candidate::OnDevice(outcome) => outcome.ad_cost,
                Candidate::Contextual(_) => None,
            },
            ad_counter_keys: ad_with_bid.ad.ad_counter_keys.clone(),
            custom_audience,
            bidding_logic_uri,
            bidding_script,
            buyer_contextual_signals,
            seller_contextual_signals: winner.seller_contextual_signals.clone().unwrap_or_default(),
        }
    }
}
