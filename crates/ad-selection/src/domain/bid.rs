use {
    super::{
        audience::{Ad, AdTechIdentifier, CustomAudienceSignals},
        signals::Signals,
        version::ScriptVersion,
    },
    serde::{Deserialize, Serialize},
    std::sync::Arc,
    url::Url,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdWithBid {
    pub ad: Ad,
    pub bid: f64,
}

impl AdWithBid {
    pub fn new(ad: Ad, bid: f64) -> Self {
        Self { ad, bid }
    }
}

/// Debug reporting URIs registered by a bidding or scoring script. They may
/// contain placeholders that are filled in once the auction is decided.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugReportUris {
    pub win: Option<Url>,
    pub loss: Option<Url>,
}

impl DebugReportUris {
    pub fn is_empty(&self) -> bool {
        self.win.is_none() && self.loss.is_none()
    }
}

/// A single bid as returned by the bidding engine.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedBid {
    pub ad_with_bid: AdWithBid,
    pub ad_cost: Option<f64>,
    pub debug_report: DebugReportUris,
}

impl GeneratedBid {
    pub fn new(ad: Ad, bid: f64) -> Self {
        Self {
            ad_with_bid: AdWithBid::new(ad, bid),
            ad_cost: None,
            debug_report: Default::default(),
        }
    }
}

/// Picks the highest non-negative bid. Earlier bids win ties.
pub fn select_highest(bids: Vec<GeneratedBid>) -> Option<GeneratedBid> {
    bids.into_iter()
        .filter(|bid| bid.ad_with_bid.bid >= 0.)
        .fold(None, |best: Option<GeneratedBid>, bid| match best {
            Some(best) if best.ad_with_bid.bid >= bid.ad_with_bid.bid => Some(best),
            _ => Some(bid),
        })
}

/// Everything that went into producing a group's winning bid. Shared between
/// the bid and the persisted auction result.
#[derive(Debug, Clone, PartialEq)]
pub struct BiddingInfo {
    pub bidding_logic_uri: Url,
    pub script: String,
    pub script_version: ScriptVersion,
    pub custom_audience: CustomAudienceSignals,
    pub trusted_bidding_signals: Signals,
    pub buyer_contextual_signals: Signals,
}

/// The winning bid of one buyer group.
#[derive(Debug, Clone, PartialEq)]
pub struct BidOutcome {
    pub ad_with_bid: AdWithBid,
    pub ad_cost: Option<f64>,
    pub info: Arc<BiddingInfo>,
    pub debug_report: DebugReportUris,
}

impl BidOutcome {
    pub fn buyer(&self) -> &AdTechIdentifier {
        &self.info.custom_audience.buyer
    }
}

/// A bid that was not produced on the device but supplied with the auction
/// request.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextualBid {
    pub buyer: AdTechIdentifier,
    pub decision_logic_uri: Url,
    pub buyer_signals: Signals,
    pub ad_with_bid: AdWithBid,
}

/// Anything that can be handed to the scoring engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    OnDevice(BidOutcome),
    Contextual(ContextualBid),
}

impl Candidate {
    pub fn buyer(&self) -> &AdTechIdentifier {
        match self {
            Self::OnDevice(outcome) => outcome.buyer(),
            Self::Contextual(bid) => &bid.buyer,
        }
    }

    pub fn ad_with_bid(&self) -> &AdWithBid {
        match self {
            Self::OnDevice(outcome) => &outcome.ad_with_bid,
            Self::Contextual(bid) => &bid.ad_with_bid,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredOutcome {
    pub candidate: Candidate,
    pub score: f64,
    pub seller_contextual_signals: Option<Signals>,
}
