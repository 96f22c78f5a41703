pub mod audience;
pub mod auction;
pub mod bid;
pub mod bidding;
pub mod contextual;
pub mod debug_report;
pub mod filtering;
pub mod selection;
pub mod signals;
pub mod validation;
pub mod version;

pub use {
    audience::{Ad, AdTechIdentifier, BuyerGroup, CustomAudienceSignals},
    auction::{AuctionConfig, AuctionRequest, Caller},
    bid::{AdWithBid, BidOutcome, Candidate, GeneratedBid, ScoredOutcome},
    contextual::ContextualAdBundle,
    signals::{DataVersion, Signals},
    version::ScriptVersion,
};

/// Stable names for the classes of failures an auction can run into. These
/// are reported to callers and used as metric labels, so the strings must not
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    ValidationRejected,
    NoCandidates,
    ProtocolViolation,
    FetchFailure,
    Timeout,
    NoViableBid,
    NoWinningAd,
    EngineError,
    Internal,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}
