use {
    crate::domain::{Category, audience::AdTechIdentifier},
    std::time::Duration,
};

/// Structured record of one group's bidding run. Steps that never ran leave
/// their fields unset.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub buyer: AdTechIdentifier,
    pub num_ads: usize,
    pub outcome: Option<Outcome>,
    pub latency: Option<Duration>,
    pub script_fetch_latency: Option<Duration>,
    pub script_size: Option<usize>,
    pub signals_fetch_latency: Option<Duration>,
    pub num_signal_keys: Option<usize>,
    pub signals_size: Option<usize>,
    pub generate_bids_latency: Option<Duration>,
    pub returned_ad_cost: bool,
    pub data_version_in_signals: bool,
}

impl Stats {
    pub fn new(buyer: AdTechIdentifier, num_ads: usize) -> Self {
        Self {
            buyer,
            num_ads,
            outcome: None,
            latency: None,
            script_fetch_latency: None,
            script_size: None,
            signals_fetch_latency: None,
            num_signal_keys: None,
            signals_size: None,
            generate_bids_latency: None,
            returned_ad_cost: false,
            data_version_in_signals: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    Bid,
    NoBid,
    Failed(Category),
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Self::Failed(category) => category.as_str(),
            _ => self.into(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait StatsSink: Send + Sync {
    fn record(&self, stats: &Stats);
}
