use {
    super::{audience::AdTechIdentifier, contextual::ContextualAdBundle, signals::Signals},
    std::collections::HashMap,
    url::Url,
};

/// The app requesting an auction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub package: String,
    pub foreground: bool,
}

/// Seller supplied parameters of an auction.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionConfig {
    pub seller: AdTechIdentifier,
    pub decision_logic_uri: Url,
    pub buyers: Vec<AdTechIdentifier>,
    pub auction_signals: Signals,
    pub seller_signals: Signals,
    pub per_buyer_signals: HashMap<AdTechIdentifier, Signals>,
    pub contextual_ads: Vec<ContextualAdBundle>,
}

impl AuctionConfig {
    pub fn buyer_signals(&self, buyer: &AdTechIdentifier) -> Signals {
        self.per_buyer_signals
            .get(buyer)
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuctionRequest {
    pub caller: Caller,
    pub config: AuctionConfig,
}
