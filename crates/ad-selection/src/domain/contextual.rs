use {
    super::{
        audience::AdTechIdentifier,
        bid::{AdWithBid, Candidate, ContextualBid},
        signals::Signals,
    },
    serde::Serialize,
    url::Url,
};

/// Ads with precomputed bids that a buyer attached to the auction request,
/// signed with the buyer's key.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextualAdBundle {
    pub buyer: AdTechIdentifier,
    pub decision_logic_uri: Url,
    pub buyer_signals: Signals,
    pub ads: Vec<AdWithBid>,
    pub signature: Vec<u8>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedPayload<'a> {
    buyer: &'a AdTechIdentifier,
    decision_logic_uri: &'a Url,
    buyer_signals: &'a Signals,
    ads: &'a [AdWithBid],
}

impl ContextualAdBundle {
    /// The bytes covered by the signature.
    pub fn signed_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&SignedPayload {
            buyer: &self.buyer,
            decision_logic_uri: &self.decision_logic_uri,
            buyer_signals: &self.buyer_signals,
            ads: &self.ads,
        })
    }

    pub fn into_candidates(self) -> impl Iterator<Item = Candidate> {
        let Self {
            buyer,
            decision_logic_uri,
            buyer_signals,
            ads,
            ..
        } = self;
        ads.into_iter().map(move |ad_with_bid| {
            Candidate::Contextual(ContextualBid {
                buyer: buyer.clone(),
                decision_logic_uri: decision_logic_uri.clone(),
                buyer_signals: buyer_signals.clone(),
                ad_with_bid,
            })
        })
    }
}
