//! Buyer groups ("custom audiences") and the ads they carry. These are owned
//! by the audience management subsystem and are read-only during an auction.

use {
    super::signals::Signals,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::{collections::BTreeSet, time::Duration},
    url::Url,
};

/// Identifies an ad tech, buyer or seller, by its domain.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct AdTechIdentifier(String);

impl AdTechIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AdTechIdentifier {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A candidate ad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ad {
    pub render_uri: Url,
    /// Opaque JSON metadata supplied by the buyer.
    pub metadata: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub ad_counter_keys: BTreeSet<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<AdFilters>,
}

impl Ad {
    pub fn new(render_uri: Url, metadata: impl Into<String>) -> Self {
        Self {
            render_uri,
            metadata: metadata.into(),
            ad_counter_keys: Default::default(),
            filters: None,
        }
    }

    /// The ad as it is shown to the bidding script: filter predicates and
    /// counter keys are device-side state and are never forwarded.
    pub fn stripped(&self) -> Self {
        Self {
            render_uri: self.render_uri.clone(),
            metadata: self.metadata.clone(),
            ad_counter_keys: Default::default(),
            filters: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdFilters {
    #[serde(default)]
    pub frequency_caps: Vec<KeyedFrequencyCap>,
    /// The ad is not shown if any of these packages is installed.
    #[serde(default)]
    pub app_install_packages: Vec<String>,
}

/// Limits how often an event may be recorded for ads sharing a counter key
/// within a sliding interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedFrequencyCap {
    pub event: FrequencyCapEvent,
    pub ad_counter_key: u32,
    pub max_count: u32,
    pub interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyCapEvent {
    Win,
    Impression,
    View,
    Click,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustedBiddingData {
    pub uri: Url,
    pub keys: Vec<String>,
}

/// One buyer's pool of candidate ads together with its bidding
/// configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyerGroup {
    /// The app that joined the group.
    pub owner: String,
    pub buyer: AdTechIdentifier,
    pub name: String,
    pub activation_time: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub bidding_logic_uri: Url,
    pub trusted_bidding_data: Option<TrustedBiddingData>,
    pub user_bidding_signals: Option<Signals>,
    pub ads: Vec<Ad>,
}

impl BuyerGroup {
    pub fn key(&self) -> GroupKey {
        GroupKey {
            owner: self.owner.clone(),
            buyer: self.buyer.clone(),
            name: self.name.clone(),
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.activation_time <= now && now < self.expiration_time
    }

    /// Snapshot of the group that is handed to the bidding script and kept
    /// for reporting.
    pub fn signals(&self) -> CustomAudienceSignals {
        CustomAudienceSignals {
            owner: self.owner.clone(),
            buyer: self.buyer.clone(),
            name: self.name.clone(),
            activation_time: self.activation_time,
            expiration_time: self.expiration_time,
            user_bidding_signals: self.user_bidding_signals.clone().unwrap_or_default(),
        }
    }
}

/// Uniquely identifies a buyer group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub owner: String,
    pub buyer: AdTechIdentifier,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomAudienceSignals {
    pub owner: String,
    pub buyer: AdTechIdentifier,
    pub name: String,
    pub activation_time: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub user_bidding_signals: Signals,
}
