//! Developer overrides let app developers test bidding logic and trusted
//! signals locally without serving them from the buyer's origin.

use {
    crate::domain::{
        audience::{BuyerGroup, GroupKey},
        signals::Signals,
    },
    std::{collections::HashMap, sync::Mutex},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOverride {
    pub script: String,
    /// The protocol version the script implements. Legacy when absent.
    pub version: Option<u64>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DevOverrides: Send + Sync {
    async fn bidding_script(&self, group: &BuyerGroup) -> Option<ScriptOverride>;
    async fn trusted_signals(&self, group: &BuyerGroup) -> Option<Signals>;
}

pub struct NoOverrides;

#[async_trait::async_trait]
impl DevOverrides for NoOverrides {
    async fn bidding_script(&self, _: &BuyerGroup) -> Option<ScriptOverride> {
        None
    }

    async fn trusted_signals(&self, _: &BuyerGroup) -> Option<Signals> {
        None
    }
}

#[derive(Debug, Default)]
struct Entry {
    script: Option<ScriptOverride>,
    signals: Option<Signals>,
}

/// Overrides registered at runtime, keyed by group.
#[derive(Debug, Default)]
pub struct InMemoryOverrides(Mutex<HashMap<GroupKey, Entry>>);

impl InMemoryOverrides {
    pub fn set_script(&self, key: GroupKey, script: ScriptOverride) {
        self.entries().entry(key).or_default().script = Some(script);
    }

    pub fn set_signals(&self, key: GroupKey, signals: Signals) {
        self.entries().entry(key).or_default().signals = Some(signals);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<GroupKey, Entry>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl DevOverrides for InMemoryOverrides {
    async fn bidding_script(&self, group: &BuyerGroup) -> Option<ScriptOverride> {
        self.entries().get(&group.key())?.script.clone()
    }

    async fn trusted_signals(&self, group: &BuyerGroup) -> Option<Signals> {
        self.entries().get(&group.key())?.signals.clone()
    }
}
