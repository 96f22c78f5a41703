//! Pluggable ad filtering. Which filterers run is decided once when the
//! orchestrator is wired; callers always go through [`AdFilterer`].

use {
    super::{
        audience::{Ad, AdTechIdentifier, BuyerGroup, FrequencyCapEvent, KeyedFrequencyCap},
        contextual::ContextualAdBundle,
    },
    crate::infra::time,
    chrono::{DateTime, TimeDelta, Utc},
    std::sync::Arc,
};

pub trait AdFilterer: Send + Sync {
    /// Removes ads that must not participate. Groups left without any ads
    /// are dropped.
    fn filter_groups(&self, groups: Vec<BuyerGroup>) -> Vec<BuyerGroup>;

    /// Removes contextual ads that must not participate. Returns `None` if no
    /// ad is left.
    fn filter_contextual(&self, bundle: ContextualAdBundle) -> Option<ContextualAdBundle>;
}

fn retain_groups(
    groups: Vec<BuyerGroup>,
    is_filtered: impl Fn(&AdTechIdentifier, &Ad) -> bool,
) -> Vec<BuyerGroup> {
    groups
        .into_iter()
        .filter_map(|mut group| {
            if group.ads.is_empty() {
                return Some(group);
            }
            let buyer = group.buyer.clone();
            group.ads.retain(|ad| !is_filtered(&buyer, ad));
            (!group.ads.is_empty()).then_some(group)
        })
        .collect()
}

fn retain_contextual(
    mut bundle: ContextualAdBundle,
    is_filtered: impl Fn(&AdTechIdentifier, &Ad) -> bool,
) -> Option<ContextualAdBundle> {
    let buyer = bundle.buyer.clone();
    bundle.ads.retain(|ad| !is_filtered(&buyer, &ad.ad));
    (!bundle.ads.is_empty()).then_some(bundle)
}

pub struct NoOpFilterer;

impl AdFilterer for NoOpFilterer {
    fn filter_groups(&self, groups: Vec<BuyerGroup>) -> Vec<BuyerGroup> {
        groups
    }

    fn filter_contextual(&self, bundle: ContextualAdBundle) -> Option<ContextualAdBundle> {
        Some(bundle)
    }
}

/// Runs filterers in order.
pub struct FilterChain(pub Vec<Arc<dyn AdFilterer>>);

impl AdFilterer for FilterChain {
    fn filter_groups(&self, groups: Vec<BuyerGroup>) -> Vec<BuyerGroup> {
        self.0
            .iter()
            .fold(groups, |groups, filterer| filterer.filter_groups(groups))
    }

    fn filter_contextual(&self, bundle: ContextualAdBundle) -> Option<ContextualAdBundle> {
        self.0
            .iter()
            .try_fold(bundle, |bundle, filterer| filterer.filter_contextual(bundle))
    }
}

/// Counts of past ad events on the device.
#[cfg_attr(test, mockall::automock)]
pub trait AdCounterHistogram: Send + Sync {
    fn count(
        &self,
        buyer: &AdTechIdentifier,
        ad_counter_key: u32,
        event: FrequencyCapEvent,
        since: DateTime<Utc>,
    ) -> u64;
}

pub struct FrequencyCapFilterer {
    histogram: Arc<dyn AdCounterHistogram>,
}

impl FrequencyCapFilterer {
    pub fn new(histogram: Arc<dyn AdCounterHistogram>) -> Self {
        Self { histogram }
    }

    fn is_reached(&self, buyer: &AdTechIdentifier, cap: &KeyedFrequencyCap) -> bool {
        let since = TimeDelta::from_std(cap.interval)
            .ok()
            .and_then(|interval| time::now().checked_sub_signed(interval))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.histogram
            .count(buyer, cap.ad_counter_key, cap.event, since)
            >= u64::from(cap.max_count)
    }

    fn is_capped(&self, buyer: &AdTechIdentifier, ad: &Ad, contextual: bool) -> bool {
        ad.filters
            .iter()
            .flat_map(|filters| &filters.frequency_caps)
            // Contextual ads have no win history of their own.
            .filter(|cap| !(contextual && cap.event == FrequencyCapEvent::Win))
            .any(|cap| self.is_reached(buyer, cap))
    }
}

impl AdFilterer for FrequencyCapFilterer {
    fn filter_groups(&self, groups: Vec<BuyerGroup>) -> Vec<BuyerGroup> {
        retain_groups(groups, |buyer, ad| self.is_capped(buyer, ad, false))
    }

    fn filter_contextual(&self, bundle: ContextualAdBundle) -> Option<ContextualAdBundle> {
        retain_contextual(bundle, |buyer, ad| self.is_capped(buyer, ad, true))
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait InstalledApps: Send + Sync {
    fn is_installed(&self, package: &str) -> bool;
}

pub struct AppInstallFilterer {
    apps: Arc<dyn InstalledApps>,
}

impl AppInstallFilterer {
    pub fn new(apps: Arc<dyn InstalledApps>) -> Self {
        Self { apps }
    }

    fn is_installed(&self, ad: &Ad) -> bool {
        ad.filters
            .iter()
            .flat_map(|filters| &filters.app_install_packages)
            .any(|package| self.apps.is_installed(package))
    }
}

impl AdFilterer for AppInstallFilterer {
    fn filter_groups(&self, groups: Vec<BuyerGroup>) -> Vec<BuyerGroup> {
        retain_groups(groups, |_, ad| self.is_installed(ad))
    }

    fn filter_contextual(&self, bundle: ContextualAdBundle) -> Option<ContextualAdBundle> {
        retain_contextual(bundle, |_, ad| self.is_installed(ad))
    }
}

/// Decides which ad counter keys are forwarded with an ad into bidding.
pub trait AdCounterKeyCopier: Send + Sync {
    fn copy(&self, source: &Ad, target: Ad) -> Ad;
}

pub struct NoOpCopier;

impl AdCounterKeyCopier for NoOpCopier {
    fn copy(&self, _: &Ad, target: Ad) -> Ad {
        target
    }
}

pub struct CounterKeyCopier;

impl AdCounterKeyCopier for CounterKeyCopier {
    fn copy(&self, source: &Ad, mut target: Ad) -> Ad {
        target.ad_counter_keys = source.ad_counter_keys.clone();
        target
    }
}
