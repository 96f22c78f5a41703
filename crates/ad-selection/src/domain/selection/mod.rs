//! The auction: validate the caller, collect bids from every buyer, merge
//! them with contextual ads, score, pick and persist the winner.

use {
    crate::{
        domain::{
            Category,
            audience::{AdTechIdentifier, BuyerGroup},
            auction::{AuctionConfig, AuctionRequest, Caller},
            bid::{BidOutcome, Candidate, ScoredOutcome},
            bidding::{BidGenerator, BuyerBiddingRunner, BuyerContext, StatsSink},
            contextual::ContextualAdBundle,
            filtering::{
                AdCounterHistogram,
                AdCounterKeyCopier,
                AdFilterer,
                AppInstallFilterer,
                CounterKeyCopier,
                FilterChain,
                FrequencyCapFilterer,
                InstalledApps,
                NoOpCopier,
                NoOpFilterer,
            },
            validation::{CallerValidator, ForegroundValidator, Rejection},
        },
        infra::{
            self,
            AudienceStore,
            BiddingEngine,
            BuyerKeyFetcher,
            DevOverrides,
            Executors,
            IdGenerator,
            Persistence,
            Scorer,
            ScriptFetcher,
            SignatureVerifier,
            Transport,
            TrustedSignalsFetcher,
            observe,
            sinks::NoOpSink,
            time,
        },
    },
    futures::future::join_all,
    itertools::Itertools,
    std::{sync::Arc, time::Instant},
    thiserror::Error,
    tracing::Instrument,
    url::Url,
};

mod post_effects;
pub mod result;

pub use {
    post_effects::{Effect, PostEffects, Sinks},
    result::{AuctionId, AuctionResult},
};

/// Prefix of every failure message reported to callers.
pub const FAILURE_PREFIX: &str = "Encountered failure during ad selection";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("No buyers or contextual ads available")]
    NoBuyersOrContextualAds,
    #[error("No Custom Audience or contextual ads available")]
    NoCustomAudienceOrContextualAds,
    #[error("No valid bids or contextual ads available for scoring")]
    NoValidBidsOrContextualAds,
    #[error("No winning Ads found")]
    NoWinningAd,
    #[error(transparent)]
    Scoring(anyhow::Error),
    #[error("failed to load buyer groups: {0}")]
    Audiences(anyhow::Error),
    #[error("failed to persist the auction result: {0}")]
    Persistence(anyhow::Error),
    #[error("no unused auction id after {0} attempts")]
    IdsExhausted(usize),
    #[error("Auction timed out")]
    TimedOut,
}

impl Error {
    pub fn category(&self) -> Category {
        match self {
            Self::Rejected(_) => Category::ValidationRejected,
            Self::NoBuyersOrContextualAds | Self::NoCustomAudienceOrContextualAds => {
                Category::NoCandidates
            }
            Self::NoValidBidsOrContextualAds => Category::NoViableBid,
            Self::NoWinningAd => Category::NoWinningAd,
            Self::Scoring(_) => Category::EngineError,
            Self::Audiences(_) | Self::Persistence(_) | Self::IdsExhausted(_) => {
                Category::Internal
            }
            Self::TimedOut => Category::Timeout,
        }
    }
}

/// An auction failure as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Failure {
    pub category: Category,
    pub message: String,
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self {
            category: err.category(),
            message: format!("{FAILURE_PREFIX}: {err}"),
        }
    }
}

/// What the caller learns about a won auction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionOutcome {
    pub id: AuctionId,
    pub render_uri: Url,
}

/// Why a contextual bundle was left out of the auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ContextualDrop {
    Empty,
    KeyUnavailable,
    InvalidSignature,
    Filtered,
}

/// The systems the auction talks to.
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub overrides: Arc<dyn DevOverrides>,
    pub engine: Arc<dyn BiddingEngine>,
    pub scorer: Arc<dyn Scorer>,
    pub audiences: Arc<dyn AudienceStore>,
    pub validator: Arc<dyn CallerValidator>,
    pub keys: Arc<dyn BuyerKeyFetcher>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub histogram: Arc<dyn AdCounterHistogram>,
    pub installed_apps: Arc<dyn InstalledApps>,
    pub persistence: Arc<dyn Persistence>,
    pub ids: Arc<dyn IdGenerator>,
    pub stats: Arc<dyn StatsSink>,
    pub sinks: Sinks,
}

struct Selected {
    result: AuctionResult,
    scored: Vec<ScoredOutcome>,
    winner: usize,
}

pub struct AuctionOrchestrator {
    audiences: Arc<dyn AudienceStore>,
    validator: Arc<dyn CallerValidator>,
    filterer: Arc<dyn AdFilterer>,
    runner: BuyerBiddingRunner,
    keys: Arc<dyn BuyerKeyFetcher>,
    verifier: Arc<dyn SignatureVerifier>,
    scorer: Arc<dyn Scorer>,
    persistence: Arc<dyn Persistence>,
    ids: Arc<dyn IdGenerator>,
    post_effects: PostEffects,
    config: infra::config::Auction,
}

impl AuctionOrchestrator {
    /// Wires the pipeline. Optional behaviour that is disabled in the
    /// configuration is replaced by no-op implementations here.
    pub fn new(config: &infra::Config, collaborators: Collaborators, executors: Executors) -> Self {
        let Collaborators {
            transport,
            overrides,
            engine,
            scorer,
            audiences,
            validator,
            keys,
            verifier,
            histogram,
            installed_apps,
            persistence,
            ids,
            stats,
            sinks,
        } = collaborators;

        let mut filterers: Vec<Arc<dyn AdFilterer>> = Vec::new();
        if config.filtering.frequency_cap_enabled {
            filterers.push(Arc::new(FrequencyCapFilterer::new(histogram)));
        }
        if config.filtering.app_install_enabled {
            filterers.push(Arc::new(AppInstallFilterer::new(installed_apps)));
        }
        let filterer: Arc<dyn AdFilterer> = if filterers.is_empty() {
            Arc::new(NoOpFilterer)
        } else {
            Arc::new(FilterChain(filterers))
        };
        let copier: Arc<dyn AdCounterKeyCopier> = if config.filtering.frequency_cap_enabled {
            Arc::new(CounterKeyCopier)
        } else {
            Arc::new(NoOpCopier)
        };
        let validator: Arc<dyn CallerValidator> = if config.auction.enforce_foreground {
            Arc::new(ForegroundValidator(validator))
        } else {
            validator
        };
        let sinks = Sinks {
            debug_reports: if config.reporting.debug_reporting_enabled {
                sinks.debug_reports
            } else {
                Arc::new(NoOpSink)
            },
            counters: if config.filtering.frequency_cap_enabled {
                sinks.counters
            } else {
                Arc::new(NoOpSink)
            },
            join: if config.reporting.join_signaling_enabled {
                sinks.join
            } else {
                Arc::new(NoOpSink)
            },
        };

        let generator = BidGenerator::new(
            ScriptFetcher::new(
                transport.clone(),
                overrides.clone(),
                config.bidding.script_version,
            ),
            TrustedSignalsFetcher::new(transport, overrides),
            engine,
            copier,
            stats,
            config.bidding.clone(),
            config.reporting.debug_reporting_enabled,
        );
        Self {
            audiences,
            validator,
            filterer,
            runner: BuyerBiddingRunner::new(
                Arc::new(generator),
                executors.clone(),
                config.bidding.timeout_per_buyer,
            ),
            keys,
            verifier,
            scorer,
            persistence,
            ids,
            post_effects: PostEffects::new(sinks, executors.lightweight),
            config: config.auction.clone(),
        }
    }

    /// Runs an auction. Side effects of the win are started in the
    /// background and do not delay the response.
    pub async fn run(&self, request: AuctionRequest) -> Result<AuctionOutcome, Failure> {
        let span = tracing::info_span!(
            "auction",
            seller = %request.config.seller,
            caller = %request.caller.package,
        );
        async {
            let start = Instant::now();
            let selected = tokio::time::timeout(self.config.overall_timeout, self.select(&request))
                .await
                .unwrap_or_else(|_| Err(Error::TimedOut));
            let Selected {
                result,
                scored,
                winner,
            } = match selected {
                Ok(selected) => selected,
                Err(err) => {
                    observe::auction_failed(&err, start.elapsed());
                    return Err(Failure::from(err));
                }
            };
            observe::auction_won(&result, start.elapsed());

            self.post_effects.spawn(&result, &scored, winner);
            Ok(AuctionOutcome {
                id: result.id,
                render_uri: result.render_uri,
            })
        }
        .instrument(span)
        .await
    }

    async fn select(&self, request: &AuctionRequest) -> Result<Selected, Error> {
        self.validator.validate(&request.caller).await?;

        let config = &request.config;
        let contextual = if self.config.contextual_ads_enabled {
            config.contextual_ads.clone()
        } else {
            Vec::new()
        };
        if config.buyers.is_empty() && contextual.is_empty() {
            return Err(Error::NoBuyersOrContextualAds);
        }

        let groups = self.groups(&config.buyers).await?;
        if groups.is_empty() && contextual.is_empty() {
            return Err(Error::NoCustomAudienceOrContextualAds);
        }
        let groups = self.filterer.filter_groups(groups);

        let bids = self.bid(config, groups).await;
        let contextual = self.verify_contextual(contextual).await;
        let candidates: Vec<_> = bids
            .into_iter()
            .map(Candidate::OnDevice)
            .chain(
                contextual
                    .into_iter()
                    .flat_map(ContextualAdBundle::into_candidates),
            )
            .collect();
        if candidates.is_empty() {
            return Err(Error::NoValidBidsOrContextualAds);
        }

        let scored = self
            .scorer
            .score(candidates, config)
            .await
            .map_err(Error::Scoring)?;
        let winner = select_winner(&scored).ok_or(Error::NoWinningAd)?;
        let result = self.persist(&request.caller, &scored[winner]).await?;
        Ok(Selected {
            result,
            scored,
            winner,
        })
    }

    /// Active groups of the requested buyers.
    async fn groups(&self, buyers: &[AdTechIdentifier]) -> Result<Vec<BuyerGroup>, Error> {
        if buyers.is_empty() {
            return Ok(Vec::new());
        }
        let now = time::now();
        Ok(self
            .audiences
            .groups(buyers)
            .await
            .map_err(Error::Audiences)?
            .into_iter()
            .filter(|group| group.is_active(now))
            .collect())
    }

    /// Bids of all groups, ordered by buyer as requested. Failed groups are
    /// left out.
    async fn bid(&self, config: &AuctionConfig, groups: Vec<BuyerGroup>) -> Vec<BidOutcome> {
        let mut by_buyer = groups
            .into_iter()
            .into_group_map_by(|group| group.buyer.clone());
        let runs: Vec<_> = config
            .buyers
            .iter()
            .unique()
            .filter_map(|buyer| Some((buyer, by_buyer.remove(buyer)?)))
            .map(|(buyer, groups)| {
                let context = BuyerContext {
                    auction_signals: config.auction_signals.clone(),
                    per_buyer_signals: config.buyer_signals(buyer),
                    ..Default::default()
                };
                self.runner.run(buyer, groups, context)
            })
            .collect();

        join_all(runs)
            .await
            .into_iter()
            .flatten()
            .filter_map(Result::ok)
            .flatten()
            .collect()
    }

    async fn verify_contextual(
        &self,
        bundles: Vec<ContextualAdBundle>,
    ) -> Vec<ContextualAdBundle> {
        join_all(bundles.into_iter().map(|bundle| async move {
            if bundle.ads.is_empty() {
                observe::contextual_dropped(&bundle.buyer, ContextualDrop::Empty);
                return None;
            }
            let keys = match self.keys.keys(&bundle.buyer).await {
                Ok(keys) => keys,
                Err(err) => {
                    observe::contextual_key_unavailable(&bundle.buyer, &err);
                    return None;
                }
            };
            if !self.verifier.verify(&bundle, &keys) {
                observe::contextual_dropped(&bundle.buyer, ContextualDrop::InvalidSignature);
                return None;
            }
            let buyer = bundle.buyer.clone();
            let filtered = self.filterer.filter_contextual(bundle);
            if filtered.is_none() {
                observe::contextual_dropped(&buyer, ContextualDrop::Filtered);
            }
            filtered
        }))
        .await
        .into_iter()
        .flatten()
        .collect()
    }

    /// Stores the winner under an id not used by any other auction. Ids are
    /// redrawn on collision, including an insert that lost the race against
    /// a concurrent auction drawing the same id.
    async fn persist(
        &self,
        caller: &Caller,
        winner: &ScoredOutcome,
    ) -> Result<AuctionResult, Error> {
        for _ in 0..self.config.id_generation_attempts {
            let id = self.ids.next_id();
            if self.exists(id).await? {
                observe::auction_id_collision(id);
                continue;
            }
            let result = AuctionResult::new(id, time::now(), caller, winner);
            let Err(err) = self.persistence.insert(&result).await else {
                return Ok(result);
            };
            if !self.exists(id).await? {
                return Err(Error::Persistence(err));
            }
            observe::auction_id_collision(id);
        }
        Err(Error::IdsExhausted(self.config.id_generation_attempts))
    }

    async fn exists(&self, id: AuctionId) -> Result<bool, Error> {
        self.persistence.exists(id).await.map_err(Error::Persistence)
    }
}

/// Index of the highest strictly positive score. Earlier candidates win ties.
fn select_winner(scored: &[ScoredOutcome]) -> Option<usize> {
    scored
        .iter()
        .enumerate()
        .filter(|(_, outcome)| outcome.score > 0.)
        .fold(None, |best: Option<(usize, f64)>, (i, outcome)| match best {
            Some((_, score)) if score >= outcome.score => best,
            _ => Some((i, outcome.score)),
        })
        .map(|(i, _)| i)
}
