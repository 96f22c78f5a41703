//! Bidding of a single buyer group: fetch the buyer's script and trusted
//! signals, run the script and keep the best bid.

use {
    crate::{
        domain::{
            Category,
            audience::{Ad, BuyerGroup},
            bid::{self, BidOutcome, BiddingInfo},
            filtering::AdCounterKeyCopier,
            signals::Signals,
            version::ScriptVersion,
        },
        infra::{
            config,
            engine::{BiddingEngine, BiddingInputs},
            observe,
            script::{self, ScriptFetcher},
            trusted_signals::{self, TrustedSignals, TrustedSignalsFetcher},
        },
    },
    std::{
        collections::HashMap,
        sync::Arc,
        time::{Duration, Instant},
    },
    thiserror::Error,
    url::Url,
};

mod runner;
mod stats;

pub use {
    runner::BuyerBiddingRunner,
    stats::{Outcome, Stats, StatsSink},
};

/// Auction inputs shared by all groups of one buyer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuyerContext {
    pub auction_signals: Signals,
    pub per_buyer_signals: Signals,
    /// Signals fetched once for all groups of the buyer. Groups fetch their
    /// own when unset.
    pub trusted_signals: Option<Arc<HashMap<Url, TrustedSignals>>>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Script(#[from] script::Error),
    #[error(transparent)]
    Signals(#[from] trusted_signals::Error),
    #[error("bidding timed out")]
    TimedOut,
    #[error("bidding task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Engine(anyhow::Error),
}

impl Error {
    pub fn category(&self) -> Category {
        match self {
            Self::Script(script::Error::MissingBiddingLogic(_)) | Self::Signals(_) => {
                Category::FetchFailure
            }
            Self::Script(
                script::Error::TooHighVersion(_) | script::Error::InvalidVersionHeader(_),
            ) => Category::ProtocolViolation,
            Self::TimedOut => Category::Timeout,
            Self::Task(_) => Category::Internal,
            Self::Engine(_) => Category::EngineError,
        }
    }
}

/// Produces at most one bid per buyer group.
pub struct BidGenerator {
    scripts: ScriptFetcher,
    signals: TrustedSignalsFetcher,
    engine: Arc<dyn BiddingEngine>,
    copier: Arc<dyn AdCounterKeyCopier>,
    stats: Arc<dyn StatsSink>,
    config: config::Bidding,
    debug_reporting: bool,
}

impl BidGenerator {
    pub fn new(
        scripts: ScriptFetcher,
        signals: TrustedSignalsFetcher,
        engine: Arc<dyn BiddingEngine>,
        copier: Arc<dyn AdCounterKeyCopier>,
        stats: Arc<dyn StatsSink>,
        config: config::Bidding,
        debug_reporting: bool,
    ) -> Self {
        Self {
            scripts,
            signals,
            engine,
            copier,
            stats,
            config,
            debug_reporting,
        }
    }

    /// Runs the whole pipeline of the group under the per-group deadline.
    /// Returns `None` if the group has no ads or no acceptable bid.
    pub async fn generate(
        &self,
        group: &BuyerGroup,
        context: &BuyerContext,
    ) -> Result<Option<BidOutcome>, Error> {
        let mut stats = Stats::new(group.buyer.clone(), group.ads.len());
        if group.ads.is_empty() {
            self.stats.record(&stats);
            return Ok(None);
        }

        let start = Instant::now();
        let result = tokio::time::timeout(
            self.config.timeout_per_group,
            self.bid(group, context, &mut stats),
        )
        .await
        .unwrap_or_else(|_| Err(Error::TimedOut));

        stats.latency = Some(start.elapsed());
        stats.outcome = Some(match &result {
            Ok(Some(_)) => Outcome::Bid,
            Ok(None) => Outcome::NoBid,
            Err(err) => Outcome::Failed(err.category()),
        });
        self.stats.record(&stats);
        observe::group_bid(group, &result);
        result
    }

    /// Fetches the trusted signals of all groups that will bid, one request
    /// per signals server.
    pub async fn fetch_signals(&self, groups: &[BuyerGroup]) -> HashMap<Url, TrustedSignals> {
        self.signals
            .fetch(groups.iter().filter(|group| !group.ads.is_empty()))
            .await
    }

    /// Records a group whose bidding was cut off before it finished.
    fn cancelled(&self, mut stats: Stats, latency: Duration) {
        stats.latency = Some(latency);
        stats.outcome = Some(Outcome::Failed(Category::Timeout));
        self.stats.record(&stats);
    }

    async fn bid(
        &self,
        group: &BuyerGroup,
        context: &BuyerContext,
        stats: &mut Stats,
    ) -> Result<Option<BidOutcome>, Error> {
        let ((script, script_latency), (signals, signals_latency)) = futures::future::try_join(
            async {
                let start = Instant::now();
                let script = self.scripts.fetch(group).await?;
                Ok::<_, Error>((script, start.elapsed()))
            },
            async {
                let start = Instant::now();
                let signals = match &context.trusted_signals {
                    Some(fetched) => self.signals.for_group(group, fetched).await?,
                    None => self.signals.fetch_for_group(group).await?,
                };
                Ok::<_, Error>((signals, start.elapsed()))
            },
        )
        .await?;
        stats.script_fetch_latency = Some(script_latency);
        stats.script_size = Some(script.body.len());
        stats.signals_fetch_latency = Some(signals_latency);
        stats.num_signal_keys = Some(signals.num_keys);
        stats.signals_size = Some(signals.size_bytes);

        let contextual_signals = match signals
            .data_version
            .filter(|_| self.config.data_version_header_enabled)
        {
            Some(version) => {
                stats.data_version_in_signals = true;
                Signals::with_data_version(version)
            }
            None => Signals::empty(),
        };
        let ads: Vec<Ad> = group
            .ads
            .iter()
            .map(|ad| self.copier.copy(ad, ad.stripped()))
            .collect();
        let inputs = BiddingInputs {
            auction_signals: context.auction_signals.clone(),
            per_buyer_signals: context.per_buyer_signals.clone(),
            trusted_bidding_signals: signals.signals,
            contextual_signals,
            custom_audience: group.signals(),
        };

        let start = Instant::now();
        let bids = match script.version {
            ScriptVersion::Legacy => {
                self.engine
                    .generate_bids(&script.body, &ads, &inputs)
                    .await
            }
            ScriptVersion::Versioned(_) => {
                let group = BuyerGroup {
                    ads,
                    ..group.clone()
                };
                self.engine
                    .generate_bids_v3(&script.body, &group, &inputs)
                    .await
            }
        }
        .map_err(Error::Engine)?;
        stats.generate_bids_latency = Some(start.elapsed());

        let Some(winner) = bid::select_highest(bids) else {
            return Ok(None);
        };
        let ad_cost = winner
            .ad_cost
            .filter(|_| self.config.cpc_billing_enabled);
        stats.returned_ad_cost = ad_cost.is_some();
        Ok(Some(BidOutcome {
            ad_with_bid: winner.ad_with_bid,
            ad_cost,
            debug_report: if self.debug_reporting {
                winner.debug_report
            } else {
                Default::default()
            },
            info: Arc::new(BiddingInfo {
                bidding_logic_uri: group.bidding_logic_uri.clone(),
                script: script.body,
                script_version: script.version,
                custom_audience: inputs.custom_audience,
                trusted_bidding_signals: inputs.trusted_bidding_signals,
                buyer_contextual_signals: inputs.contextual_signals,
            }),
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        crate::{
            domain::{
                audience::TrustedBiddingData,
                bid::{DebugReportUris, GeneratedBid},
                filtering::{CounterKeyCopier, NoOpCopier},
            },
            infra::{
                engine::MockBiddingEngine,
                overrides::NoOverrides,
                transport::{self, MockTransport, Request, Response, Transport},
            },
        },
        chrono::{DateTime, Utc},
        reqwest::header::{HeaderMap, HeaderValue},
        serde_json::json,
        std::{collections::BTreeSet, sync::Mutex, time::Duration},
    };

    pub(crate) fn ad(name: &str) -> Ad {
        Ad::new(
            format!("https://buyer.example/ads/{name}").parse().unwrap(),
            "{}",
        )
    }

    pub(crate) fn group(buyer: &str, name: &str, ads: Vec<Ad>) -> BuyerGroup {
        BuyerGroup {
            owner: "com.example.app".into(),
            buyer: buyer.into(),
            name: name.into(),
            activation_time: DateTime::<Utc>::MIN_UTC,
            expiration_time: DateTime::<Utc>::MAX_UTC,
            bidding_logic_uri: format!("https://{buyer}/bidding").parse().unwrap(),
            trusted_bidding_data: Some(TrustedBiddingData {
                uri: format!("https://{buyer}/signals").parse().unwrap(),
                keys: vec!["k".into()],
            }),
            user_bidding_signals: None,
            ads,
        }
    }

    /// Serves bidding logic and trusted signals for any buyer, optionally
    /// after a delay.
    pub(crate) struct FakeBuyerServer {
        pub script_version: Option<&'static str>,
        pub data_version: Option<&'static str>,
        pub delay: Duration,
    }

    impl Default for FakeBuyerServer {
        fn default() -> Self {
            Self {
                script_version: None,
                data_version: None,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait::async_trait]
    impl Transport for FakeBuyerServer {
        async fn fetch(&self, request: Request) -> Result<Response, transport::Error> {
            tokio::time::sleep(self.delay).await;
            let mut headers = HeaderMap::new();
            let body = if request.uri.path() == "/bidding" {
                if let Some(version) = self.script_version {
                    headers.insert(script::VERSION_HEADER, HeaderValue::from_static(version));
                }
                "function generateBid() {}".to_owned()
            } else {
                if let Some(version) = self.data_version {
                    headers.insert(
                        trusted_signals::DATA_VERSION_HEADER,
                        HeaderValue::from_static(version),
                    );
                }
                r#"{"k": "v", "other": 1}"#.to_owned()
            };
            Ok(Response { body, headers })
        }
    }

    /// Bids the number in the ad's metadata, or the position of the ad when
    /// it has none.
    pub(crate) fn bids_from(ads: &[Ad]) -> Vec<GeneratedBid> {
        ads.iter()
            .enumerate()
            .map(|(i, ad)| {
                let bid = ad.metadata.parse().unwrap_or(i as f64);
                GeneratedBid::new(ad.clone(), bid)
            })
            .collect()
    }

    pub(crate) fn legacy_engine() -> MockBiddingEngine {
        let mut engine = MockBiddingEngine::new();
        engine
            .expect_generate_bids()
            .returning(|_, ads, _| Ok(bids_from(ads)));
        engine.expect_generate_bids_v3().never();
        engine
    }

    #[derive(Default)]
    pub(crate) struct RecordedStats(pub Mutex<Vec<Stats>>);

    impl StatsSink for RecordedStats {
        fn record(&self, stats: &Stats) {
            self.0.lock().unwrap().push(stats.clone());
        }
    }

    pub(crate) fn bidding_config() -> config::Bidding {
        crate::infra::Config::default().bidding
    }

    pub(crate) fn generator(
        transport: impl Transport + 'static,
        engine: impl BiddingEngine + 'static,
        config: config::Bidding,
        stats: Arc<RecordedStats>,
    ) -> BidGenerator {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        BidGenerator::new(
            ScriptFetcher::new(transport.clone(), Arc::new(NoOverrides), config.script_version),
            TrustedSignalsFetcher::new(transport, Arc::new(NoOverrides)),
            Arc::new(engine),
            Arc::new(NoOpCopier),
            stats,
            config,
            false,
        )
    }

    fn priced(name: &str, bid: &str) -> Ad {
        Ad {
            metadata: bid.into(),
            ..ad(name)
        }
    }

    #[tokio::test]
    async fn picks_the_highest_bid() {
        let stats = Arc::new(RecordedStats::default());
        let generator = generator(
            FakeBuyerServer::default(),
            legacy_engine(),
            bidding_config(),
            stats.clone(),
        );
        let group = group(
            "buyer.example",
            "shoes",
            vec![
                priced("a0", "0.0"),
                priced("a1", "1.0"),
                priced("a2", "5.4"),
                priced("a3", "-1.0"),
            ],
        );

        let outcome = generator
            .generate(&group, &BuyerContext::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.ad_with_bid.ad.render_uri.path(), "/ads/a2");
        assert_eq!(outcome.ad_with_bid.bid, 5.4);
        assert_eq!(outcome.info.script_version, ScriptVersion::Legacy);
        assert_eq!(
            outcome.info.trusted_bidding_signals.to_string(),
            r#"{"k":"v"}"#
        );
        let stats = stats.0.lock().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].num_ads, 4);
        assert_eq!(stats[0].outcome, Some(Outcome::Bid));
        assert_eq!(stats[0].script_size, Some(25));
        assert_eq!(stats[0].num_signal_keys, Some(1));
        assert!(stats[0].generate_bids_latency.is_some());
        assert!(!stats[0].data_version_in_signals);
    }

    #[tokio::test]
    async fn empty_group_does_not_fetch() {
        let mut transport = MockTransport::new();
        transport.expect_fetch().never();
        let mut engine = MockBiddingEngine::new();
        engine.expect_generate_bids().never();
        let stats = Arc::new(RecordedStats::default());
        let generator = generator(transport, engine, bidding_config(), stats.clone());

        let outcome = generator
            .generate(&group("buyer.example", "empty", vec![]), &BuyerContext::default())
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert_eq!(
            stats.0.lock().unwrap().as_slice(),
            [Stats::new("buyer.example".into(), 0)]
        );
    }

    #[tokio::test]
    async fn negative_bids_only_yield_nothing() {
        let mut engine = MockBiddingEngine::new();
        engine.expect_generate_bids().returning(|_, ads, _| {
            Ok(ads
                .iter()
                .map(|ad| GeneratedBid::new(ad.clone(), -2.))
                .collect())
        });
        let stats = Arc::new(RecordedStats::default());
        let generator = generator(
            FakeBuyerServer::default(),
            engine,
            bidding_config(),
            stats.clone(),
        );

        let outcome = generator
            .generate(
                &group("buyer.example", "shoes", vec![ad("a"), ad("b")]),
                &BuyerContext::default(),
            )
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert_eq!(stats.0.lock().unwrap()[0].outcome, Some(Outcome::NoBid));
    }

    #[tokio::test]
    async fn versioned_scripts_bid_on_the_whole_group() {
        let mut engine = MockBiddingEngine::new();
        engine.expect_generate_bids().never();
        engine
            .expect_generate_bids_v3()
            .withf(|_, group, _| {
                group.ads.iter().all(|ad| ad.filters.is_none() && !ad.ad_counter_keys.is_empty())
            })
            .times(1)
            .returning(|_, group, _| Ok(bids_from(&group.ads)));
        let stats = Arc::new(RecordedStats::default());
        let config = bidding_config();
        let transport: Arc<dyn Transport> = Arc::new(FakeBuyerServer {
            script_version: Some("3"),
            ..Default::default()
        });
        let generator = BidGenerator::new(
            ScriptFetcher::new(transport.clone(), Arc::new(NoOverrides), 3),
            TrustedSignalsFetcher::new(transport, Arc::new(NoOverrides)),
            Arc::new(engine),
            Arc::new(CounterKeyCopier),
            stats,
            config,
            false,
        );
        let mut filtered = ad("a");
        filtered.ad_counter_keys = [1].into();
        filtered.filters = Some(Default::default());

        let outcome = generator
            .generate(
                &group("buyer.example", "shoes", vec![filtered]),
                &BuyerContext::default(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.info.script_version, ScriptVersion::Versioned(3));
        assert_eq!(outcome.ad_with_bid.ad.ad_counter_keys, BTreeSet::from([1]));
    }

    #[tokio::test]
    async fn too_high_version_is_a_protocol_violation() {
        let mut engine = MockBiddingEngine::new();
        engine.expect_generate_bids().never();
        engine.expect_generate_bids_v3().never();
        let stats = Arc::new(RecordedStats::default());
        let generator = generator(
            FakeBuyerServer {
                script_version: Some("4"),
                ..Default::default()
            },
            engine,
            bidding_config(),
            stats.clone(),
        );

        let err = generator
            .generate(
                &group("buyer.example", "shoes", vec![ad("a")]),
                &BuyerContext::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Script(script::Error::TooHighVersion(ref version))
                if version.requested == 3 && version.served == 4
        ));
        assert_eq!(err.category(), Category::ProtocolViolation);
        let stats = stats.0.lock().unwrap();
        assert_eq!(
            stats[0].outcome,
            Some(Outcome::Failed(Category::ProtocolViolation))
        );
        assert_eq!(stats[0].generate_bids_latency, None);
    }

    #[tokio::test]
    async fn data_version_is_passed_when_enabled() {
        for enabled in [true, false] {
            let mut engine = MockBiddingEngine::new();
            engine
                .expect_generate_bids()
                .withf(move |_, _, inputs| {
                    let expected = if enabled {
                        json!({"dataVersion": 9})
                    } else {
                        json!({})
                    };
                    serde_json::to_value(&inputs.contextual_signals).unwrap() == expected
                })
                .times(1)
                .returning(|_, ads, _| Ok(bids_from(ads)));
            let stats = Arc::new(RecordedStats::default());
            let generator = generator(
                FakeBuyerServer {
                    data_version: Some("9"),
                    ..Default::default()
                },
                engine,
                config::Bidding {
                    data_version_header_enabled: enabled,
                    ..bidding_config()
                },
                stats.clone(),
            );

            let outcome = generator
                .generate(
                    &group("buyer.example", "shoes", vec![ad("a")]),
                    &BuyerContext::default(),
                )
                .await
                .unwrap()
                .unwrap();

            assert_eq!(
                outcome.info.buyer_contextual_signals.get("dataVersion").is_some(),
                enabled
            );
            assert_eq!(stats.0.lock().unwrap()[0].data_version_in_signals, enabled);
        }
    }

    #[tokio::test]
    async fn ad_cost_and_debug_reports_follow_configuration() {
        let bid_with_extras = |ads: &[Ad]| {
            vec![GeneratedBid {
                ad_cost: Some(0.25),
                debug_report: DebugReportUris {
                    win: Some("https://buyer.example/win".parse().unwrap()),
                    loss: None,
                },
                ..GeneratedBid::new(ads[0].clone(), 1.)
            }]
        };
        let mut engine = MockBiddingEngine::new();
        engine
            .expect_generate_bids()
            .returning(move |_, ads, _| Ok(bid_with_extras(ads)));
        let stats = Arc::new(RecordedStats::default());
        let generator = generator(
            FakeBuyerServer::default(),
            engine,
            bidding_config(),
            stats.clone(),
        );

        let outcome = generator
            .generate(
                &group("buyer.example", "shoes", vec![ad("a")]),
                &BuyerContext::default(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.ad_cost, None);
        assert!(outcome.debug_report.is_empty());
        assert!(!stats.0.lock().unwrap()[0].returned_ad_cost);

        let mut engine = MockBiddingEngine::new();
        engine
            .expect_generate_bids()
            .returning(move |_, ads, _| Ok(bid_with_extras(ads)));
        let transport: Arc<dyn Transport> = Arc::new(FakeBuyerServer::default());
        let generator = BidGenerator::new(
            ScriptFetcher::new(transport.clone(), Arc::new(NoOverrides), 3),
            TrustedSignalsFetcher::new(transport, Arc::new(NoOverrides)),
            Arc::new(engine),
            Arc::new(NoOpCopier),
            stats.clone(),
            config::Bidding {
                cpc_billing_enabled: true,
                ..bidding_config()
            },
            true,
        );

        let outcome = generator
            .generate(
                &group("buyer.example", "shoes", vec![ad("a")]),
                &BuyerContext::default(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.ad_cost, Some(0.25));
        assert!(outcome.debug_report.win.is_some());
        assert!(stats.0.lock().unwrap()[1].returned_ad_cost);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetches_time_out() {
        let stats = Arc::new(RecordedStats::default());
        let generator = generator(
            FakeBuyerServer {
                delay: Duration::from_secs(6),
                ..Default::default()
            },
            legacy_engine(),
            bidding_config(),
            stats.clone(),
        );

        let err = generator
            .generate(
                &group("buyer.example", "shoes", vec![ad("a")]),
                &BuyerContext::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TimedOut));
        let stats = stats.0.lock().unwrap();
        assert_eq!(stats[0].outcome, Some(Outcome::Failed(Category::Timeout)));
        assert_eq!(stats[0].script_fetch_latency, None);
    }
}
