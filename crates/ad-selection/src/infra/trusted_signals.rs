//! Fetching of buyer hosted key/value signals used during bidding.

use {
    crate::{
        domain::{
            audience::BuyerGroup,
            signals::{DataVersion, Signals},
        },
        infra::{
            observe,
            overrides::DevOverrides,
            transport::{Request, Transport},
        },
    },
    anyhow::Context,
    futures::future::join_all,
    itertools::Itertools,
    reqwest::header::HeaderMap,
    std::{collections::HashMap, sync::Arc, time::Instant},
    thiserror::Error,
    url::Url,
};

/// Response header tagging the version of the served signals. Only the first
/// value counts.
pub const DATA_VERSION_HEADER: &str = "data-version";

/// Query parameter listing the requested keys.
const KEYS_PARAMETER: &str = "keys";

/// A complete response of a trusted signals server.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustedSignals {
    pub signals: Signals,
    pub data_version: Option<DataVersion>,
    pub size_bytes: usize,
}

/// The part of a response a single group is entitled to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupSignals {
    pub signals: Signals,
    pub data_version: Option<DataVersion>,
    pub num_keys: usize,
    pub size_bytes: usize,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing trusted bidding signals from {uri}")]
    MissingTrustedBiddingSignals { uri: Url },
}

#[derive(Clone)]
pub struct TrustedSignalsFetcher {
    transport: Arc<dyn Transport>,
    overrides: Arc<dyn DevOverrides>,
}

impl TrustedSignalsFetcher {
    pub fn new(transport: Arc<dyn Transport>, overrides: Arc<dyn DevOverrides>) -> Self {
        Self {
            transport,
            overrides,
        }
    }

    /// Fetches the signals of all groups, issuing one request per distinct
    /// URI with the union of the keys of the groups sharing it. Groups with
    /// overridden signals are not requested. URIs whose fetch failed are
    /// missing from the result.
    pub async fn fetch<'a>(
        &self,
        groups: impl IntoIterator<Item = &'a BuyerGroup>,
    ) -> HashMap<Url, TrustedSignals> {
        let groups: Vec<_> = groups.into_iter().collect();
        let overridden =
            join_all(groups.iter().map(|group| self.overrides.trusted_signals(group))).await;
        let requests = groups
            .into_iter()
            .zip(overridden)
            .filter(|(_, overridden)| overridden.is_none())
            .filter_map(|(group, _)| group.trusted_bidding_data.as_ref())
            .map(|data| (&data.uri, &data.keys))
            .into_group_map();

        join_all(requests.into_iter().map(|(uri, keys)| async move {
            let keys = keys.into_iter().flatten().sorted().dedup().join(",");
            let start = Instant::now();
            let result = self.download(uri, &keys).await;
            observe::signals_fetched(uri, &result, start.elapsed());
            (uri, result)
        }))
        .await
        .into_iter()
        .filter_map(|(uri, result)| Some((uri.clone(), result.ok()?)))
        .collect()
    }

    /// Fetches the signals of a single group on its own.
    pub async fn fetch_for_group(&self, group: &BuyerGroup) -> Result<GroupSignals, Error> {
        let fetched = self.fetch([group]).await;
        self.for_group(group, &fetched).await
    }

    /// The signals of a single group out of a batch `fetch`, restricted to
    /// its own keys. Groups without a trusted signals server bid with empty
    /// signals.
    pub async fn for_group(
        &self,
        group: &BuyerGroup,
        fetched: &HashMap<Url, TrustedSignals>,
    ) -> Result<GroupSignals, Error> {
        if let Some(signals) = self.overrides.trusted_signals(group).await {
            observe::signals_overridden(group);
            return Ok(GroupSignals {
                num_keys: group
                    .trusted_bidding_data
                    .as_ref()
                    .map_or(0, |data| data.keys.len()),
                size_bytes: signals.to_string().len(),
                data_version: None,
                signals,
            });
        }
        let Some(data) = &group.trusted_bidding_data else {
            return Ok(GroupSignals::default());
        };

        let signals =
            fetched
                .get(&data.uri)
                .ok_or_else(|| Error::MissingTrustedBiddingSignals {
                    uri: data.uri.clone(),
                })?;
        Ok(GroupSignals {
            signals: signals.signals.subset(data.keys.iter().map(String::as_str)),
            data_version: signals.data_version,
            num_keys: data.keys.len(),
            size_bytes: signals.size_bytes,
        })
    }

    async fn download(&self, uri: &Url, keys: &str) -> anyhow::Result<TrustedSignals> {
        let mut uri = uri.clone();
        if !keys.is_empty() {
            uri.query_pairs_mut().append_pair(KEYS_PARAMETER, keys);
        }
        let response = self.transport.fetch(Request::get(uri)).await?;
        let signals = Signals::parse(&response.body).context("malformed trusted signals")?;
        Ok(TrustedSignals {
            signals,
            data_version: data_version(&response.headers),
            size_bytes: response.body.len(),
        })
    }
}

fn data_version(headers: &HeaderMap) -> Option<DataVersion> {
    let value = headers.get(DATA_VERSION_HEADER)?.to_str().ok()?;
    value.trim().parse().ok().map(DataVersion)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            domain::audience::TrustedBiddingData,
            infra::{
                overrides::{InMemoryOverrides, NoOverrides},
                transport::{MockTransport, Response},
            },
        },
        chrono::{DateTime, Utc},
        reqwest::header::HeaderValue,
        serde_json::json,
    };

    fn group(name: &str, uri: &str, keys: &[&str]) -> BuyerGroup {
        BuyerGroup {
            owner: "com.example".into(),
            buyer: "buyer.example".into(),
            name: name.into(),
            activation_time: DateTime::<Utc>::MIN_UTC,
            expiration_time: DateTime::<Utc>::MAX_UTC,
            bidding_logic_uri: "https://buyer.example/bidding".parse().unwrap(),
            trusted_bidding_data: Some(TrustedBiddingData {
                uri: uri.parse().unwrap(),
                keys: keys.iter().map(|key| key.to_string()).collect(),
            }),
            user_bidding_signals: None,
            ads: vec![],
        }
    }

    fn response(body: &str, versions: &[&'static str]) -> Response {
        let mut headers = HeaderMap::new();
        for version in versions {
            headers.append(DATA_VERSION_HEADER, HeaderValue::from_static(version));
        }
        Response {
            body: body.into(),
            headers,
        }
    }

    #[tokio::test]
    async fn batches_requests_per_uri() {
        let mut transport = MockTransport::new();
        transport
            .expect_fetch()
            .withf(|request| {
                request.uri.as_str() == "https://kv.example/signals?keys=a%2Cb%2Cc"
            })
            .times(1)
            .returning(|_| Ok(response(r#"{"a": 1, "b": 2, "c": 3}"#, &["5", "6"])));
        transport
            .expect_fetch()
            .withf(|request| request.uri.as_str() == "https://other.example/?keys=x")
            .times(1)
            .returning(|_| Ok(response("not json", &[])));
        let fetcher = TrustedSignalsFetcher::new(Arc::new(transport), Arc::new(NoOverrides));

        let fetched = fetcher
            .fetch(&[
                group("one", "https://kv.example/signals", &["b", "a"]),
                group("two", "https://kv.example/signals", &["c", "a"]),
                group("three", "https://other.example", &["x"]),
            ])
            .await;

        let uri: Url = "https://kv.example/signals".parse().unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[&uri].data_version, Some(DataVersion(5)));
        assert_eq!(fetched[&uri].signals.get("c"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn group_gets_only_its_keys() {
        let mut transport = MockTransport::new();
        transport.expect_fetch().times(1).returning(|_| {
            Ok(response(
                r#"{"a": 1, "b": 2, "c": 3}"#,
                &["not-a-number"],
            ))
        });
        let fetcher = TrustedSignalsFetcher::new(Arc::new(transport), Arc::new(NoOverrides));

        let signals = fetcher
            .fetch_for_group(&group("one", "https://kv.example/signals", &["a", "c"]))
            .await
            .unwrap();

        assert_eq!(signals.signals.to_string(), r#"{"a":1,"c":3}"#);
        assert_eq!(signals.data_version, None);
        assert_eq!(signals.num_keys, 2);
        assert_eq!(signals.size_bytes, 24);
    }

    #[tokio::test]
    async fn failed_fetch_is_missing_signals() {
        let mut transport = MockTransport::new();
        transport
            .expect_fetch()
            .returning(|_| Err(anyhow::anyhow!("timeout").into()));
        let fetcher = TrustedSignalsFetcher::new(Arc::new(transport), Arc::new(NoOverrides));

        let err = fetcher
            .fetch_for_group(&group("one", "https://kv.example/signals", &["a"]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MissingTrustedBiddingSignals { .. }));
    }

    #[tokio::test]
    async fn groups_without_server_and_overrides_skip_the_network() {
        let mut transport = MockTransport::new();
        transport.expect_fetch().never();
        let overrides = InMemoryOverrides::default();
        let overridden = group("one", "https://kv.example/signals", &["a"]);
        overrides.set_signals(
            overridden.key(),
            Signals::from(
                json!({"a": "override"})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            ),
        );
        let fetcher = TrustedSignalsFetcher::new(Arc::new(transport), Arc::new(overrides));

        let signals = fetcher.fetch_for_group(&overridden).await.unwrap();
        assert_eq!(signals.signals.get("a"), Some(&json!("override")));

        let mut without = group("two", "https://kv.example/signals", &[]);
        without.trusted_bidding_data = None;
        assert_eq!(
            fetcher.fetch_for_group(&without).await.unwrap(),
            GroupSignals::default()
        );
    }

    #[tokio::test]
    async fn groups_take_their_keys_from_a_shared_batch() {
        let mut transport = MockTransport::new();
        transport
            .expect_fetch()
            .withf(|request| request.uri.as_str() == "https://kv.example/signals?keys=a%2Cb")
            .times(1)
            .returning(|_| Ok(response(r#"{"a": 1, "b": 2, "c": 3}"#, &["4"])));
        let overrides = InMemoryOverrides::default();
        let overridden = group("three", "https://kv.example/signals", &["c"]);
        overrides.set_signals(overridden.key(), Signals::empty());
        let fetcher = TrustedSignalsFetcher::new(Arc::new(transport), Arc::new(overrides));
        let one = group("one", "https://kv.example/signals", &["a"]);
        let two = group("two", "https://kv.example/signals", &["b"]);

        let fetched = fetcher.fetch([&one, &two, &overridden]).await;

        let signals = fetcher.for_group(&two, &fetched).await.unwrap();
        assert_eq!(signals.signals.to_string(), r#"{"b":2}"#);
        assert_eq!(signals.data_version, Some(DataVersion(4)));
        let err = fetcher
            .for_group(&group("four", "https://elsewhere.example", &["a"]), &fetched)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingTrustedBiddingSignals { .. }));
    }
}
