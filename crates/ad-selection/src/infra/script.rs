//! Fetching of buyer bidding logic with protocol version negotiation.

use {
    crate::{
        domain::{
            audience::BuyerGroup,
            version::{LEGACY_VERSION, ScriptVersion, TooHighVersion},
        },
        infra::{
            observe,
            overrides::DevOverrides,
            transport::{self, Request, Transport},
        },
    },
    reqwest::header::{HeaderMap, HeaderValue},
    std::{sync::Arc, time::Instant},
    thiserror::Error,
    url::Url,
};

/// Carries the highest version the device supports on requests and the
/// version actually served on responses.
pub const VERSION_HEADER: &str = "x-fledge-buyer-bidding-logic-version";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub body: String,
    pub version: ScriptVersion,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing bidding logic")]
    MissingBiddingLogic(#[source] Option<transport::Error>),
    #[error(transparent)]
    TooHighVersion(#[from] TooHighVersion),
    #[error("invalid bidding logic version header {0:?}")]
    InvalidVersionHeader(HeaderValue),
}

#[derive(Clone)]
pub struct ScriptFetcher {
    transport: Arc<dyn Transport>,
    overrides: Arc<dyn DevOverrides>,
    max_version: u64,
}

impl ScriptFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        overrides: Arc<dyn DevOverrides>,
        max_version: u64,
    ) -> Self {
        Self {
            transport,
            overrides,
            max_version,
        }
    }

    /// Fetches the bidding logic of the group, preferring a developer
    /// override when one is registered.
    pub async fn fetch(&self, group: &BuyerGroup) -> Result<Script, Error> {
        if let Some(script) = self.overrides.bidding_script(group).await {
            observe::script_overridden(group);
            return Ok(Script {
                body: script.script,
                version: ScriptVersion::from_number(script.version.unwrap_or(LEGACY_VERSION)),
            });
        }

        let start = Instant::now();
        let result = self.download(&group.bidding_logic_uri).await;
        observe::script_fetched(&group.bidding_logic_uri, &result, start.elapsed());
        result
    }

    async fn download(&self, uri: &Url) -> Result<Script, Error> {
        let mut headers = HeaderMap::new();
        if self.max_version > LEGACY_VERSION {
            headers.insert(VERSION_HEADER, HeaderValue::from(self.max_version));
        }
        let response = self
            .transport
            .fetch(Request {
                uri: uri.clone(),
                headers,
            })
            .await
            .map_err(|err| Error::MissingBiddingLogic(Some(err)))?;
        if response.body.trim().is_empty() {
            return Err(Error::MissingBiddingLogic(None));
        }

        let served = response
            .headers
            .get(VERSION_HEADER)
            .map(|value| {
                value
                    .to_str()
                    .ok()
                    .and_then(|value| value.trim().parse().ok())
                    .ok_or_else(|| Error::InvalidVersionHeader(value.clone()))
            })
            .transpose()?;
        let version = ScriptVersion::negotiate(self.max_version, served)?;
        Ok(Script {
            body: response.body,
            version,
        })
    }
}
