//! The network seam used by the script and trusted signals fetchers.

use {
    crate::{infra::config, util},
    reqwest::header::HeaderMap,
    thiserror::Error,
    url::Url,
};

#[derive(Debug, Clone)]
pub struct Request {
    pub uri: Url,
    pub headers: HeaderMap,
}

impl Request {
    pub fn get(uri: Url) -> Self {
        Self {
            uri,
            headers: HeaderMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Response {
    pub body: String,
    pub headers: HeaderMap,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: Request) -> Result<Response, Error>;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] util::http::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Fetches over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl HttpTransport {
    pub fn new(config: &config::Http) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()?,
            max_response_bytes: config.max_response_bytes,
        })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: Request) -> Result<Response, Error> {
        let (body, headers) = util::http::send(
            self.max_response_bytes,
            self.client.get(request.uri).headers(request.headers),
        )
        .await?;
        Ok(Response { body, headers })
    }
}
