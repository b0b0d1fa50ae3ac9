//! Retrieval of bundle resources from remote and local bases.

use crate::types::location::LocationSpec;
use crate::types::settings::BootstrapSettings;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Reading {resource} timed out after {timeout:?}")]
    Timeout { resource: String, timeout: Duration },
}

/// Source of bundle resources. One call per resource, no retries.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, location: &LocationSpec, resource: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches over HTTPS or from the local filesystem, each request bounded by
/// the configured timeout.
pub struct DistributionFetcher {
    client: Client,
    timeout: Duration,
}

impl DistributionFetcher {
    pub fn new(settings: &BootstrapSettings) -> Result<Self, FetchError> {
        let timeout = settings.fetch_timeout();
        let mut builder = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("pilot-bootstrap/", env!("CARGO_PKG_VERSION")));

        if !settings.validate_certs {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        Ok(Self {
            client: builder.build()?,
            timeout,
        })
    }

    async fn fetch_remote(&self, address: String) -> Result<Vec<u8>, FetchError> {
        let url = url::Url::parse(&address).map_err(|source| FetchError::InvalidUrl {
            url: address.clone(),
            source,
        })?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn fetch_local(&self, base: &Path, resource: &str) -> Result<Vec<u8>, FetchError> {
        let path = base.join(resource);
        match tokio::time::timeout(self.timeout, tokio::fs::read(&path)).await {
            Ok(content) => Ok(content?),
            Err(_) => Err(FetchError::Timeout {
                resource: path.display().to_string(),
                timeout: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl Fetcher for DistributionFetcher {
    async fn fetch(&self, location: &LocationSpec, resource: &str) -> Result<Vec<u8>, FetchError> {
        tracing::debug!("Fetching {} from {}", resource, location);
        match location {
            LocationSpec::Remote(_) => self.fetch_remote(location.resource(resource)).await,
            LocationSpec::Local(base) => self.fetch_local(base, resource).await,
        }
    }
}
