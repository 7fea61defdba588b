use crate::{
    contract::{content_hash, CheckedContract},
    logger::{LogContext, RequestLogger},
};
use anyhow::Context;
use async_trait::async_trait;
use mismatch::Mismatch;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum SourceFetchError {
    #[error("source {path} could not be fetched: {error:#}")]
    Fetch { path: String, error: anyhow::Error },
    #[error("fetched source {path} has invalid hash: {mismatch}")]
    HashMismatch {
        path: String,
        mismatch: Mismatch<String>,
    },
    #[error("source {path} has no supported urls")]
    NoUrls { path: String },
}

/// Completes the set of contract sources declared in metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    fn is_complete(&self, contract: &CheckedContract) -> bool {
        contract.is_complete()
    }

    /// Fills in the sources referenced by metadata which were not uploaded.
    async fn fetch_missing(
        &self,
        contract: &mut CheckedContract,
        logger: &RequestLogger,
    ) -> Result<(), SourceFetchError>;
}

/// Fetches sources from IPFS and Swarm http gateways
/// using the urls listed in metadata.
#[derive(Clone, Debug)]
pub struct GatewaySourceFetcher {
    client: reqwest::Client,
    ipfs_gateway: Url,
    swarm_gateway: Url,
}

impl GatewaySourceFetcher {
    pub fn new(
        ipfs_gateway: Url,
        swarm_gateway: Url,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            ipfs_gateway,
            swarm_gateway,
        })
    }

    /// Translates a metadata source url into a gateway url.
    fn gateway_url(&self, url: &str) -> Option<String> {
        let join = |gateway: &Url, path: String| {
            format!("{}/{path}", gateway.as_str().trim_end_matches('/'))
        };
        if let Some(cid) = url.strip_prefix("dweb:/ipfs/") {
            return Some(join(&self.ipfs_gateway, format!("ipfs/{cid}")));
        }
        if let Some(hash) = url.strip_prefix("bzz-raw://") {
            return Some(join(&self.swarm_gateway, format!("bzz-raw:/{hash}")));
        }
        None
    }

    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("request to {url} failed"))?
            .text()
            .await
            .context("response is not a valid text")
    }
}

#[async_trait]
impl SourceFetcher for GatewaySourceFetcher {
    async fn fetch_missing(
        &self,
        contract: &mut CheckedContract,
        logger: &RequestLogger,
    ) -> Result<(), SourceFetchError> {
        let missing: Vec<_> = contract
            .missing
            .iter()
            .map(|(path, source)| (path.clone(), source.clone()))
            .collect();

        for (path, source) in missing {
            let urls: Vec<_> = source
                .urls
                .iter()
                .filter_map(|url| self.gateway_url(url))
                .collect();
            if urls.is_empty() {
                return Err(SourceFetchError::NoUrls { path });
            }

            let expected = source.keccak256.to_lowercase();
            let mut last_error = None;
            for url in urls {
                let result = match self.fetch(&url).await {
                    Ok(content) if content_hash(&content) == expected => Ok(content),
                    Ok(content) => Err(SourceFetchError::HashMismatch {
                        path: path.clone(),
                        mismatch: Mismatch::new(expected.clone(), content_hash(&content)),
                    }),
                    Err(error) => Err(SourceFetchError::Fetch {
                        path: path.clone(),
                        error,
                    }),
                };
                match result {
                    Ok(content) => {
                        logger.debug(
                            "fetch_missing",
                            LogContext::new(),
                            format!("source {path} fetched from {url}"),
                        );
                        contract.add_source(&path, content);
                        last_error = None;
                        break;
                    }
                    Err(err) => {
                        logger.warn(
                            "fetch_missing",
                            LogContext::new().error(&err),
                            "source fetch failed",
                        );
                        last_error = Some(err);
                    }
                }
            }
            if let Some(err) = last_error {
                return Err(err);
            }
        }

        Ok(())
    }
}
