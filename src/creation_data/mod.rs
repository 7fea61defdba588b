//! Retrieval of the contract creation transaction input.
//!
//! Several strategies are available; a strategy is used only if the chain
//! configures the endpoint it relies on. Strategies are attempted in a fixed
//! order and the first one which succeeds wins.

mod archive;
mod indexer;
mod scrape;

use crate::{
    chains::Chain,
    logger::{LogContext, RequestLogger},
};
use bytes::Bytes;
use ethers::{types::Address, utils::to_checksum};
use std::{fmt, time::Duration};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    Scrape,
    Indexer,
    Archive,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Scrape => f.write_str("scrape"),
            Strategy::Indexer => f.write_str("indexer"),
            Strategy::Archive => f.write_str("archive"),
        }
    }
}

/// Failure of a single strategy. Recovered by trying the next one.
#[derive(Error, Debug)]
#[error("{strategy} strategy failed: {error:#}")]
pub struct StrategyFailure {
    pub strategy: Strategy,
    #[source]
    pub error: anyhow::Error,
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("creation data not found; strategies failed: {}", failures.len())]
    NotFound { failures: Vec<StrategyFailure> },
}

/// Successfully resolved creation data.
#[derive(Debug)]
pub struct Resolved {
    pub creation_data: Bytes,
    pub strategy: Strategy,
    /// Strategies which were attempted and failed before the successful one.
    pub failures: Vec<StrategyFailure>,
}

#[derive(Clone, Debug)]
pub struct CreationDataResolver {
    client: reqwest::Client,
}

impl CreationDataResolver {
    pub fn new(request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Returns the input of the transaction which created the contract at `address`.
    pub async fn resolve_creation_data(
        &self,
        chain: &Chain,
        address: Address,
        logger: &RequestLogger,
    ) -> Result<Bytes, ResolveError> {
        self.resolve(chain, address, logger)
            .await
            .map(|resolved| resolved.creation_data)
    }

    /// Same as [`Self::resolve_creation_data`], but reports
    /// which strategy succeeded and which failed before it.
    pub async fn resolve(
        &self,
        chain: &Chain,
        address: Address,
        logger: &RequestLogger,
    ) -> Result<Resolved, ResolveError> {
        let checksummed = to_checksum(&address, None);
        let mut failures = Vec::new();

        for strategy in [Strategy::Scrape, Strategy::Indexer, Strategy::Archive] {
            let result = match strategy {
                Strategy::Scrape => match &chain.explorer {
                    Some(explorer) => {
                        scrape::fetch(&self.client, chain, explorer, &checksummed).await
                    }
                    None => continue,
                },
                Strategy::Indexer => match &chain.graphql_url {
                    Some(graphql_url) => indexer::fetch(&self.client, graphql_url, address).await,
                    None => continue,
                },
                Strategy::Archive => match &chain.archive_rpc {
                    Some(archive_rpc) => archive::fetch(archive_rpc.as_ref(), address).await,
                    None => continue,
                },
            };
            let result = result.and_then(|creation_data| {
                if creation_data.is_empty() {
                    Err(anyhow::anyhow!("empty creation data returned"))
                } else {
                    Ok(creation_data)
                }
            });

            match result {
                Ok(creation_data) => {
                    logger.debug(
                        "resolve_creation_data",
                        LogContext::new().chain(&chain.id).address(&checksummed),
                        format!("creation data found by {strategy} strategy"),
                    );
                    return Ok(Resolved {
                        creation_data,
                        strategy,
                        failures,
                    });
                }
                Err(error) => {
                    let failure = StrategyFailure { strategy, error };
                    logger.warn(
                        "resolve_creation_data",
                        LogContext::new()
                            .chain(&chain.id)
                            .address(&checksummed)
                            .error(&failure),
                        "creation data strategy failed",
                    );
                    failures.push(failure);
                }
            }
        }

        Err(ResolveError::NotFound { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chains::ExplorerScrape,
        tests::rpc::{FakeRpcClient, ADDRESS},
    };
    use pretty_assertions::assert_eq;
    use regex::Regex;
    use std::{str::FromStr, sync::Arc};
    use url::Url;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn resolver() -> CreationDataResolver {
        CreationDataResolver::new(Duration::from_secs(5)).unwrap()
    }

    fn explorer(server: &MockServer) -> ExplorerScrape {
        ExplorerScrape {
            url_template: format!("{}/address/{{address}}", server.uri()),
            creation_tx_pattern: Regex::new("creation input: (0x[0-9a-f]+)").unwrap(),
        }
    }

    #[tokio::test]
    async fn no_configured_strategies_is_not_found() {
        let chain = Chain::new("1", vec![Arc::new(FakeRpcClient::default())]);

        let result = resolver()
            .resolve(&chain, ADDRESS, &RequestLogger::new())
            .await;

        match result {
            Err(ResolveError::NotFound { failures }) => assert!(failures.is_empty()),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn falls_through_to_archive_strategy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not a json"))
            .mount(&server)
            .await;

        let creation_data = Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]);
        let archive = FakeRpcClient::deployed(100, 42, creation_data.clone());

        let mut chain = Chain::new("1", vec![Arc::new(FakeRpcClient::default())]);
        chain.explorer = Some(explorer(&server));
        chain.graphql_url = Some(Url::from_str(&format!("{}/graphql", server.uri())).unwrap());
        chain.archive_rpc = Some(Arc::new(archive));

        let resolved = resolver()
            .resolve(&chain, ADDRESS, &RequestLogger::new())
            .await
            .expect("archive strategy should succeed");

        assert_eq!(creation_data, resolved.creation_data);
        assert_eq!(Strategy::Archive, resolved.strategy);
        let failed: Vec<_> = resolved
            .failures
            .iter()
            .map(|failure| failure.strategy)
            .collect();
        assert_eq!(vec![Strategy::Scrape, Strategy::Indexer], failed);
    }

    #[tokio::test]
    async fn first_successful_strategy_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<p>creation input: 0x60806040</p>"),
            )
            .mount(&server)
            .await;

        let archive = FakeRpcClient::deployed(100, 42, Bytes::from_static(&[0xff]));
        let mut chain = Chain::new("1", vec![Arc::new(FakeRpcClient::default())]);
        chain.explorer = Some(explorer(&server));
        chain.archive_rpc = Some(Arc::new(archive));

        let resolved = resolver()
            .resolve(&chain, ADDRESS, &RequestLogger::new())
            .await
            .expect("scrape strategy should succeed");

        assert_eq!(Strategy::Scrape, resolved.strategy);
        assert_eq!(
            Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]),
            resolved.creation_data
        );
        assert!(resolved.failures.is_empty());
    }

    #[tokio::test]
    async fn all_strategies_failing_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("nothing here"))
            .mount(&server)
            .await;

        let mut chain = Chain::new("1", vec![Arc::new(FakeRpcClient::default())]);
        chain.explorer = Some(explorer(&server));
        chain.archive_rpc = Some(Arc::new(FakeRpcClient::failing()));

        let result = resolver()
            .resolve_creation_data(&chain, ADDRESS, &RequestLogger::new())
            .await;

        match result {
            Err(ResolveError::NotFound { failures }) => assert_eq!(2, failures.len()),
            other => panic!("expected not found, got {other:?}"),
        }
    }
}
