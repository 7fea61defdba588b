use crate::{
    logger::{LogContext, RequestLogger},
    rpc::{self, EthRpcClient, RpcClient, RpcError},
    settings::{ChainSettings, ChainsMode},
};
use anyhow::Context;
use bytes::Bytes;
use ethers::{types::Address, utils::to_checksum};
use regex::Regex;
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use url::Url;

/// Block explorer page used to look up the contract creation transaction.
#[derive(Clone, Debug)]
pub struct ExplorerScrape {
    pub url_template: String,
    pub creation_tx_pattern: Regex,
}

impl ExplorerScrape {
    pub fn page_url(&self, address: &str) -> String {
        self.url_template.replace("{address}", address)
    }
}

/// Configuration of a single supported chain.
#[derive(Clone)]
pub struct Chain {
    pub id: String,
    pub name: String,
    pub rpc: Vec<Arc<dyn RpcClient>>,
    pub archive_rpc: Option<Arc<dyn RpcClient>>,
    pub explorer: Option<ExplorerScrape>,
    pub graphql_url: Option<Url>,
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("id", &self.id)
            .field("name", &self.name)
            .field(
                "rpc",
                &self.rpc.iter().map(|rpc| rpc.endpoint()).collect::<Vec<_>>(),
            )
            .field(
                "archive_rpc",
                &self.archive_rpc.as_ref().map(|rpc| rpc.endpoint()),
            )
            .field("explorer", &self.explorer)
            .field("graphql_url", &self.graphql_url)
            .finish()
    }
}

impl Chain {
    /// Creates a chain with the given endpoints and no creation data sources.
    pub fn new(id: impl Into<String>, rpc: Vec<Arc<dyn RpcClient>>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            rpc,
            archive_rpc: None,
            explorer: None,
            graphql_url: None,
        }
    }

    /// Fetches the code currently deployed at `address`.
    ///
    /// Endpoints are tried in order and the first successful response is returned.
    /// The error of the last endpoint is returned if all of them fail.
    pub async fn get_bytecode(
        &self,
        address: Address,
        logger: &RequestLogger,
    ) -> Result<Bytes, RpcError> {
        let mut last_error = RpcError::NoEndpoints;
        for rpc in &self.rpc {
            match rpc.get_code(address, None).await {
                Ok(code) => return Ok(code),
                Err(err) => {
                    logger.warn(
                        "get_bytecode",
                        LogContext::new()
                            .chain(&self.id)
                            .address(to_checksum(&address, None))
                            .error(&err),
                        "failed to fetch bytecode",
                    );
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}

/// Immutable lookup table of supported chains, keyed by chain id.
#[derive(Clone, Debug, Default)]
pub struct Chains(HashMap<String, Arc<Chain>>);

impl Chains {
    pub fn new(chains: impl IntoIterator<Item = Chain>) -> Self {
        Self(
            chains
                .into_iter()
                .map(|chain| (chain.id.clone(), Arc::new(chain)))
                .collect(),
        )
    }

    pub fn get(&self, chain_id: &str) -> Option<Arc<Chain>> {
        self.0.get(chain_id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Chain>> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Builds the chains lookup table from configuration.
///
/// In [`ChainsMode::SelfHosted`] mode only the self hosted node is used
/// and chains without one are skipped.
pub fn load_chains(
    settings: &[ChainSettings],
    mode: ChainsMode,
    rpc_timeout: Duration,
) -> anyhow::Result<Chains> {
    let mut chains = Vec::new();
    for chain_settings in settings {
        let endpoints: Vec<&Url> = match mode {
            ChainsMode::Remote => chain_settings.rpc.iter().collect(),
            ChainsMode::SelfHosted => chain_settings.self_hosted_rpc.iter().collect(),
        };
        if endpoints.is_empty() {
            tracing::debug!(
                chain_id = %chain_settings.chain_id,
                mode = ?mode,
                "chain skipped as no endpoints are configured"
            );
            continue;
        }

        let rpc = endpoints
            .into_iter()
            .map(|url| rpc_client(url, rpc_timeout))
            .collect::<Result<Vec<_>, _>>()?;
        let archive_rpc = chain_settings
            .archive_rpc
            .as_ref()
            .map(|url| rpc_client(url, rpc_timeout))
            .transpose()?;
        let explorer = chain_settings
            .explorer
            .as_ref()
            .map(|explorer| -> anyhow::Result<ExplorerScrape> {
                let creation_tx_pattern = Regex::new(&explorer.creation_tx_pattern)
                    .with_context(|| {
                        format!(
                            "invalid creation tx pattern for chain {}",
                            chain_settings.chain_id
                        )
                    })?;
                Ok(ExplorerScrape {
                    url_template: explorer.url_template.clone(),
                    creation_tx_pattern,
                })
            })
            .transpose()?;

        chains.push(Chain {
            id: chain_settings.chain_id.clone(),
            name: chain_settings.name.clone(),
            rpc,
            archive_rpc,
            explorer,
            graphql_url: chain_settings.graphql_url.clone(),
        });
    }

    Ok(Chains::new(chains))
}

fn rpc_client(url: &Url, timeout: Duration) -> anyhow::Result<Arc<dyn RpcClient>> {
    Ok(Arc::new(EthRpcClient::new(url.as_str(), timeout)?))
}

/// Probes every configured endpoint. Failures are only reported.
pub async fn health_check(chains: &Chains) {
    for chain in chains.iter() {
        let endpoints = chain.rpc.iter().chain(chain.archive_rpc.iter());
        for rpc in endpoints {
            match rpc::health_check(rpc.as_ref()).await {
                Ok(()) => tracing::info!(
                    chain_id = %chain.id,
                    endpoint = rpc.endpoint(),
                    "rpc endpoint is healthy"
                ),
                Err(err) => tracing::warn!(
                    chain_id = %chain.id,
                    endpoint = rpc.endpoint(),
                    error = %err,
                    "rpc endpoint is unavailable"
                ),
            }
        }
    }
}
