use anyhow::anyhow;
use config::{Config, File};
use serde::{de::IgnoredAny, Deserialize};
use serde_with::{serde_as, DurationSeconds};
use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub server: ServerSettings,
    pub chains_mode: ChainsMode,
    pub chains: Vec<ChainSettings>,
    pub rpc: RpcSettings,
    pub creation_data: CreationDataSettings,
    pub source_fetcher: SourceFetcherSettings,
    pub repository: RepositorySettings,
    pub tracing: TracingSettings,

    // Is required as we deny unknown fields, but allow users provide
    // path to config through PREFIX__CONFIG env variable. If removed,
    // the setup would fail with `unknown field `config`, expected one of...`
    pub config: IgnoredAny,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from_str("0.0.0.0:8050").expect("should be valid url"),
        }
    }
}

/// Selects which endpoints of the configured chains are used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainsMode {
    /// Every remote provider endpoint listed in `rpc`.
    #[default]
    Remote,
    /// Only the `self_hosted_rpc` node; chains without one are skipped.
    SelfHosted,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainSettings {
    pub chain_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rpc: Vec<Url>,
    #[serde(default)]
    pub self_hosted_rpc: Option<Url>,
    #[serde(default)]
    pub archive_rpc: Option<Url>,
    #[serde(default)]
    pub explorer: Option<ExplorerSettings>,
    #[serde(default)]
    pub graphql_url: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExplorerSettings {
    /// Page url, where `{address}` is replaced with the contract address.
    pub url_template: String,
    /// Regular expression whose first capture group matches either the
    /// creation transaction hash or the creation transaction input.
    pub creation_tx_pattern: String,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RpcSettings {
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreationDataSettings {
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for CreationDataSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceFetcherSettings {
    pub ipfs_gateway: Url,
    pub swarm_gateway: Url,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for SourceFetcherSettings {
    fn default() -> Self {
        Self {
            ipfs_gateway: Url::try_from("https://ipfs.io/").expect("valid url"),
            swarm_gateway: Url::try_from("https://swarm-gateways.net/").expect("valid url"),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositorySettings {
    pub root: PathBuf,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("repository"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingFormat {
    #[default]
    Default,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TracingSettings {
    pub format: TracingFormat,
}

impl Settings {
    pub fn new() -> anyhow::Result<Self> {
        let config_path = std::env::var("CONTRACT_VERIFIER__CONFIG");

        let mut builder = Config::builder();
        if let Ok(config_path) = config_path {
            builder = builder.add_source(File::with_name(&config_path));
        };
        builder = builder
            .add_source(config::Environment::with_prefix("CONTRACT_VERIFIER").separator("__"));

        builder
            .build()?
            .try_deserialize()
            .map_err(|err| anyhow!(err))
    }
}
