use crate::{
    bytecode,
    chains::{Chain, Chains},
    compiler::{CompilationError, CompiledArtifact, Compiler},
    content_address,
    contract::CheckedContract,
    creation_data::CreationDataResolver,
    logger::{LogContext, RequestLogger},
    matching::{self, CandidateMatch},
    repository::{sanitize_path, PersistenceError, Repository},
    rpc,
    sources::SourceFetcher,
    types::{MatchQuality, MatchResult, StorageTarget},
};
use blockscout_display_bytes::Bytes as DisplayBytes;
use ethers::{types::Address, utils::to_checksum};
use serde::Deserialize;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;

const METADATA_FILE_NAME: &str = "metadata.json";
const CONSTRUCTOR_ARGUMENTS_FILE_NAME: &str = "constructor-args.txt";
const DEFAULT_MISMATCH_MESSAGE: &str = "The deployed and recompiled bytecode don't match";

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    #[error("{contract}: {source}")]
    Compilation {
        contract: String,
        #[source]
        source: CompilationError,
    },
    #[error("{contract}: {message}")]
    Match { contract: String, message: String },
    #[error("{contract}: failed to store verified contract: {source}")]
    Persistence {
        contract: String,
        #[source]
        source: PersistenceError,
    },
    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

/// Request to verify the uploaded sources against one of the candidate addresses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct VerificationRequest {
    pub chain: String,
    pub addresses: Vec<String>,
    /// Metadata document and sources, keyed by file name.
    pub files: BTreeMap<String, String>,
    /// Already known deployed bytecode. Comparison is done against it
    /// directly, without fetching the code of the address.
    #[serde(default)]
    pub bytecode: Option<DisplayBytes>,
    #[serde(default)]
    pub creation_data: Option<DisplayBytes>,
}

pub struct Verifier {
    chains: Chains,
    resolver: CreationDataResolver,
    source_fetcher: Arc<dyn SourceFetcher>,
    compiler: Arc<dyn Compiler>,
    repository: Arc<dyn Repository>,
}

impl Verifier {
    pub fn new(
        chains: Chains,
        resolver: CreationDataResolver,
        source_fetcher: Arc<dyn SourceFetcher>,
        compiler: Arc<dyn Compiler>,
        repository: Arc<dyn Repository>,
    ) -> Self {
        Self {
            chains,
            resolver,
            source_fetcher,
            compiler,
            repository,
        }
    }

    pub fn chains(&self) -> &Chains {
        &self.chains
    }

    /// Verifies the request, storing the contract files on success.
    ///
    /// Every failure is logged before being returned.
    pub async fn verify(
        &self,
        request: VerificationRequest,
        logger: &RequestLogger,
    ) -> Result<MatchResult, Error> {
        let context = LogContext::new()
            .chain(&request.chain)
            .address(request.addresses.join(","));

        let result = self.verify_inner(request, logger).await;
        match &result {
            Ok(result) => logger.info(
                "verify",
                context.address(&result.address),
                format!("contract verified with {:?} status", result.status),
            ),
            Err(err @ Error::Validation(_)) => {
                logger.info("verify", context.error(err), "invalid verification request")
            }
            Err(err) => logger.error("verify", context.error(err), "verification failed"),
        }
        result
    }

    async fn verify_inner(
        &self,
        request: VerificationRequest,
        logger: &RequestLogger,
    ) -> Result<MatchResult, Error> {
        let (chain, addresses) = self.validate(&request)?;
        let mut contract = CheckedContract::from_files(&request.files)
            .map_err(|err| Error::Validation(err.to_string()))?;
        let contract_name = contract.name().to_string();
        let compilation_error = |source: CompilationError| Error::Compilation {
            contract: contract_name.clone(),
            source,
        };

        if !self.source_fetcher.is_complete(&contract) {
            self.source_fetcher
                .fetch_missing(&mut contract, logger)
                .await
                .map_err(|err| compilation_error(err.into()))?;
        }

        let compiled = self
            .compiler
            .compile(&contract, logger)
            .await
            .map_err(compilation_error)?;

        let candidate = match request.bytecode {
            Some(deployed_bytecode) => {
                if addresses.len() != 1 {
                    return Err(Error::Match {
                        contract: contract_name,
                        message: format!(
                            "Exactly one address is expected when bytecode is provided, got {}",
                            addresses.len()
                        ),
                    });
                }
                self.compare_known_bytecode(
                    &chain,
                    addresses[0],
                    deployed_bytecode,
                    request.creation_data,
                    &compiled,
                    logger,
                )
                .await
            }
            None => {
                matching::resolve_match(
                    &chain,
                    &addresses,
                    &compiled.runtime_bytecode,
                    &compiled.creation_bytecode,
                    &self.resolver,
                    logger,
                )
                .await
            }
        };

        let quality = match candidate.result.status.quality() {
            Some(quality) => quality,
            None => {
                return Err(Error::Match {
                    contract: contract_name,
                    message: candidate
                        .result
                        .message
                        .unwrap_or_else(|| DEFAULT_MISMATCH_MESSAGE.to_string()),
                })
            }
        };

        self.store(&chain, &contract, &candidate, quality, logger)
            .await
            .map_err(|source| Error::Persistence {
                contract: contract_name,
                source,
            })?;

        Ok(candidate.result)
    }

    fn validate(&self, request: &VerificationRequest) -> Result<(Arc<Chain>, Vec<Address>), Error> {
        let chain_id = request.chain.trim();
        if chain_id.is_empty() {
            return Err(Error::Validation("chain is required".into()));
        }
        let addresses = request
            .addresses
            .iter()
            .filter(|address| !address.trim().is_empty())
            .map(|address| rpc::parse_address(address))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| Error::Validation(err.to_string()))?;
        if addresses.is_empty() {
            return Err(Error::Validation("at least one address is required".into()));
        }
        let chain = self
            .chains
            .get(chain_id)
            .ok_or_else(|| Error::Validation(format!("chain {chain_id} is not supported")))?;
        Ok((chain, addresses))
    }

    async fn compare_known_bytecode(
        &self,
        chain: &Chain,
        address: Address,
        deployed_bytecode: DisplayBytes,
        creation_data: Option<DisplayBytes>,
        compiled: &CompiledArtifact,
        logger: &RequestLogger,
    ) -> CandidateMatch {
        let deployed_bytecode = deployed_bytecode.0;
        let comparison = bytecode::compare(
            Some(&deployed_bytecode),
            creation_data.map(|creation_data| creation_data.0),
            &compiled.runtime_bytecode,
            &compiled.creation_bytecode,
            || {
                self.resolver
                    .resolve_creation_data(chain, address, logger)
            },
        )
        .await;

        CandidateMatch {
            result: MatchResult {
                address: to_checksum(&address, None),
                status: comparison.status,
                constructor_arguments: comparison.constructor_arguments.map(Into::into),
                message: None,
            },
            deployed_bytecode: Some(deployed_bytecode),
        }
    }

    async fn store(
        &self,
        chain: &Chain,
        contract: &CheckedContract,
        candidate: &CandidateMatch,
        quality: MatchQuality,
        logger: &RequestLogger,
    ) -> Result<(), PersistenceError> {
        let address = &candidate.result.address;
        let metadata = contract.metadata_raw.as_bytes();

        let content_path = candidate
            .deployed_bytecode
            .as_ref()
            .and_then(|bytecode| content_address::derive_storage_path(bytecode));
        let quality = match content_path {
            Some(content_path) => {
                self.repository
                    .save_content_addressed(&content_path, METADATA_FILE_NAME, metadata)
                    .await?;
                self.repository.delete_partial(&chain.id, address).await?;
                quality
            }
            None => {
                logger.info(
                    "store",
                    LogContext::new().chain(&chain.id).address(address),
                    "no content address in the deployed bytecode, storing as partial match",
                );
                MatchQuality::Partial
            }
        };

        let target = |file_name: String| StorageTarget::new(&chain.id, address, quality, file_name);
        self.repository
            .save(&target(METADATA_FILE_NAME.to_string()), metadata)
            .await?;
        for (path, content) in &contract.sources {
            let file_name = format!("sources/{}", sanitize_path(path).display());
            self.repository
                .save(&target(file_name), content.as_bytes())
                .await?;
        }
        if let Some(constructor_arguments) = &candidate.result.constructor_arguments {
            self.repository
                .save(
                    &target(CONSTRUCTOR_ARGUMENTS_FILE_NAME.to_string()),
                    constructor_arguments.to_string().as_bytes(),
                )
                .await?;
        }
        Ok(())
    }
}
