use crate::{
    contract::{content_hash, CheckedContract, Metadata},
    logger::{LogContext, RequestLogger},
    sources::SourceFetchError,
};
use async_trait::async_trait;
use bytes::Bytes;
use ethers_solc::Solc;
use mismatch::Mismatch;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompilationError {
    #[error("sources cannot be completed: {0}")]
    Sources(#[from] SourceFetchError),
    #[error("source {0} is missing")]
    MissingSource(String),
    #[error("source {path} does not match metadata: {mismatch}")]
    SourceHashMismatch {
        path: String,
        mismatch: Mismatch<String>,
    },
    #[error("unsupported compiler version: {0}")]
    UnsupportedVersion(String),
    #[error("compiler cannot be installed: {0}")]
    Install(String),
    #[error("compilation failed: {0:?}")]
    Compilation(Vec<String>),
    #[error("contract {0} not found in compiler output")]
    ContractNotFound(String),
    #[error("internal error while compiling: {0:#}")]
    Internal(anyhow::Error),
}

/// Result of compiling the contract declared as a metadata compilation target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledArtifact {
    pub runtime_bytecode: Bytes,
    pub creation_bytecode: Bytes,
    pub metadata: Metadata,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compiles the contract with the settings declared in its metadata.
    ///
    /// Fails if the sources are not exactly the ones metadata was generated for.
    async fn compile(
        &self,
        contract: &CheckedContract,
        logger: &RequestLogger,
    ) -> Result<CompiledArtifact, CompilationError>;
}

/// Checks every declared source is present and has the declared hash.
pub fn check_sources(contract: &CheckedContract) -> Result<(), CompilationError> {
    for (path, source) in &contract.metadata.sources {
        let content = contract
            .sources
            .get(path)
            .ok_or_else(|| CompilationError::MissingSource(path.clone()))?;
        let found = content_hash(content);
        let expected = source.keccak256.to_lowercase();
        if found != expected {
            return Err(CompilationError::SourceHashMismatch {
                path: path.clone(),
                mismatch: Mismatch::new(expected, found),
            });
        }
    }
    Ok(())
}

/// Builds the standard json input reproducing the compilation described by metadata.
pub fn standard_json_input(contract: &CheckedContract) -> Value {
    let metadata = &contract.metadata;

    let sources: BTreeMap<&String, Value> = contract
        .sources
        .iter()
        .map(|(path, content)| (path, json!({ "content": content })))
        .collect();

    // Metadata keeps libraries as `path:Name`, while the compiler
    // expects them to be grouped by path.
    let mut libraries: BTreeMap<&str, BTreeMap<&str, &String>> = BTreeMap::new();
    for (library, address) in &metadata.settings.libraries {
        let (path, name) = library.rsplit_once(':').unwrap_or(("", library.as_str()));
        libraries.entry(path).or_default().insert(name, address);
    }

    let mut settings: serde_json::Map<String, Value> = metadata
        .settings
        .other
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    settings.insert("libraries".into(), json!(libraries));
    settings.insert(
        "outputSelection".into(),
        json!({ "*": { "*": ["evm.bytecode.object", "evm.deployedBytecode.object"] } }),
    );

    json!({
        "language": metadata.language,
        "sources": sources,
        "settings": settings,
    })
}

/// Compiler version declared in metadata, without the build metadata.
pub fn release_version(version: &str) -> Result<semver::Version, CompilationError> {
    let parsed = semver::Version::parse(version.trim_start_matches('v'))
        .map_err(|_| CompilationError::UnsupportedVersion(version.to_string()))?;
    if !parsed.pre.is_empty() {
        return Err(CompilationError::UnsupportedVersion(version.to_string()));
    }
    Ok(semver::Version::new(parsed.major, parsed.minor, parsed.patch))
}

#[derive(Debug, Deserialize)]
struct CompilerOutput {
    #[serde(default)]
    errors: Vec<OutputError>,
    #[serde(default)]
    contracts: BTreeMap<String, BTreeMap<String, OutputContract>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputError {
    severity: String,
    message: String,
    formatted_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputContract {
    evm: OutputEvm,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputEvm {
    bytecode: OutputBytecode,
    deployed_bytecode: OutputBytecode,
}

#[derive(Debug, Deserialize)]
struct OutputBytecode {
    object: String,
}

fn decode_object(object: &str) -> Result<Bytes, CompilationError> {
    hex::decode(object.trim_start_matches("0x"))
        .map(Bytes::from)
        .map_err(|err| CompilationError::Internal(anyhow::anyhow!("invalid bytecode: {err}")))
}

/// [`Compiler`] which runs solc releases installed through svm.
#[derive(Clone, Debug, Default)]
pub struct SolcCompiler {}

impl SolcCompiler {
    async fn solc(&self, version: &semver::Version) -> Result<Solc, CompilationError> {
        if let Ok(Some(solc)) = Solc::find_svm_installed_version(version.to_string()) {
            return Ok(solc);
        }
        Solc::install(version)
            .await
            .map_err(|err| CompilationError::Install(err.to_string()))
    }
}

#[async_trait]
impl Compiler for SolcCompiler {
    async fn compile(
        &self,
        contract: &CheckedContract,
        logger: &RequestLogger,
    ) -> Result<CompiledArtifact, CompilationError> {
        check_sources(contract)?;
        let (target_path, target_name) = contract
            .compilation_target()
            .ok_or_else(|| CompilationError::ContractNotFound(String::new()))?;

        let version = release_version(&contract.metadata.compiler.version)?;
        let solc = self.solc(&version).await?;
        let input = standard_json_input(contract);

        logger.debug(
            "compile",
            LogContext::new(),
            format!("compiling {target_path}:{target_name} with solc {version}"),
        );
        let output: CompilerOutput =
            tokio::task::spawn_blocking(move || solc.compile_as(&input))
                .await
                .map_err(|err| CompilationError::Internal(err.into()))?
                .map_err(|err| CompilationError::Internal(err.into()))?;

        let errors: Vec<_> = output
            .errors
            .iter()
            .filter(|error| error.severity.eq_ignore_ascii_case("error"))
            .map(|error| {
                error
                    .formatted_message
                    .clone()
                    .unwrap_or_else(|| error.message.clone())
            })
            .collect();
        if !errors.is_empty() {
            return Err(CompilationError::Compilation(errors));
        }

        let compiled = output
            .contracts
            .get(target_path)
            .and_then(|contracts| contracts.get(target_name))
            .ok_or_else(|| CompilationError::ContractNotFound(target_name.to_string()))?;

        Ok(CompiledArtifact {
            runtime_bytecode: decode_object(&compiled.evm.deployed_bytecode.object)?,
            creation_bytecode: decode_object(&compiled.evm.bytecode.object)?,
            metadata: contract.metadata.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const SOURCE: &str = "pragma solidity ^0.8.0;\ncontract Storage {}\n";

    fn contract(libraries: Value) -> CheckedContract {
        let metadata = json!({
            "compiler": { "version": "0.8.14+commit.80d49f37" },
            "language": "Solidity",
            "settings": {
                "compilationTarget": { "contracts/Storage.sol": "Storage" },
                "evmVersion": "london",
                "libraries": libraries,
                "metadata": { "bytecodeHash": "ipfs" },
                "optimizer": { "enabled": true, "runs": 200 },
                "remappings": []
            },
            "sources": {
                "contracts/Storage.sol": { "keccak256": content_hash(SOURCE) }
            }
        })
        .to_string();
        let files = BTreeMap::from([
            ("metadata.json".to_string(), metadata),
            ("Storage.sol".to_string(), SOURCE.to_string()),
        ]);
        CheckedContract::from_files(&files).unwrap()
    }

    #[test]
    fn input_reproduces_metadata_settings() {
        let contract = contract(json!({
            "contracts/Lib.sol:Lib": "0x027f1fe8bbc2a7e9fe97868e82c6ec6939086c52"
        }));

        let input = standard_json_input(&contract);

        let expected = json!({
            "language": "Solidity",
            "sources": {
                "contracts/Storage.sol": { "content": SOURCE }
            },
            "settings": {
                "evmVersion": "london",
                "libraries": {
                    "contracts/Lib.sol": {
                        "Lib": "0x027f1fe8bbc2a7e9fe97868e82c6ec6939086c52"
                    }
                },
                "metadata": { "bytecodeHash": "ipfs" },
                "optimizer": { "enabled": true, "runs": 200 },
                "outputSelection": {
                    "*": { "*": ["evm.bytecode.object", "evm.deployedBytecode.object"] }
                },
                "remappings": []
            }
        });
        assert_eq!(expected, input);
    }

    #[test]
    fn modified_source_is_rejected() {
        let mut contract = contract(json!({}));
        check_sources(&contract).expect("sources should match");

        contract
            .sources
            .insert("contracts/Storage.sol".into(), format!("{SOURCE}// changed"));
        let error = check_sources(&contract).expect_err("hash should not match");
        assert!(
            matches!(error, CompilationError::SourceHashMismatch { .. }),
            "expected: 'SourceHashMismatch', got: {error:?}"
        );

        contract.sources.clear();
        let error = check_sources(&contract).expect_err("source should be missing");
        assert!(matches!(error, CompilationError::MissingSource(_)));
    }

    #[rstest]
    #[case("0.8.14+commit.80d49f37", Some("0.8.14"))]
    #[case("v0.4.26+commit.4563c3fc", Some("0.4.26"))]
    #[case("0.8.15-nightly.2022.5.27+commit.095cc647", None)]
    #[case("latest", None)]
    fn parses_release_version(#[case] version: &str, #[case] expected: Option<&str>) {
        let parsed = release_version(version).ok().map(|v| v.to_string());
        assert_eq!(expected.map(str::to_string), parsed);
    }
}
