use ethers::utils::keccak256;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

// There is struct for metadata in ethers_solc::artifacts::Metadata,
// however it requires `output` to be fully valid and keeps
// `libraries` in the standard json input form.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Metadata {
    pub compiler: MetadataCompiler,
    #[serde(default = "default_language")]
    pub language: String,
    pub settings: MetadataSettings,
    pub sources: BTreeMap<String, MetadataSource>,
}

fn default_language() -> String {
    "Solidity".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MetadataCompiler {
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSettings {
    pub compilation_target: BTreeMap<String, String>,
    /// `path:Name` to address.
    #[serde(default)]
    pub libraries: BTreeMap<String, String>,
    /// Settings which are passed to the compiler as is
    /// (optimizer, evmVersion, remappings, metadata, ...).
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MetadataSource {
    pub keccak256: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("metadata file not found among the uploaded files")]
    MetadataNotFound,
    #[error("metadata does not specify the compilation target")]
    NoCompilationTarget,
}

/// Returns the `0x` prefixed keccak256 hash of the content,
/// in the form source hashes are declared in metadata.
pub fn content_hash(content: &str) -> String {
    format!("0x{}", hex::encode(keccak256(content.as_bytes())))
}

/// Contract sources grouped around the metadata document which declares them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckedContract {
    pub metadata: Metadata,
    /// Metadata document as it was uploaded.
    pub metadata_raw: String,
    /// Path to content of every source found so far.
    pub sources: BTreeMap<String, String>,
    /// Sources declared in metadata which have not been found.
    pub missing: BTreeMap<String, MetadataSource>,
}

impl CheckedContract {
    /// Builds the contract from uploaded files.
    ///
    /// The first file which is a valid metadata document is used as metadata.
    /// The rest of files are matched against metadata sources by their hashes,
    /// so that file names are not required to correspond to source paths.
    pub fn from_files(files: &BTreeMap<String, String>) -> Result<Self, ContractError> {
        let (metadata_name, metadata, metadata_raw) = files
            .iter()
            .find_map(|(name, content)| {
                serde_json::from_str::<Metadata>(content)
                    .ok()
                    .map(|metadata| (name, metadata, content.clone()))
            })
            .ok_or(ContractError::MetadataNotFound)?;
        if metadata.settings.compilation_target.is_empty() {
            return Err(ContractError::NoCompilationTarget);
        }

        let by_hash: BTreeMap<String, &String> = files
            .iter()
            .filter(|(name, _)| *name != metadata_name)
            .map(|(_, content)| (content_hash(content), content))
            .collect();

        let mut sources = BTreeMap::new();
        let mut missing = BTreeMap::new();
        for (path, source) in &metadata.sources {
            let declared = source.keccak256.to_lowercase();
            let content = source
                .content
                .clone()
                .or_else(|| by_hash.get(&declared).map(|content| content.to_string()));
            match content {
                Some(content) => {
                    sources.insert(path.clone(), content);
                }
                None => {
                    missing.insert(path.clone(), source.clone());
                }
            }
        }

        Ok(Self {
            metadata,
            metadata_raw,
            sources,
            missing,
        })
    }

    /// Returns the `(path, name)` of the compiled contract.
    pub fn compilation_target(&self) -> Option<(&str, &str)> {
        self.metadata
            .settings
            .compilation_target
            .iter()
            .next()
            .map(|(path, name)| (path.as_str(), name.as_str()))
    }

    /// Declared name of the contract.
    pub fn name(&self) -> &str {
        self.compilation_target()
            .map(|(_, name)| name)
            .unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Moves the source from missing to found ones.
    pub fn add_source(&mut self, path: &str, content: String) {
        self.missing.remove(path);
        self.sources.insert(path.to_string(), content);
    }
}
