use crate::types::{MatchQuality, StorageTarget};
use async_trait::async_trait;
use std::{
    io,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid storage path: {0}")]
    InvalidPath(String),
}

/// Storage of verified contract files.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Repository: Send + Sync {
    async fn save(&self, target: &StorageTarget, content: &[u8]) -> Result<(), PersistenceError>;

    /// Stores a file under a content address, e.g. `/ipfs/<multihash>`.
    async fn save_content_addressed(
        &self,
        content_path: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<(), PersistenceError>;

    /// Removes everything stored with partial quality for the contract.
    async fn delete_partial(&self, chain: &str, address: &str) -> Result<(), PersistenceError>;
}

/// Keeps only normal path segments, so that the result stays inside the directory it is joined to.
pub fn sanitize_path(path: &str) -> PathBuf {
    Path::new(path)
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment),
            _ => None,
        })
        .collect()
}

/// Repository which lays the files out in a local directory:
///
/// ```text
/// <root>/contracts/{full_match|partial_match}/<chain>/<address>/<file>
/// <root>/ipfs/<multihash>/<file>
/// <root>/swarm/{bzzr0|bzzr1}/<hash>/<file>
/// ```
#[derive(Clone, Debug)]
pub struct FileSystemRepository {
    root: PathBuf,
}

impl FileSystemRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contract_dir(&self, quality: MatchQuality, chain: &str, address: &str) -> PathBuf {
        self.root
            .join("contracts")
            .join(quality.directory())
            .join(sanitize_path(chain))
            .join(sanitize_path(address))
    }

    async fn write(&self, path: PathBuf, content: &[u8]) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistenceError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| PersistenceError::Write { path, source })
    }
}

fn file_path(dir: PathBuf, file_name: &str) -> Result<PathBuf, PersistenceError> {
    let file_name = sanitize_path(file_name);
    if file_name.as_os_str().is_empty() {
        return Err(PersistenceError::InvalidPath(dir.display().to_string()));
    }
    Ok(dir.join(file_name))
}

#[async_trait]
impl Repository for FileSystemRepository {
    async fn save(&self, target: &StorageTarget, content: &[u8]) -> Result<(), PersistenceError> {
        let dir = self.contract_dir(target.quality, &target.chain, &target.address);
        let path = file_path(dir, &target.file_name)?;
        self.write(path, content).await
    }

    async fn save_content_addressed(
        &self,
        content_path: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<(), PersistenceError> {
        let dir = sanitize_path(content_path);
        if dir.as_os_str().is_empty() {
            return Err(PersistenceError::InvalidPath(content_path.to_string()));
        }
        let path = file_path(self.root.join(dir), file_name)?;
        self.write(path, content).await
    }

    async fn delete_partial(&self, chain: &str, address: &str) -> Result<(), PersistenceError> {
        let path = self.contract_dir(MatchQuality::Partial, chain, address);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Remove { path, source }),
        }
    }
}
