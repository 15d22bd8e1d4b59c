//! File storage for upload payloads.
//!
//! Every file lives directly under one storage root and is addressed by its
//! bare file name. Names are checked lexically first (one normal path
//! component, no separators) and then, once something exists on disk, by
//! canonical containment so symlinks cannot lead outside the root.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Blob storage keyed by file name.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Create the file called `name`. An existing file is never replaced:
    /// that is `AlreadyExists`.
    async fn create(&self, name: &str, data: &[u8]) -> StorageResult<()>;

    /// Stream the contents of `name` in chunks.
    async fn open(&self, name: &str) -> StorageResult<ByteStream>;

    async fn exists(&self, name: &str) -> StorageResult<bool>;

    /// Remove the file called `name`. A missing file is `NotFound`.
    async fn remove(&self, name: &str) -> StorageResult<()>;
}

/// Rejects anything that is not a single plain file name.
pub fn validate_name(name: &str) -> StorageResult<()> {
    let invalid = || Err(StorageError::InvalidName(name.to_string()));

    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains(['/', '\\', '\0']) {
        return invalid();
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => invalid(),
    }
}

/// Local filesystem storage
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create the root directory if needed and pin its canonical path.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();

        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::Config(format!(
                "Failed to create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let root = fs::canonicalize(&root).await.map_err(|e| {
            StorageError::Config(format!(
                "Failed to canonicalize storage directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a file name to a path that is guaranteed to stay under the root.
    async fn resolve(&self, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;
        let path = self.root.join(name);

        match fs::symlink_metadata(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(path),
            Err(e) => return Err(e.into()),
        }

        // Something is there; a dangling link canonicalizes to an error.
        let canonical = fs::canonicalize(&path)
            .await
            .map_err(|_| StorageError::InvalidName(name.to_string()))?;

        if !canonical.starts_with(&self.root) {
            tracing::warn!(name, resolved = %canonical.display(), "file name escapes storage root");
            return Err(StorageError::InvalidName(name.to_string()));
        }

        Ok(canonical)
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn create(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.resolve(name).await?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StorageError::AlreadyExists(name.to_string()),
                _ => StorageError::Io(e),
            })?;

        let written: std::io::Result<()> = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            // Only this call created the file, so a partial write is ours to remove.
            if let Err(cleanup) = fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %cleanup, "could not remove partial file");
            }
            return Err(e.into());
        }

        tracing::info!(path = %path.display(), size_bytes = data.len(), "stored file");
        Ok(())
    }

    async fn open(&self, name: &str) -> StorageResult<ByteStream> {
        let path = self.resolve(name).await?;

        let file = fs::File::open(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::Io(e),
        })?;

        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        let path = self.resolve(name).await?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn remove(&self, name: &str) -> StorageResult<()> {
        let path = self.resolve(name).await?;

        fs::remove_file(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::Io(e),
        })?;

        tracing::info!(path = %path.display(), "removed file");
        Ok(())
    }
}
