use std::fmt::{Debug, Display};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

use super::record::Identity;

/// Opaque handle to an envelope held by a [`BlobStore`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BlobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobStoreError {
    #[error("blob not found: {0}")]
    NotFound(BlobRef),
    /// Anything the backing store reports that callers cannot act on
    #[error("unhandled blob store error: {0}")]
    Backend(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("unhandled key directory error: {0}")]
    Backend(String),
}

/// Storage for encrypted envelopes
///
/// Stores bytes it cannot read. Implementations never see plaintext
///  or content keys.
#[async_trait]
pub trait BlobStore: Send + Sync + Debug + 'static {
    /// Store an envelope and return a handle to it
    async fn put(&self, data: Vec<u8>) -> Result<BlobRef, BlobStoreError>;

    /// Fetch a previously stored envelope
    ///
    /// # Returns
    /// * `Err(BlobStoreError::NotFound)` - nothing is stored under `blob`
    async fn get(&self, blob: &BlobRef) -> Result<Vec<u8>, BlobStoreError>;

    /// Remove a stored envelope. Removing an absent blob is not an error.
    async fn delete(&self, blob: &BlobRef) -> Result<(), BlobStoreError>;
}

/// Directory of published public keys, plus per-user private key backups
///
/// Public keys are readable by anyone. A backup is only ever returned to the
///  principal that stored it, and is expected to already be sealed by that
///  principal before it gets here.
#[async_trait]
pub trait KeyDirectory: Send + Sync + Debug + 'static {
    /// Publish (or replace) the public key for `username`
    async fn publish(&self, username: &str, key: PublicKey) -> Result<(), DirectoryError>;

    /// Look up the published public key for `username`
    async fn lookup(&self, username: &str) -> Result<Option<PublicKey>, DirectoryError>;

    /// Store a sealed private key backup for `owner`, replacing any previous one
    async fn store_backup(&self, owner: &Identity, sealed: Vec<u8>) -> Result<(), DirectoryError>;

    /// Fetch the backup belonging to `requester`
    async fn fetch_backup(&self, requester: &Identity) -> Result<Option<Vec<u8>>, DirectoryError>;
}
