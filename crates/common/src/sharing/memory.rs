use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::crypto::PublicKey;

use super::provider::{BlobRef, BlobStore, BlobStoreError, DirectoryError, KeyDirectory};
use super::record::Identity;

/// In-memory blob store
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<HashMap<BlobRef, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held
    pub fn len(&self) -> usize {
        self.inner.read().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn refs(&self) -> Vec<BlobRef> {
        self.inner
            .read()
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Overwrite a stored blob in place. Lets tests play a hostile server.
    pub fn tamper<F>(&self, blob: &BlobRef, f: F) -> Result<(), BlobStoreError>
    where
        F: FnOnce(&mut Vec<u8>),
    {
        let mut blobs = self.inner.write().map_err(lock_error)?;
        let data = blobs
            .get_mut(blob)
            .ok_or_else(|| BlobStoreError::NotFound(blob.clone()))?;
        f(data);
        Ok(())
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> BlobStoreError {
    BlobStoreError::Backend(format!("failed to acquire lock: {}", e))
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, data: Vec<u8>) -> Result<BlobRef, BlobStoreError> {
        let blob = BlobRef::new(Uuid::new_v4().to_string());
        self.inner
            .write()
            .map_err(lock_error)?
            .insert(blob.clone(), data);
        Ok(blob)
    }

    async fn get(&self, blob: &BlobRef) -> Result<Vec<u8>, BlobStoreError> {
        self.inner
            .read()
            .map_err(lock_error)?
            .get(blob)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(blob.clone()))
    }

    async fn delete(&self, blob: &BlobRef) -> Result<(), BlobStoreError> {
        self.inner.write().map_err(lock_error)?.remove(blob);
        Ok(())
    }
}

/// In-memory key directory
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyDirectory {
    inner: Arc<RwLock<MemoryKeyDirectoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryKeyDirectoryInner {
    /// username -> published public key
    keys: HashMap<String, PublicKey>,
    /// user id -> sealed private key backup
    backups: HashMap<u64, Vec<u8>>,
}

impl MemoryKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

fn directory_lock_error<E: std::fmt::Display>(e: E) -> DirectoryError {
    DirectoryError::Backend(format!("failed to acquire lock: {}", e))
}

#[async_trait]
impl KeyDirectory for MemoryKeyDirectory {
    async fn publish(&self, username: &str, key: PublicKey) -> Result<(), DirectoryError> {
        self.inner
            .write()
            .map_err(directory_lock_error)?
            .keys
            .insert(username.to_string(), key);
        Ok(())
    }

    async fn lookup(&self, username: &str) -> Result<Option<PublicKey>, DirectoryError> {
        Ok(self
            .inner
            .read()
            .map_err(directory_lock_error)?
            .keys
            .get(username)
            .cloned())
    }

    async fn store_backup(&self, owner: &Identity, sealed: Vec<u8>) -> Result<(), DirectoryError> {
        self.inner
            .write()
            .map_err(directory_lock_error)?
            .backups
            .insert(owner.user_id, sealed);
        Ok(())
    }

    async fn fetch_backup(&self, requester: &Identity) -> Result<Option<Vec<u8>>, DirectoryError> {
        Ok(self
            .inner
            .read()
            .map_err(directory_lock_error)?
            .backups
            .get(&requester.user_id)
            .cloned())
    }
}
