use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::crypto::{
    CipherSuite, Envelope, EnvelopeError, KeyError, SecretError, WrappedKey,
};

use super::provider::{BlobStore, BlobStoreError, DirectoryError, KeyDirectory};
use super::record::{FileId, FileRecord, FileSummary, Identity, SharedFileSummary};

#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("file not found: {0}")]
    FileNotFound(FileId),
    #[error("{username} may not access file {file_id}")]
    AccessDenied { file_id: FileId, username: String },
    #[error("no public key published for '{0}'")]
    RecipientKeyUnavailable(String),
    #[error("cannot share a file with its owner")]
    SelfShare,
    #[error("no private key backup stored for {0}")]
    BackupNotFound(String),
    #[error("blob store error: {0}")]
    Blob(#[from] BlobStoreError),
    #[error("key directory error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
}

/// What a grant did to the recipient's edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Created,
    /// An edge already existed and its wrapped key was replaced
    Replaced,
}

/// What a revoke did to the recipient's edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revocation {
    Revoked,
    /// There was no edge to remove
    NotShared,
}

/// An encrypted file as submitted by its owner
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    /// Framed envelope bytes, `iv || ciphertext || tag`
    pub envelope: Vec<u8>,
    /// The content key wrapped under the owner's own public key
    pub owner_key: WrappedKey,
    pub cipher_suite: CipherSuite,
}

/// Everything a principal needs to decrypt a file locally
#[derive(Debug, Clone)]
pub struct Download {
    pub file_id: FileId,
    pub filename: String,
    pub content_type: Option<String>,
    pub cipher_suite: CipherSuite,
    pub is_owner: bool,
    pub envelope: Envelope,
    /// The content key wrapped for the requesting principal
    pub wrapped_key: WrappedKey,
}

/// A record slot. Emptied when the file is deleted, so that anyone who
///  grabbed the slot before it left the index sees the file as gone.
type Slot = Arc<Mutex<Option<FileRecord>>>;

/// Server-side index of encrypted files and their share edges
///
/// Every mutation of a file happens under that file's own lock, so two
///  concurrent grants to the same recipient leave exactly one edge and a
///  delete never races a download of the same file. Operations on
///  different files do not contend.
///
/// The registry only ever handles envelopes and wrapped keys.
#[derive(Debug)]
pub struct ShareRegistry<B, D> {
    inner: Arc<ShareRegistryInner<B, D>>,
}

#[derive(Debug)]
struct ShareRegistryInner<B, D> {
    blobs: B,
    directory: D,
    files: RwLock<HashMap<FileId, Slot>>,
}

impl<B, D> Clone for ShareRegistry<B, D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: BlobStore, D: KeyDirectory> ShareRegistry<B, D> {
    pub fn new(blobs: B, directory: D) -> Self {
        Self {
            inner: Arc::new(ShareRegistryInner {
                blobs,
                directory,
                files: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn blobs(&self) -> &B {
        &self.inner.blobs
    }

    pub fn directory(&self) -> &D {
        &self.inner.directory
    }

    fn slot(&self, file_id: FileId) -> Result<Slot, ShareError> {
        self.inner
            .files
            .read()
            .get(&file_id)
            .cloned()
            .ok_or(ShareError::FileNotFound(file_id))
    }

    fn slots(&self) -> Vec<Slot> {
        self.inner.files.read().values().cloned().collect()
    }

    /// Store an encrypted file owned by `owner`
    pub async fn upload(&self, owner: &Identity, upload: Upload) -> Result<FileId, ShareError> {
        // reject anything that could never decrypt
        let envelope = Envelope::from_bytes(&upload.envelope)?;
        let size_bytes = envelope.len();
        let blob_ref = self.inner.blobs.put(upload.envelope).await?;

        let record = FileRecord {
            id: Uuid::new_v4(),
            owner: owner.clone(),
            filename: upload.filename,
            content_type: upload.content_type,
            size_bytes,
            blob_ref,
            owner_key: upload.owner_key,
            cipher_suite: upload.cipher_suite,
            uploaded_at: Utc::now(),
            edges: BTreeMap::new(),
        };
        let file_id = record.id;
        self.inner
            .files
            .write()
            .insert(file_id, Arc::new(Mutex::new(Some(record))));

        tracing::info!(%file_id, owner = %owner, size_bytes, "stored encrypted file");
        Ok(file_id)
    }

    /// The content key of `file_id` wrapped for its owner
    pub async fn owner_key(&self, owner: &Identity, file_id: FileId) -> Result<WrappedKey, ShareError> {
        let slot = self.slot(file_id)?;
        let guard = slot.lock().await;
        let record = guard.as_ref().ok_or(ShareError::FileNotFound(file_id))?;
        check_owner(record, owner)?;
        Ok(record.owner_key.clone())
    }

    /// Give `recipient` access to `file_id` through a key the owner has
    ///  already wrapped for them. Granting twice replaces the wrapped key.
    pub async fn grant(
        &self,
        owner: &Identity,
        file_id: FileId,
        recipient: &str,
        wrapped_key: WrappedKey,
    ) -> Result<Grant, ShareError> {
        let slot = self.slot(file_id)?;
        let mut guard = slot.lock().await;
        let record = guard.as_mut().ok_or(ShareError::FileNotFound(file_id))?;
        check_owner(record, owner)?;

        if recipient == record.owner.username {
            return Err(ShareError::SelfShare);
        }
        if self.inner.directory.lookup(recipient).await?.is_none() {
            return Err(ShareError::RecipientKeyUnavailable(recipient.to_string()));
        }

        let grant = match record.put_edge(recipient, wrapped_key) {
            Some(_) => Grant::Replaced,
            None => Grant::Created,
        };
        tracing::info!(%file_id, owner = %owner, recipient, ?grant, "granted access");
        Ok(grant)
    }

    /// Remove `recipient`'s edge. Revoking an absent edge is a no-op.
    pub async fn revoke(
        &self,
        owner: &Identity,
        file_id: FileId,
        recipient: &str,
    ) -> Result<Revocation, ShareError> {
        let slot = self.slot(file_id)?;
        let mut guard = slot.lock().await;
        let record = guard.as_mut().ok_or(ShareError::FileNotFound(file_id))?;
        check_owner(record, owner)?;

        let revocation = match record.remove_edge(recipient) {
            Some(_) => Revocation::Revoked,
            None => Revocation::NotShared,
        };
        tracing::info!(%file_id, owner = %owner, recipient, ?revocation, "revoked access");
        Ok(revocation)
    }

    /// Fetch the envelope and the caller's wrapped key
    ///
    /// The owner gets the owner key; anyone else needs an edge.
    pub async fn fetch(&self, requester: &Identity, file_id: FileId) -> Result<Download, ShareError> {
        let slot = self.slot(file_id)?;
        let guard = slot.lock().await;
        let record = guard.as_ref().ok_or(ShareError::FileNotFound(file_id))?;

        let is_owner = record.is_owner(requester);
        let wrapped_key = if is_owner {
            record.owner_key.clone()
        } else {
            match record.edge(&requester.username) {
                Some(edge) => edge.wrapped_key.clone(),
                None => {
                    tracing::warn!(%file_id, requester = %requester, "download refused");
                    return Err(ShareError::AccessDenied {
                        file_id,
                        username: requester.username.clone(),
                    });
                }
            }
        };

        let data = self.inner.blobs.get(&record.blob_ref).await?;
        let envelope = Envelope::from_bytes(&data)?;

        tracing::debug!(%file_id, requester = %requester, is_owner, "serving encrypted file");
        Ok(Download {
            file_id,
            filename: record.filename.clone(),
            content_type: record.content_type.clone(),
            cipher_suite: record.cipher_suite,
            is_owner,
            envelope,
            wrapped_key,
        })
    }

    /// Delete a file, its blob and every edge pointing at it
    pub async fn delete(&self, owner: &Identity, file_id: FileId) -> Result<(), ShareError> {
        let slot = self.slot(file_id)?;
        let mut guard = slot.lock().await;
        let record = guard.as_ref().ok_or(ShareError::FileNotFound(file_id))?;
        check_owner(record, owner)?;

        // the record stays put if the blob cannot be removed
        self.inner.blobs.delete(&record.blob_ref).await?;
        let edges = guard.take().map(|record| record.edges.len()).unwrap_or(0);
        self.inner.files.write().remove(&file_id);
        drop(guard);

        tracing::info!(%file_id, owner = %owner, edges, "deleted file");
        Ok(())
    }

    /// Files owned by `owner`, newest first
    pub async fn list_owned(&self, owner: &Identity) -> Vec<FileSummary> {
        let mut files = Vec::new();
        for slot in self.slots() {
            let guard = slot.lock().await;
            if let Some(record) = guard.as_ref() {
                if record.is_owner(owner) {
                    files.push(record.summary());
                }
            }
        }
        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        files
    }

    /// Files other principals have shared with `recipient`, most recently shared first
    pub async fn list_shared_with(&self, recipient: &Identity) -> Vec<SharedFileSummary> {
        let mut files = Vec::new();
        for slot in self.slots() {
            let guard = slot.lock().await;
            let Some(record) = guard.as_ref() else {
                continue;
            };
            if let Some(edge) = record.edge(&recipient.username) {
                files.push(SharedFileSummary {
                    id: record.id,
                    filename: record.filename.clone(),
                    content_type: record.content_type.clone(),
                    size_bytes: record.size_bytes,
                    shared_by: record.owner.username.clone(),
                    shared_at: edge.shared_at,
                });
            }
        }
        files.sort_by(|a, b| b.shared_at.cmp(&a.shared_at));
        files
    }
}

fn check_owner(record: &FileRecord, identity: &Identity) -> Result<(), ShareError> {
    if record.is_owner(identity) {
        Ok(())
    } else {
        Err(ShareError::AccessDenied {
            file_id: record.id,
            username: identity.username.clone(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{KeyPair, MIN_ENVELOPE_SIZE};
    use crate::sharing::{MemoryBlobStore, MemoryKeyDirectory};

    type Registry = ShareRegistry<MemoryBlobStore, MemoryKeyDirectory>;

    fn alice() -> Identity {
        Identity::new(1, "alice")
    }

    fn bob() -> Identity {
        Identity::new(2, "bob")
    }

    fn dummy_upload() -> Upload {
        Upload {
            filename: "notes.txt".to_string(),
            content_type: Some("text/plain".to_string()),
            envelope: vec![0u8; MIN_ENVELOPE_SIZE + 5],
            owner_key: WrappedKey::from(vec![1u8; 256]),
            cipher_suite: CipherSuite::default(),
        }
    }

    async fn setup() -> (Registry, FileId) {
        let registry = ShareRegistry::new(MemoryBlobStore::new(), MemoryKeyDirectory::new());
        let bob_keys = KeyPair::generate().unwrap();
        registry
            .directory()
            .publish("bob", bob_keys.public().clone())
            .await
            .unwrap();
        let file_id = registry.upload(&alice(), dummy_upload()).await.unwrap();
        (registry, file_id)
    }

    #[tokio::test]
    async fn test_upload_rejects_truncated_envelope() {
        let registry = ShareRegistry::new(MemoryBlobStore::new(), MemoryKeyDirectory::new());
        let mut upload = dummy_upload();
        upload.envelope = vec![0u8; MIN_ENVELOPE_SIZE - 1];

        let result = registry.upload(&alice(), upload).await;
        assert!(matches!(result, Err(ShareError::Envelope(_))));
        assert!(registry.blobs().is_empty());
    }

    #[tokio::test]
    async fn test_grant_rules() {
        let (registry, file_id) = setup().await;
        let wrapped = WrappedKey::from(vec![2u8; 256]);

        assert!(matches!(
            registry.grant(&alice(), file_id, "alice", wrapped.clone()).await,
            Err(ShareError::SelfShare)
        ));
        assert!(matches!(
            registry.grant(&alice(), file_id, "carol", wrapped.clone()).await,
            Err(ShareError::RecipientKeyUnavailable(name)) if name == "carol"
        ));
        assert!(matches!(
            registry.grant(&bob(), file_id, "bob", wrapped.clone()).await,
            Err(ShareError::AccessDenied { .. })
        ));
        assert!(matches!(
            registry.grant(&alice(), Uuid::new_v4(), "bob", wrapped.clone()).await,
            Err(ShareError::FileNotFound(_))
        ));

        assert_eq!(
            registry.grant(&alice(), file_id, "bob", wrapped.clone()).await.unwrap(),
            Grant::Created
        );
        let replacement = WrappedKey::from(vec![3u8; 256]);
        assert_eq!(
            registry.grant(&alice(), file_id, "bob", replacement.clone()).await.unwrap(),
            Grant::Replaced
        );
        let download = registry.fetch(&bob(), file_id).await.unwrap();
        assert_eq!(download.wrapped_key, replacement);
        assert!(!download.is_owner);
    }

    #[tokio::test]
    async fn test_concurrent_grants_leave_one_edge() {
        let (registry, file_id) = setup().await;

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .grant(&alice(), file_id, "bob", WrappedKey::from(vec![i; 256]))
                    .await
            }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == Grant::Created {
                created += 1;
            }
        }
        assert_eq!(created, 1);

        let owned = registry.list_owned(&alice()).await;
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].shared_with.len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (registry, file_id) = setup().await;
        registry
            .grant(&alice(), file_id, "bob", WrappedKey::from(vec![2u8; 256]))
            .await
            .unwrap();

        assert_eq!(
            registry.revoke(&alice(), file_id, "bob").await.unwrap(),
            Revocation::Revoked
        );
        assert_eq!(
            registry.revoke(&alice(), file_id, "bob").await.unwrap(),
            Revocation::NotShared
        );
        assert!(matches!(
            registry.fetch(&bob(), file_id).await,
            Err(ShareError::AccessDenied { .. })
        ));
        assert!(matches!(
            registry.revoke(&bob(), file_id, "bob").await,
            Err(ShareError::AccessDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (registry, file_id) = setup().await;
        registry
            .grant(&alice(), file_id, "bob", WrappedKey::from(vec![2u8; 256]))
            .await
            .unwrap();
        assert_eq!(registry.list_shared_with(&bob()).await.len(), 1);

        assert!(matches!(
            registry.delete(&bob(), file_id).await,
            Err(ShareError::AccessDenied { .. })
        ));
        registry.delete(&alice(), file_id).await.unwrap();

        assert!(registry.blobs().is_empty());
        assert!(registry.list_owned(&alice()).await.is_empty());
        assert!(registry.list_shared_with(&bob()).await.is_empty());
        assert!(matches!(
            registry.fetch(&alice(), file_id).await,
            Err(ShareError::FileNotFound(_))
        ));
        assert!(matches!(
            registry.delete(&alice(), file_id).await,
            Err(ShareError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_listing() {
        let (registry, file_id) = setup().await;
        let other = registry.upload(&bob(), dummy_upload()).await.unwrap();

        let owned = registry.list_owned(&alice()).await;
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, file_id);
        assert_eq!(owned[0].size_bytes, MIN_ENVELOPE_SIZE + 5);
        assert!(owned[0].shared_with.is_empty());

        assert!(registry.list_shared_with(&bob()).await.is_empty());
        registry
            .grant(&alice(), file_id, "bob", WrappedKey::from(vec![2u8; 256]))
            .await
            .unwrap();
        let shared = registry.list_shared_with(&bob()).await;
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].id, file_id);
        assert_eq!(shared[0].shared_by, "alice");
        assert_ne!(shared[0].id, other);
    }
}
