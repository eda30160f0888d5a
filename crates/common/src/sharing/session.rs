use zeroize::Zeroizing;

use crate::crypto::{
    CipherSuite, ContentKey, KeyError, KeyPair, PrivateKey, PublicKey, WrappedKey,
};

use super::provider::{BlobStore, KeyDirectory};
use super::record::{FileId, FileSummary, Identity, SharedFileSummary};
use super::registry::{Grant, Revocation, ShareError, ShareRegistry, Upload};

/// A decrypted download
#[derive(Debug, Clone)]
pub struct DecryptedFile {
    pub file_id: FileId,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// One principal's client
///
/// Holds the principal's key pair and does every piece of cryptography on
///  the client side: content keys are generated, wrapped, recovered and used
///  here and never handed to the registry.
#[derive(Debug)]
pub struct Session<B, D> {
    identity: Identity,
    keys: KeyPair,
    registry: ShareRegistry<B, D>,
}

impl<B: BlobStore, D: KeyDirectory> Session<B, D> {
    pub fn new(identity: Identity, keys: KeyPair, registry: ShareRegistry<B, D>) -> Self {
        Self {
            identity,
            keys,
            registry,
        }
    }

    /// Rebuild a session from a private key backup sealed with `backup_key`
    pub async fn restore(
        identity: Identity,
        registry: ShareRegistry<B, D>,
        backup_key: &ContentKey,
    ) -> Result<Self, ShareError> {
        let sealed = registry
            .directory()
            .fetch_backup(&identity)
            .await?
            .ok_or_else(|| ShareError::BackupNotFound(identity.username.clone()))?;

        let pem = Zeroizing::new(backup_key.decrypt_bytes(&sealed)?);
        let pem = std::str::from_utf8(&pem)
            .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;
        let keys = KeyPair::from(PrivateKey::from_pem(pem)?);

        tracing::info!(identity = %identity, fingerprint = %keys.public().fingerprint(), "restored key pair from backup");
        Ok(Self::new(identity, keys, registry))
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keys.public()
    }

    pub fn registry(&self) -> &ShareRegistry<B, D> {
        &self.registry
    }

    /// Publish this principal's public key so others can share with it
    pub async fn publish_key(&self) -> Result<(), ShareError> {
        self.registry
            .directory()
            .publish(&self.identity.username, self.keys.public().clone())
            .await?;
        tracing::info!(
            identity = %self.identity,
            fingerprint = %self.keys.public().fingerprint(),
            "published public key"
        );
        Ok(())
    }

    /// Seal the private key under `backup_key` and store it with the directory
    pub async fn backup_private_key(&self, backup_key: &ContentKey) -> Result<(), ShareError> {
        let pem = Zeroizing::new(self.keys.private().to_pem()?);
        let sealed = backup_key.encrypt(pem.as_bytes())?;
        self.registry
            .directory()
            .store_backup(&self.identity, sealed.to_bytes())
            .await?;
        Ok(())
    }

    /// Encrypt and upload a file under a fresh content key
    pub async fn upload(
        &self,
        filename: &str,
        content_type: Option<&str>,
        plaintext: &[u8],
    ) -> Result<FileId, ShareError> {
        let content_key = ContentKey::generate()?;
        let envelope = content_key.encrypt(plaintext)?;
        let owner_key = WrappedKey::wrap(&content_key, self.keys.public())?;

        let upload = Upload {
            filename: filename.to_string(),
            content_type: content_type.map(str::to_string),
            envelope: envelope.to_bytes(),
            owner_key,
            cipher_suite: CipherSuite::default(),
        };
        self.registry.upload(&self.identity, upload).await
    }

    /// Upload a file and share it with each of `recipients`
    ///
    /// Stops at the first failed grant; the file and any grants made
    ///  before it remain.
    pub async fn upload_shared(
        &self,
        filename: &str,
        content_type: Option<&str>,
        plaintext: &[u8],
        recipients: &[&str],
    ) -> Result<FileId, ShareError> {
        let file_id = self.upload(filename, content_type, plaintext).await?;
        for recipient in recipients {
            self.share(file_id, recipient).await?;
        }
        Ok(file_id)
    }

    /// Give `recipient` access to one of our files
    ///
    /// Recovers the content key from our own wrapped key, wraps it under the
    ///  recipient's published key, and hands the registry only the result.
    pub async fn share(&self, file_id: FileId, recipient: &str) -> Result<Grant, ShareError> {
        if recipient == self.identity.username {
            return Err(ShareError::SelfShare);
        }
        let recipient_key = self
            .registry
            .directory()
            .lookup(recipient)
            .await?
            .ok_or_else(|| ShareError::RecipientKeyUnavailable(recipient.to_string()))?;

        let owner_key = self.registry.owner_key(&self.identity, file_id).await?;
        let content_key = owner_key.recover(self.keys.private())?;
        let wrapped = WrappedKey::wrap(&content_key, &recipient_key)?;

        tracing::debug!(
            %file_id,
            recipient,
            fingerprint = %recipient_key.fingerprint(),
            "wrapped content key for recipient"
        );
        self.registry
            .grant(&self.identity, file_id, recipient, wrapped)
            .await
    }

    pub async fn revoke(&self, file_id: FileId, recipient: &str) -> Result<Revocation, ShareError> {
        self.registry.revoke(&self.identity, file_id, recipient).await
    }

    /// Download, authenticate and decrypt a file we own or that was shared with us
    pub async fn download(&self, file_id: FileId) -> Result<DecryptedFile, ShareError> {
        let download = self.registry.fetch(&self.identity, file_id).await?;
        let content_key = download.wrapped_key.recover(self.keys.private())?;
        let data = content_key.decrypt(&download.envelope)?;

        Ok(DecryptedFile {
            file_id,
            filename: download.filename,
            content_type: download.content_type,
            data,
        })
    }

    pub async fn delete(&self, file_id: FileId) -> Result<(), ShareError> {
        self.registry.delete(&self.identity, file_id).await
    }

    pub async fn list_owned(&self) -> Vec<FileSummary> {
        self.registry.list_owned(&self.identity).await
    }

    pub async fn list_shared_with_me(&self) -> Vec<SharedFileSummary> {
        self.registry.list_shared_with(&self.identity).await
    }
}
