//! Content encryption using AES-256-GCM
//!
//! Every stored file is encrypted under its own one-time [`ContentKey`].
//! The key only ever exists in the memory of the uploader and of a
//!  recipient that has unwrapped it; servers only see [`WrappedKey`]s.
//!
//! [`WrappedKey`]: super::WrappedKey

use std::fmt;
use std::io::Read;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::envelope::{Envelope, EnvelopeError, IV_SIZE};

/// Size of an AES-256 key in bytes (256 bits)
pub const CONTENT_KEY_SIZE: usize = 32;

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("random source failure: {0}")]
    Random(#[from] getrandom::Error),
    #[error("invalid content key size, expected {CONTENT_KEY_SIZE}, got {0}")]
    InvalidKeySize(usize),
    #[error("encrypt error")]
    Encrypt,
    /// The tag did not verify. Covers both tampering and a wrong key,
    ///  which the AEAD cannot tell apart.
    #[error("authentication failure")]
    AuthenticationFailure,
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A one-time 256-bit symmetric key for a single file
///
/// Zeroized on drop. `Debug` never prints the key bytes.
///
/// # Examples
///
/// ```ignore
/// let key = ContentKey::generate()?;
/// let envelope = key.encrypt(b"sensitive data")?;
/// let recovered = key.decrypt(&envelope)?;
/// assert_eq!(b"sensitive data", &recovered[..]);
/// ```
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ContentKey([u8; CONTENT_KEY_SIZE]);

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(<redacted>)")
    }
}

impl From<[u8; CONTENT_KEY_SIZE]> for ContentKey {
    fn from(bytes: [u8; CONTENT_KEY_SIZE]) -> Self {
        ContentKey(bytes)
    }
}

impl ContentKey {
    /// Generate a new random key using the OS random source
    pub fn generate() -> Result<Self, SecretError> {
        // fill in place so the bytes only ever live in a zeroize-on-drop value
        let mut key = Self([0; CONTENT_KEY_SIZE]);
        getrandom::getrandom(&mut key.0)?;
        Ok(key)
    }

    /// Create a key from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `CONTENT_KEY_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        if data.len() != CONTENT_KEY_SIZE {
            return Err(SecretError::InvalidKeySize(data.len()));
        }
        let mut key = Self([0; CONTENT_KEY_SIZE]);
        key.0.copy_from_slice(data);
        Ok(key)
    }

    /// Get a reference to the raw key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.bytes()))
    }

    /// Encrypt data under a freshly drawn IV
    ///
    /// Encrypting the same plaintext twice yields two different envelopes.
    ///
    /// # Errors
    ///
    /// Returns an error only on random source failure.
    pub fn encrypt(&self, data: &[u8]) -> Result<Envelope, SecretError> {
        let mut iv = [0u8; IV_SIZE];
        getrandom::getrandom(&mut iv)?;

        let sealed = self
            .cipher()
            .encrypt(Nonce::from_slice(&iv), data)
            .map_err(|_| SecretError::Encrypt)?;

        Ok(Envelope::new(iv, sealed))
    }

    /// Decrypt and authenticate an envelope
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::AuthenticationFailure`] if the tag does not
    ///  verify. No plaintext is returned in that case.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>, SecretError> {
        self.cipher()
            .decrypt(Nonce::from_slice(envelope.iv()), envelope.sealed())
            .map_err(|_| SecretError::AuthenticationFailure)
    }

    /// Decrypt a framed envelope straight from its stored bytes
    pub fn decrypt_bytes(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        let envelope = Envelope::from_bytes(data)?;
        self.decrypt(&envelope)
    }

    /// Create an encrypted reader from a plaintext reader
    ///
    /// This buffers all data in memory, encrypts it, and returns a reader
    ///  over the framed envelope bytes.
    pub fn encrypt_reader<R>(&self, reader: R) -> Result<impl Read, SecretError>
    where
        R: Read,
    {
        let mut data = Vec::new();
        let mut reader = reader;
        reader.read_to_end(&mut data)?;

        let envelope = self.encrypt(&data)?;
        data.zeroize();
        Ok(std::io::Cursor::new(envelope.to_bytes()))
    }

    /// Create a decrypted reader from a reader over envelope bytes
    ///
    /// The whole envelope is authenticated before any plaintext is readable.
    pub fn decrypt_reader<R>(&self, reader: R) -> Result<impl Read, SecretError>
    where
        R: Read,
    {
        let mut encrypted_data = Vec::new();
        let mut reader = reader;
        reader.read_to_end(&mut encrypted_data)?;

        let decrypted = self.decrypt_bytes(&encrypted_data)?;
        Ok(std::io::Cursor::new(decrypted))
    }
}
