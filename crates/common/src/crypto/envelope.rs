//! Wire framing for authenticated-encryption output
//!
//! ```text
//! [ iv: 12 bytes ][ ciphertext: n bytes ][ tag: 16 bytes ]
//! ```
//!
//! The layout is versionless so that blobs written by older clients stay
//!  readable. The algorithm in use is recorded next to the blob as a
//!  [`CipherSuite`] rather than inside it.

use serde::{Deserialize, Serialize};

/// Size of the AES-GCM initialization vector in bytes (96 bits)
pub const IV_SIZE: usize = 12;
/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;
/// Smallest well-formed envelope: an IV and a tag around empty plaintext
pub const MIN_ENVELOPE_SIZE: usize = IV_SIZE + TAG_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope of {0} bytes is shorter than the {MIN_ENVELOPE_SIZE} byte minimum")]
    Truncated(usize),
}

/// Algorithms used to produce an envelope and its wrapped keys
///
/// Stored alongside each file so that a future suite can be introduced
///  without rewriting existing blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherSuite {
    /// AES-256-GCM content encryption, RSA-OAEP (SHA-256) key wrapping
    #[default]
    Aes256GcmRsaOaepSha256,
}

impl std::fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherSuite::Aes256GcmRsaOaepSha256 => write!(f, "aes256gcm+rsa-oaep-sha256"),
        }
    }
}

/// One authenticated-encryption output: IV, ciphertext and tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    iv: [u8; IV_SIZE],
    /// ciphertext || tag, kept together as the AEAD primitive expects
    sealed: Vec<u8>,
}

impl Envelope {
    pub(crate) fn new(iv: [u8; IV_SIZE], sealed: Vec<u8>) -> Self {
        Self { iv, sealed }
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    /// Ciphertext without the trailing tag
    pub fn ciphertext(&self) -> &[u8] {
        &self.sealed[..self.sealed.len() - TAG_SIZE]
    }

    pub fn tag(&self) -> &[u8] {
        &self.sealed[self.sealed.len() - TAG_SIZE..]
    }

    /// Ciphertext and tag as one block, the input to AEAD decryption
    pub(crate) fn sealed(&self) -> &[u8] {
        &self.sealed
    }

    /// Total size of the framed envelope
    pub fn len(&self) -> usize {
        IV_SIZE + self.sealed.len()
    }

    /// Size of the plaintext this envelope decrypts to
    pub fn plaintext_len(&self) -> usize {
        self.sealed.len() - TAG_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.plaintext_len() == 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.sealed);
        out
    }

    /// Split a stored blob into IV and sealed remainder
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() < MIN_ENVELOPE_SIZE {
            return Err(EnvelopeError::Truncated(bytes.len()));
        }
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&bytes[..IV_SIZE]);
        Ok(Self {
            iv,
            sealed: bytes[IV_SIZE..].to_vec(),
        })
    }
}

impl TryFrom<&[u8]> for Envelope {
    type Error = EnvelopeError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl From<Envelope> for Vec<u8> {
    fn from(envelope: Envelope) -> Self {
        envelope.to_bytes()
    }
}
