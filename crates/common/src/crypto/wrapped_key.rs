//! Content key wrapping with RSA-OAEP
//!
//! A [`WrappedKey`] is a [`ContentKey`] encrypted under one recipient's
//!  public key using OAEP padding with SHA-256 for both the hash and MGF1,
//!  and an empty label. One exists per (file, recipient) pair.
//!
//! # Security Properties
//!
//! - **Zero knowledge storage**: a server holding wrapped keys cannot
//!   decrypt anything without the matching private key
//! - **No padding oracle**: every unwrap failure collapses into
//!   [`KeyError::Decryption`]
//! - **No revocation of disclosed keys**: once a recipient has unwrapped a
//!   key they hold it; removing the wrapped key only stops re-fetching

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rsa::Oaep;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::keys::{KeyError, PrivateKey, PublicKey};
use super::secret::{ContentKey, CONTENT_KEY_SIZE};

/// Output size of the OAEP hash in bytes
const OAEP_HASH_SIZE: usize = 32;

fn oaep() -> Oaep {
    Oaep::new::<Sha256>()
}

/// Largest message that can be wrapped under `public`
pub fn max_wrap_len(public: &PublicKey) -> usize {
    public.size().saturating_sub(2 * OAEP_HASH_SIZE + 2)
}

/// A content key encrypted for exactly one recipient
///
/// # Wire Format
///
/// Raw RSA ciphertext, exactly one modulus long (256 bytes for 2048-bit
///  keys), transmitted as standard base64 text.
///
/// # Examples
///
/// ```ignore
/// let content_key = ContentKey::generate()?;
/// let wrapped = WrappedKey::wrap(&content_key, bob.public())?;
///
/// // only Bob can recover it
/// let recovered = wrapped.recover(bob.private())?;
/// assert_eq!(content_key, recovered);
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct WrappedKey(Vec<u8>);

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedKey({} bytes)", self.0.len())
    }
}

impl fmt::Display for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl From<Vec<u8>> for WrappedKey {
    fn from(bytes: Vec<u8>) -> Self {
        WrappedKey(bytes)
    }
}

impl FromStr for WrappedKey {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl WrappedKey {
    /// Wrap a content key for the holder of `recipient`
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::PlaintextTooLarge`] if the key exceeds the OAEP
    ///  capacity of the recipient's modulus. That cannot happen for 256-bit
    ///  content keys under 2048-bit moduli.
    pub fn wrap(content_key: &ContentKey, recipient: &PublicKey) -> Result<Self, KeyError> {
        Self::wrap_bytes(content_key.bytes(), recipient)
    }

    fn wrap_bytes(plaintext: &[u8], recipient: &PublicKey) -> Result<Self, KeyError> {
        let max = max_wrap_len(recipient);
        if plaintext.len() > max {
            return Err(KeyError::PlaintextTooLarge {
                len: plaintext.len(),
                max,
            });
        }
        recipient
            .inner()
            .encrypt(&mut OsRng, oaep(), plaintext)
            .map(WrappedKey)
            .map_err(|e| KeyError::Encoding(e.to_string()))
    }

    /// Wrap a content key for a recipient given as PEM text
    pub fn wrap_for_pem(content_key: &ContentKey, recipient_pem: &str) -> Result<Self, KeyError> {
        let recipient = PublicKey::from_pem(recipient_pem)?;
        Self::wrap(content_key, &recipient)
    }

    /// Recover the content key with the recipient's private key
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Decryption`] if the private key does not match
    ///  the key used to wrap, or the wrapped bytes were altered.
    pub fn recover(&self, private: &PrivateKey) -> Result<ContentKey, KeyError> {
        let mut unwrapped = private
            .inner()
            .decrypt(oaep(), &self.0)
            .map_err(|_| KeyError::Decryption)?;

        let result = if unwrapped.len() == CONTENT_KEY_SIZE {
            ContentKey::from_slice(&unwrapped).map_err(|_| KeyError::Decryption)
        } else {
            Err(KeyError::Decryption)
        };
        zeroize::Zeroize::zeroize(&mut unwrapped);
        result
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn from_base64(text: &str) -> Result<Self, KeyError> {
        BASE64
            .decode(text.trim())
            .map(WrappedKey)
            .map_err(|e| KeyError::InvalidWrappedKey(e.to_string()))
    }

    /// Get a reference to the raw ciphertext
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for WrappedKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for WrappedKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        WrappedKey::from_base64(&text).map_err(serde::de::Error::custom)
    }
}
