//! Cryptographic primitives for vaultshare
//!
//! This module provides the hybrid encryption scheme that every shared file
//! goes through:
//!
//! - **Identity**: RSA-2048 key pairs ([`KeyPair`]) owned by each user
//! - **Encryption**: AES-256-GCM under a one-time [`ContentKey`] per file
//! - **Key Sharing**: RSA-OAEP wrapping of the content key per recipient
//!
//! # Security Model
//!
//! ## Key Pairs
//! Each user generates a key pair on their own device. The public half is
//! published to a key directory; the private half never leaves its owner
//! and is never logged.
//!
//! ## Content Encryption
//! Every file gets its own [`ContentKey`] and is stored as an [`Envelope`]
//! (`iv || ciphertext || tag`). The IV is drawn fresh for every encryption.
//!
//! ## Key Sharing Protocol
//! To give a recipient access to a file:
//! 1. The owner recovers the file's content key from their own [`WrappedKey`]
//! 2. Looks up the recipient's [`PublicKey`]
//! 3. Wraps the content key under it with OAEP (SHA-256)
//! 4. Hands only the new [`WrappedKey`] to the server
//!
//! The recipient recovers the content key with their private key and
//! authenticates and decrypts the envelope locally.

mod envelope;
mod keys;
mod secret;
mod wrapped_key;

pub use envelope::{CipherSuite, Envelope, EnvelopeError, IV_SIZE, MIN_ENVELOPE_SIZE, TAG_SIZE};
pub use keys::{
    KeyError, KeyPair, PrivateKey, PublicKey, PEM_LINE_WIDTH, PRIVATE_KEY_PEM_TAG,
    PUBLIC_KEY_PEM_TAG, RSA_KEY_BITS,
};
pub use secret::{ContentKey, SecretError, CONTENT_KEY_SIZE};
pub use wrapped_key::{max_wrap_len, WrappedKey};
