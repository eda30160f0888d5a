//! End-to-end encrypted file sharing
//!
//! Two halves:
//!
//! - [`ShareRegistry`]: the server side. Keeps [`FileRecord`]s, stores
//!   envelopes in a [`BlobStore`], and enforces who may fetch which
//!   wrapped key. It never holds a content key or a private key.
//! - [`Session`]: one principal's client. Generates content keys, encrypts,
//!   wraps keys for recipients and decrypts downloads.
//!
//! Public keys come from a [`KeyDirectory`]. In-memory implementations of
//!  both collaborators are provided for tests and tooling.

mod memory;
mod provider;
mod record;
mod registry;
mod session;

pub use memory::{MemoryBlobStore, MemoryKeyDirectory};
pub use provider::{BlobRef, BlobStore, BlobStoreError, DirectoryError, KeyDirectory};
pub use record::{
    FileId, FileRecord, FileSummary, Identity, ShareEdge, SharedFileSummary, SharedWith,
};
pub use registry::{Download, Grant, Revocation, ShareError, ShareRegistry, Upload};
pub use session::{DecryptedFile, Session};
