/**
 * Cryptographic types and operations.
 *  - RSA key pairs and PEM import/export
 *  - One-time AES-256-GCM content keys and envelopes
 *  - RSA-OAEP wrapping of content keys per recipient
 */
pub mod crypto;
/**
 * Federated averaging coordinator.
 *  Holds the global model, collects one update
 *  per client per round and aggregates them.
 */
pub mod federated;
/**
 * End-to-end encrypted file sharing.
 *  Server-side registry of files and share edges,
 *  and the client-side session that does all the
 *  key handling.
 */
pub mod sharing;

pub mod prelude {
    pub use crate::crypto::{ContentKey, Envelope, KeyPair, PrivateKey, PublicKey, WrappedKey};
    pub use crate::federated::{
        AggregationStrategy, ClientUpdate, Coordinator, CoordinatorError, FederatedSettings,
        GlobalModel,
    };
    pub use crate::sharing::{
        BlobStore, Identity, KeyDirectory, MemoryBlobStore, MemoryKeyDirectory, Session,
        ShareError, ShareRegistry,
    };
}
