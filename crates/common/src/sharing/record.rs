//! # File records
//!
//! A [`FileRecord`] is the server's view of one uploaded file: who owns it,
//! where its envelope lives in the blob store, and one [`ShareEdge`] per
//! recipient. The server never sees a content key, only [`WrappedKey`]s.
//!
//! ## Edge lifecycle
//!
//! ```text
//! ABSENT --grant--> SHARED --revoke--> ABSENT
//!                   SHARED --grant--> SHARED   (wrapped key replaced)
//! ```
//!
//! Revoking an edge stops the recipient from fetching the wrapped key again.
//! It cannot take back a content key the recipient already recovered.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{CipherSuite, WrappedKey};

use super::provider::BlobRef;

/// Identifier of a stored file
pub type FileId = Uuid;

/// An authenticated user, as supplied by the identity provider
///
/// The core trusts this value; authentication happens before it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: u64,
    pub username: String,
}

impl Identity {
    pub fn new(user_id: u64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.username, self.user_id)
    }
}

/// A grant linking one file to one recipient through a wrapped key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareEdge {
    pub file_id: FileId,
    pub recipient: String,
    pub wrapped_key: WrappedKey,
    pub shared_at: DateTime<Utc>,
}

/// Server-side metadata for an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub owner: Identity,
    pub filename: String,
    pub content_type: Option<String>,
    /// Size of the stored envelope in bytes
    pub size_bytes: usize,
    pub blob_ref: BlobRef,
    /// The content key wrapped for the owner, so the owner can
    ///  download and re-share without keeping the key around
    pub owner_key: WrappedKey,
    pub cipher_suite: CipherSuite,
    pub uploaded_at: DateTime<Utc>,
    /// Edges keyed by recipient username; at most one per recipient
    pub edges: BTreeMap<String, ShareEdge>,
}

impl FileRecord {
    pub fn is_owner(&self, identity: &Identity) -> bool {
        self.owner.user_id == identity.user_id
    }

    pub fn edge(&self, username: &str) -> Option<&ShareEdge> {
        self.edges.get(username)
    }

    /// Insert or replace the edge for `recipient`.
    ///  Returns the edge that was replaced, if any.
    pub fn put_edge(&mut self, recipient: &str, wrapped_key: WrappedKey) -> Option<ShareEdge> {
        let edge = ShareEdge {
            file_id: self.id,
            recipient: recipient.to_string(),
            wrapped_key,
            shared_at: Utc::now(),
        };
        self.edges.insert(recipient.to_string(), edge)
    }

    pub fn remove_edge(&mut self, recipient: &str) -> Option<ShareEdge> {
        self.edges.remove(recipient)
    }

    pub fn summary(&self) -> FileSummary {
        FileSummary {
            id: self.id,
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            size_bytes: self.size_bytes,
            uploaded_at: self.uploaded_at,
            shared_with: self
                .edges
                .values()
                .map(|edge| SharedWith {
                    username: edge.recipient.clone(),
                    shared_at: edge.shared_at,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedWith {
    pub username: String,
    pub shared_at: DateTime<Utc>,
}

/// Listing entry for a file, as seen by its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: FileId,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: usize,
    pub uploaded_at: DateTime<Utc>,
    pub shared_with: Vec<SharedWith>,
}

/// Listing entry for a file, as seen by a recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFileSummary {
    pub id: FileId,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: usize,
    pub shared_by: String,
    pub shared_at: DateTime<Utc>,
}
