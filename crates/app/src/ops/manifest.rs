use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use common::crypto::{CipherSuite, WrappedKey};
use serde::{Deserialize, Serialize};

/// Extension given to envelope files
pub const ENVELOPE_EXTENSION: &str = "vsenc";
/// Suffix of the wrapped-key sidecar written next to an envelope
pub const MANIFEST_SUFFIX: &str = ".keys.json";

/// The content key of one envelope, wrapped once per recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyManifest {
    pub filename: String,
    pub cipher_suite: CipherSuite,
    pub created_at: DateTime<Utc>,
    pub recipients: Vec<RecipientKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientKey {
    /// Fingerprint of the recipient's public key
    pub fingerprint: String,
    pub wrapped_key: WrappedKey,
}

impl KeyManifest {
    pub fn key_for(&self, fingerprint: &str) -> Option<&WrappedKey> {
        self.recipients
            .iter()
            .find(|r| r.fingerprint == fingerprint)
            .map(|r| &r.wrapped_key)
    }

    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed key manifest: {0}")]
    Json(#[from] serde_json::Error),
}

/// `secret.txt` -> `secret.txt.vsenc`
pub fn envelope_path_for(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(".");
    name.push(ENVELOPE_EXTENSION);
    PathBuf::from(name)
}

/// `secret.txt.vsenc` -> `secret.txt.vsenc.keys.json`
pub fn manifest_path_for(envelope: &Path) -> PathBuf {
    let mut name = envelope.as_os_str().to_os_string();
    name.push(MANIFEST_SUFFIX);
    PathBuf::from(name)
}

/// `secret.txt.vsenc` -> `secret.txt`, anything else gets `.dec` appended
pub fn plaintext_path_for(envelope: &Path) -> PathBuf {
    match envelope.extension() {
        Some(ext) if ext == ENVELOPE_EXTENSION => envelope.with_extension(""),
        _ => {
            let mut name = envelope.as_os_str().to_os_string();
            name.push(".dec");
            PathBuf::from(name)
        }
    }
}
