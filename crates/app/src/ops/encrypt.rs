use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::Utc;
use clap::Args;
use common::crypto::{CipherSuite, ContentKey, KeyError, PublicKey, SecretError, WrappedKey};

use super::manifest::{envelope_path_for, manifest_path_for, KeyManifest, ManifestError, RecipientKey};
use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Encrypt {
    /// File to encrypt
    pub input: PathBuf,

    /// Public key PEM of an additional recipient (repeatable)
    #[arg(long = "to", short = 't')]
    pub recipients: Vec<PathBuf>,

    /// Where to write the envelope (defaults to <input>.vsenc)
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("recipient key {path}: {source}")]
    Recipient {
        path: PathBuf,
        #[source]
        source: KeyError,
    },
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("encryption failed: {0}")]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Encrypt {
    type Error = EncryptError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let keys = state.load_keys()?;

        // owner first, then recipients, one entry per distinct key
        let mut recipients: BTreeMap<String, PublicKey> = BTreeMap::new();
        recipients.insert(keys.public().fingerprint(), keys.public().clone());
        for path in &self.recipients {
            let pem = fs::read_to_string(path)?;
            let key = PublicKey::from_pem(&pem).map_err(|source| EncryptError::Recipient {
                path: path.clone(),
                source,
            })?;
            recipients.entry(key.fingerprint()).or_insert(key);
        }

        let content_key = ContentKey::generate()?;
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| envelope_path_for(&self.input));

        let mut envelope = content_key.encrypt_reader(fs::File::open(&self.input)?)?;
        let mut file = fs::File::create(&output)?;
        let size = io::copy(&mut envelope, &mut file)?;

        let mut wrapped = Vec::with_capacity(recipients.len());
        for (fingerprint, key) in &recipients {
            wrapped.push(RecipientKey {
                fingerprint: fingerprint.clone(),
                wrapped_key: WrappedKey::wrap(&content_key, key)?,
            });
        }

        let filename = self
            .input
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let manifest = KeyManifest {
            filename,
            cipher_suite: CipherSuite::default(),
            created_at: Utc::now(),
            recipients: wrapped,
        };
        let manifest_path = manifest_path_for(&output);
        manifest.write(&manifest_path)?;

        tracing::info!(
            input = %self.input.display(),
            envelope_bytes = size,
            recipients = recipients.len(),
            "encrypted file"
        );

        Ok(format!(
            "Encrypted {} -> {} ({} bytes)\n\
             - Wrapped keys: {} ({} recipients)",
            self.input.display(),
            output.display(),
            size,
            manifest_path.display(),
            recipients.len()
        ))
    }
}
