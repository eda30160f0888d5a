use std::fs;
use std::io;
use std::path::PathBuf;

use clap::Args;
use common::crypto::{KeyError, SecretError};

use super::manifest::{manifest_path_for, plaintext_path_for, KeyManifest, ManifestError};
use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Decrypt {
    /// Envelope to decrypt
    pub input: PathBuf,

    /// Wrapped-key manifest (defaults to <input>.keys.json)
    #[arg(long)]
    pub keys: Option<PathBuf>,

    /// Where to write the plaintext (defaults to <input> without .vsenc)
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("this file was not shared with key {0}")]
    NotARecipient(String),
    #[error("could not recover the content key: {0}")]
    Key(#[from] KeyError),
    #[error("decryption failed: {0}")]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Decrypt {
    type Error = DecryptError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let keys = state.load_keys()?;
        let fingerprint = keys.public().fingerprint();

        let manifest_path = self
            .keys
            .clone()
            .unwrap_or_else(|| manifest_path_for(&self.input));
        let manifest = KeyManifest::read(&manifest_path)?;
        let wrapped = manifest
            .key_for(&fingerprint)
            .ok_or_else(|| DecryptError::NotARecipient(fingerprint.clone()))?;
        let content_key = wrapped.recover(keys.private())?;

        // nothing is written unless the whole envelope authenticates
        let mut plaintext = content_key.decrypt_reader(fs::File::open(&self.input)?)?;
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| plaintext_path_for(&self.input));
        let mut file = fs::File::create(&output)?;
        let size = io::copy(&mut plaintext, &mut file)?;

        tracing::info!(
            input = %self.input.display(),
            filename = %manifest.filename,
            cipher_suite = %manifest.cipher_suite,
            "decrypted file"
        );

        Ok(format!(
            "Decrypted {} -> {} ({} bytes)",
            self.input.display(),
            output.display(),
            size
        ))
    }
}
