use std::path::PathBuf;

use clap::Args;
use common::crypto::{KeyError, PublicKey};

use crate::state::{AppState, StateError};

/// Print the SHA-256 fingerprint of a public key
#[derive(Args, Debug, Clone)]
pub struct Fingerprint {
    /// Public key PEM file (defaults to this user's own key)
    pub path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("invalid public key: {0}")]
    Key(#[from] KeyError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Fingerprint {
    type Error = FingerprintError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let key = match &self.path {
            Some(path) => PublicKey::from_pem(&std::fs::read_to_string(path)?)?,
            None => AppState::load(ctx.config_path.clone())?
                .load_keys()?
                .public()
                .clone(),
        };
        Ok(format!("{} (RSA-{})", key.fingerprint(), key.bits()))
    }
}
