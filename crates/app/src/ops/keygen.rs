use std::path::PathBuf;

use clap::Args;
use common::crypto::{KeyError, KeyPair};

use crate::state::{write_key_pair, StateError};

/// Generate a standalone key pair, e.g. for a recipient without a state directory
#[derive(Args, Debug, Clone)]
pub struct Keygen {
    /// Directory to write the key files into
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Base name of the key files: <name>.pem and <name>.pub.pem
    #[arg(long, default_value = "key")]
    pub name: String,

    /// Overwrite existing key files
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum KeygenError {
    #[error("refusing to overwrite {0}, pass --force to replace it")]
    Exists(PathBuf),
    #[error("key generation failed: {0}")]
    Key(#[from] KeyError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Keygen {
    type Error = KeygenError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let private_path = self.out_dir.join(format!("{}.pem", self.name));
        let public_path = self.out_dir.join(format!("{}.pub.pem", self.name));
        if !self.force {
            for path in [&private_path, &public_path] {
                if path.exists() {
                    return Err(KeygenError::Exists(path.clone()));
                }
            }
        }

        std::fs::create_dir_all(&self.out_dir)?;
        let keys = KeyPair::generate()?;
        write_key_pair(&keys, &private_path, &public_path)?;

        Ok(format!(
            "Generated RSA-{} key pair\n\
             - Private key: {}\n\
             - Public key: {}\n\
             - Fingerprint: {}",
            keys.public().bits(),
            private_path.display(),
            public_path.display(),
            keys.public().fingerprint()
        ))
    }
}
