use std::path::PathBuf;

use clap::Args;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Default log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Directory for daily-rolling log files (optional, no file logging if unset)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            log_level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
            ..Default::default()
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        let fingerprint = state.load_keys()?.public().fingerprint();

        let log_dir = match &state.config.log_dir {
            Some(dir) => dir.display().to_string(),
            None => "disabled".to_string(),
        };

        let output = format!(
            "Initialized vaultshare directory at: {}\n\
             - Private key: {}\n\
             - Public key: {}\n\
             - Fingerprint: {}\n\
             - Config: {}\n\
             - Log level: {}\n\
             - Log directory: {}",
            state.state_dir.display(),
            state.key_path.display(),
            state.public_key_path.display(),
            fingerprint,
            state.config_path.display(),
            state.config.log_level,
            log_dir
        );

        Ok(output)
    }
}
