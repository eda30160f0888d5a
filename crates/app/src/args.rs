pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vaultshare")]
#[command(about = "End-to-end encrypted file sharing and federated averaging")]
pub struct Args {
    /// Path to the vaultshare state directory (defaults to ~/.vaultshare)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
