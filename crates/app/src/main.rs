mod args;
mod logging;
mod op;
mod ops;
mod state;
mod version;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Decrypt, Encrypt, Fingerprint, Fl, Init, Keygen, Version};
use state::AppConfig;

command_enum! {
    (Init, Init),
    (Keygen, Keygen),
    (Encrypt, Encrypt),
    (Decrypt, Decrypt),
    (Fingerprint, Fingerprint),
    (Fl, Fl),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // an uninitialized state directory is fine, `init` is what creates it
    let config = match AppConfig::load_or_default(args.config_path.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let guards = logging::init_logging(&config);
    tracing::debug!(build = %version::build_info(), "starting");

    let ctx = op::OpContext::new(args.config_path);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {}", e);
            drop(guards);
            std::process::exit(1);
        }
    }
}
