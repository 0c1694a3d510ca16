// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use corral::config::Config;

#[derive(Parser)]
#[command(name = "corral", version, about = "Control-plane broker for browser-driving AI agents.")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    subcommand: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Attach an interactive terminal session to a running corral server.
    Attach(corral::attach::AttachArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.subcommand {
        Some(Commands::Attach(args)) => {
            std::process::exit(corral::attach::run(args).await);
        }
        None => {
            let config = cli.config;
            if let Err(e) = config.validate() {
                eprintln!("error: {e}");
                std::process::exit(2);
            }
            if let Err(e) = corral::run::run(config).await {
                error!("fatal: {e:#}");
                std::process::exit(1);
            }
        }
    }
}
