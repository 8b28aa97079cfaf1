// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rill - real-time orchestration layer.
//!
//! Binary entry point: message ingestion, sequential routing, and event
//! streaming behind one gateway process.

mod serve;
mod shutdown;

use clap::{Parser, Subcommand};

/// Rill - real-time orchestration layer.
#[derive(Parser, Debug)]
#[command(name = "rill", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the rill gateway and routing pipeline.
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match rill_config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("rill: invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("rill serve: {e}");
                std::process::exit(1);
            }
        }
        None => {
            println!("rill: use --help for available commands");
        }
    }
}
