// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Majordomo CLI
//!
//! The `majordomo` binary runs the orchestrator daemon and doubles as an
//! HTTP client for it.
//!
//! ## Commands
//!
//! - `majordomo serve [--dev | --interactive]` - run the orchestrator
//! - `majordomo command "<text>"` - send an utterance
//! - `majordomo health | pending | confirm <id> | context <user> | audit`

use anyhow::Result;
use clap::{Parser, Subcommand};

use majordomo_orchestrator::commands::{ClientCommand, ServeArgs};

/// Majordomo - personal assistant orchestrator
#[derive(Parser)]
#[command(name = "majordomo")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// HTTP API host
    #[arg(long, global = true, env = "MAJORDOMO_HOST", default_value = "127.0.0.1")]
    host: String,

    /// HTTP API port
    #[arg(long, global = true, env = "MAJORDOMO_PORT", default_value = "5000")]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator daemon
    Serve(ServeArgs),

    #[command(flatten)]
    Client(ClientCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let base_url = format!("http://{}:{}", cli.host, cli.port);

    match cli.command {
        Commands::Serve(args) => args.run(cli.host, cli.port).await,
        Commands::Client(command) => command.run(&base_url).await,
    }
}
