// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Client subcommands: talk to a running orchestrator over HTTP.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use majordomo_sdk::MajordomoClient;

#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    /// Send an utterance to the assistant
    Command {
        /// The text of the command
        text: String,

        /// Principal the command runs as
        #[arg(short, long, default_value = "default")]
        user: String,
    },

    /// Show orchestrator and worker health
    Health,

    /// List pending confirmation requests
    Pending,

    /// Approve or reject a pending confirmation
    Confirm {
        /// Request id from `majordomo pending`
        id: Uuid,

        /// Reject instead of approving
        #[arg(long)]
        reject: bool,
    },

    /// Show or clear a user's conversation context
    Context {
        /// Principal whose session to inspect
        user: String,

        /// Clear the session instead of showing it
        #[arg(long)]
        clear: bool,
    },

    /// Show recent audit entries
    Audit {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

impl ClientCommand {
    pub async fn run(self, base_url: &str) -> Result<()> {
        let client = MajordomoClient::new(base_url);

        match self {
            ClientCommand::Command { text, user } => {
                let response = client
                    .command(&text, Some(&user))
                    .await
                    .context("sending command")?;

                if response.success {
                    println!("{} {}", "✓".green(), response.message);
                } else {
                    println!("{} {}", "✗".red(), response.message);
                }
                if !response.actions_taken.is_empty() {
                    println!(
                        "{} {}",
                        "actions:".dimmed(),
                        response.actions_taken.join(", ")
                    );
                }
            }

            ClientCommand::Health => {
                let health = client.health().await.context("fetching health")?;
                let badge = if health.status == "healthy" {
                    health.status.green()
                } else {
                    health.status.yellow()
                };
                println!("status: {}", badge);
                let mut services: Vec<_> = health.services.into_iter().collect();
                services.sort();
                for (name, healthy) in services {
                    let mark = if healthy { "✓".green() } else { "✗".red() };
                    println!("  {} {}", mark, name);
                }
            }

            ClientCommand::Pending => {
                let pending = client.pending().await.context("fetching pending")?;
                if pending.is_empty() {
                    println!("No pending confirmations.");
                }
                for request in pending {
                    println!(
                        "{} {} (risk: {}) expires {}",
                        request.id.to_string().cyan(),
                        request.arguments,
                        request.risk.yellow(),
                        request.expires_at
                    );
                }
            }

            ClientCommand::Confirm { id, reject } => {
                client
                    .confirm(id, !reject)
                    .await
                    .context("resolving confirmation")?;
                let verdict = if reject { "rejected".red() } else { "approved".green() };
                println!("{} {}", id, verdict);
            }

            ClientCommand::Context { user, clear } => {
                if clear {
                    client.clear_context(&user).await.context("clearing context")?;
                    println!("Context cleared for {}", user);
                } else {
                    let context = client.context(&user).await.context("fetching context")?;
                    println!("{}", serde_json::to_string_pretty(&context)?);
                }
            }

            ClientCommand::Audit { limit } => {
                let audit = client.audit(limit).await.context("fetching audit")?;
                let entries = audit["entries"].as_array().cloned().unwrap_or_default();
                for entry in &entries {
                    println!(
                        "{} {} {} [{}] {}",
                        entry["ts"].as_str().unwrap_or("-").dimmed(),
                        entry["principal"].as_str().unwrap_or("-"),
                        entry["tool_name"].as_str().unwrap_or("-"),
                        entry["risk"].as_str().unwrap_or("-").yellow(),
                        entry["status"].as_str().unwrap_or("-")
                    );
                }
            }
        }
        Ok(())
    }
}
