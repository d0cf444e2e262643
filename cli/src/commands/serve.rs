// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `majordomo serve` - run the orchestrator façade.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use majordomo_core::infrastructure::config::CoreConfig;
use majordomo_core::infrastructure::confirmation::BrokerMode;
use majordomo_core::runtime::OrchestratorRuntime;

use crate::prompt::TerminalPrompt;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Auto-approve every confirmation (development only)
    #[arg(long)]
    pub dev: bool,

    /// Ask confirmations on this terminal instead of the HTTP channel
    #[arg(long, conflicts_with = "dev")]
    pub interactive: bool,
}

impl ServeArgs {
    pub async fn run(self, host: String, port: u16) -> Result<()> {
        let mut config = CoreConfig::from_env();
        config.host = host;
        config.port = port;
        if self.dev {
            config.dev_mode = true;
        }

        if config.dev_mode {
            eprintln!(
                "{}",
                "WARNING: dev mode enabled - confirmations are auto-approved"
                    .red()
                    .bold()
            );
        }

        let broker_mode = if config.dev_mode {
            Some(BrokerMode::AutoApprove)
        } else if self.interactive {
            Some(BrokerMode::Interactive(Arc::new(TerminalPrompt)))
        } else {
            None
        };

        let runtime = OrchestratorRuntime::bootstrap(config, broker_mode).await?;
        runtime.serve().await
    }
}
