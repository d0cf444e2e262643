// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Terminal-backed confirmation prompt for `serve --interactive`.

use async_trait::async_trait;
use colored::Colorize;

use majordomo_core::infrastructure::confirmation::{PendingConfirmation, PromptSource};

/// Asks the operator on the attached terminal. The broker enforces the
/// timeout around the call; an I/O failure counts as a refusal.
pub struct TerminalPrompt;

#[async_trait]
impl PromptSource for TerminalPrompt {
    async fn ask(&self, request: &PendingConfirmation) -> bool {
        let risk = format!("{:?}", request.risk).to_lowercase();
        let question = format!(
            "{} {} (risk: {}): {}",
            "Confirm".yellow().bold(),
            request.arguments,
            risk,
            request.reason
        );

        tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new()
                .with_prompt(question)
                .default(false)
                .interact()
                .unwrap_or(false)
        })
        .await
        .unwrap_or(false)
    }
}
