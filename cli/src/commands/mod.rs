// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod client;
pub mod serve;

pub use client::ClientCommand;
pub use serve::ServeArgs;
