// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Rust SDK for the Majordomo orchestrator HTTP API.

mod client;
mod types;

pub use client::{MajordomoClient, SdkError};
pub use types::*;
