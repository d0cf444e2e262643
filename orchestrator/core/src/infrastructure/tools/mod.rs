// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Built-in tool families: filesystem, process execution, worker adapters.

pub mod exec;
pub mod fs;
pub mod remote;
