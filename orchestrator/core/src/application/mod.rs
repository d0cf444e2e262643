// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_loop;
pub mod dispatcher;
pub mod invocation;

pub use agent_loop::{AgentLoop, AgentStatsSnapshot, RunOutcome, RunStatus};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use invocation::InvocationPipeline;
