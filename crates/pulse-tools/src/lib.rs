// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Tool execution and approval contracts for the agentic tool-calling loop.
//! This crate defines interfaces only — concrete tools, and the storage
//! backing approval decisions, live outside the loop.

pub mod approval;
pub mod descriptor;
pub mod executor;
pub mod tool;

pub use approval::{ApprovalRecord, ApprovalStatus, ApprovalStore};
pub use descriptor::ToolDescriptor;
pub use executor::{ToolContext, ToolExecutor};
pub use tool::ToolOutput;
