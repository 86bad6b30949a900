// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Provider-agnostic types for talking to a streaming chat-completion
//! backend. The crate never implements a concrete vendor client — only the
//! contract the core drives, plus a scriptable mock for tests.

mod provider;
mod types;

#[cfg(feature = "mock")]
pub mod mock;

pub use provider::{ModelProvider, ResponseStream};
pub use types::{
    CompletionRequest, Message, Role, ToolCall, ToolChoice, ToolResult, ToolSchema, ResponseEvent,
};
