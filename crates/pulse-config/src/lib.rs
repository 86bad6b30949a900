// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Configuration for the agentic tool-calling loop: a single [`LoopConfig`]
//! struct with sensible defaults, loadable from an optional YAML file and
//! overridable via environment variables.

mod env;
mod schema;

pub use env::{apply_env_overrides, load};
pub use schema::LoopConfig;
