// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// The result of executing a single tool call.
///
/// `content` holds one or more text segments rather than a single string so
/// a tool can emit a list of discrete chunks (e.g. one per matched record)
/// without pre-joining them; the driver concatenates them when it needs a
/// single `result_text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Vec<String>,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: vec![content.into()],
            is_error: false,
        }
    }

    pub fn err(content: impl Into<String>) -> Self {
        Self {
            content: vec![content.into()],
            is_error: true,
        }
    }

    /// Flattened, newline-joined view used wherever a single string is needed
    /// (approval-prefix detection, auto-recovery inspection, compaction).
    pub fn as_text(&self) -> String {
        self.content.join("\n")
    }

    pub fn starts_with_approval_request(&self) -> bool {
        self.as_text().starts_with("APPROVAL_REQUIRED:")
    }
}
