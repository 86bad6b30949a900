// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message author, restricted to the two roles the core ever constructs
/// directly. Tool results are carried as `role: User` with a populated
/// `tool_result` field, matching provider conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique within the turn that produced it.
    pub id: String,
    pub name: String,
    /// Mapping from parameter name to a JSON-shaped value.
    pub input: serde_json::Value,
    /// Opaque provider-specific pass-through (e.g. extended-thinking
    /// signatures); forwarded verbatim on the next request, never inspected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

/// The result of executing one [`ToolCall`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Matches a [`ToolCall::id`] that appeared earlier in the sequence.
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

/// One entry in a conversation history.
///
/// Invariant: every [`ToolResult`] references a [`ToolCall::id`] that
/// appeared earlier in the sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Present only on assistant messages that requested tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Present only on user-role tool-result messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            reasoning: None,
            timestamp: Utc::now(),
            tool_calls: None,
            tool_result: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            reasoning: None,
            timestamp: Utc::now(),
            tool_calls: None,
            tool_result: None,
        }
    }

    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            reasoning: None,
            timestamp: Utc::now(),
            tool_calls: Some(tool_calls),
            tool_result: None,
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            role: Role::User,
            content: String::new(),
            reasoning: None,
            timestamp: Utc::now(),
            tool_calls: None,
            tool_result: Some(ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error,
            }),
        }
    }

    /// Approximate token count: 4 characters per token, the same heuristic
    /// used throughout the corpus for cheap budget bookkeeping.
    pub fn approx_tokens(&self) -> usize {
        let mut chars = self.content.len() + self.reasoning.as_ref().map(|r| r.len()).unwrap_or(0);
        if let Some(tc) = &self.tool_calls {
            for c in tc {
                chars += c.name.len() + c.input.to_string().len();
            }
        }
        if let Some(tr) = &self.tool_result {
            chars += tr.content.len();
        }
        chars.div_ceil(4).max(if chars == 0 { 0 } else { 1 })
    }

    pub fn is_tool_result(&self) -> bool {
        self.tool_result.is_some()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|v| !v.is_empty())
    }
}

/// JSON-schema description of one tool, as presented to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Forces or relaxes the model's use of tools on a given request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model may or may not call a tool.
    Auto,
    /// The model must not call a tool.
    None,
    /// The model must call some tool, unspecified which.
    Any,
    /// The model must call exactly the named tool.
    Specific(String),
}

/// A request sent to a [`crate::ModelProvider`].
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub system_prompt: String,
    pub tools: Vec<ToolSchema>,
    pub tool_choice: ToolChoice,
}

/// A single streamed event from the model, as forwarded from the provider
/// to the driver.
#[derive(Debug, Clone)]
pub enum ResponseEvent {
    Content(String),
    Thinking(String),
    ToolStart {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    Done {
        tool_calls: Vec<ToolCall>,
        input_tokens: u32,
        output_tokens: u32,
    },
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_has_no_tool_fields() {
        let m = Message::user("hi");
        assert!(m.tool_calls.is_none());
        assert!(m.tool_result.is_none());
    }

    #[test]
    fn tool_result_message_is_user_role() {
        let m = Message::tool_result("call_1", "ok", false);
        assert_eq!(m.role, Role::User);
        assert!(m.is_tool_result());
    }

    #[test]
    fn assistant_with_tool_calls_reports_has_tool_calls() {
        let m = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "c1".into(),
                name: "pulse_query".into(),
                input: serde_json::json!({}),
                thought_signature: None,
            }],
        );
        assert!(m.has_tool_calls());
    }

    #[test]
    fn approx_tokens_scales_with_content_length() {
        let short = Message::user("hi");
        let long = Message::user("a".repeat(400));
        assert!(long.approx_tokens() > short.approx_tokens());
    }

    #[test]
    fn approx_tokens_empty_message_is_zero() {
        let m = Message::user("");
        assert_eq!(m.approx_tokens(), 0);
    }

    #[test]
    fn approx_tokens_eight_chars_is_two_tokens() {
        let m = Message::user("12345678");
        assert_eq!(m.approx_tokens(), 2);
    }
}
