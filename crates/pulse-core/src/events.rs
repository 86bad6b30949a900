// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde::Serialize;

/// An explore pre-pass's terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExploreOutcome {
    Success,
    Failed,
    SkippedNoModel,
    SkippedNoTools,
    SkippedConversational,
}

/// The explore pre-pass's full result, used both internally to build the
/// `<explore_context>` injection and externally as an `explore_status`
/// payload.
#[derive(Debug, Clone)]
pub struct ExplorePrepassResult {
    pub summary: String,
    pub model: Option<String>,
    pub outcome: ExploreOutcome,
    pub duration_ms: u64,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub error: Option<String>,
}

/// Caller-visible stream events. Content fields are JSON-encoded per event
/// when serialized for a wire transport; internal protocol text (nudges) is
/// never wrapped in one of these — see `driver`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    Content { text: String },
    Thinking { text: String },
    ToolStart { id: String, name: String, input: serde_json::Value },
    ToolEnd {
        id: String,
        name: String,
        input_display: String,
        raw_input: serde_json::Value,
        output: String,
        success: bool,
    },
    ApprovalNeeded {
        approval_id: String,
        tool_id: String,
        tool_name: String,
        command: String,
        target_host: Option<String>,
        risk: String,
        description: String,
    },
    ExploreStatus {
        phase: ExplorePhase,
        message: String,
        model: Option<String>,
        outcome: Option<ExploreOutcome>,
    },
    Error { message: String },
    Done { session_id: String, input_tokens: u32, output_tokens: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorePhase {
    Started,
    Completed,
    Failed,
    Skipped,
}

/// Sink the driver pushes [`LoopEvent`]s into as the turn progresses.
/// Implemented by `Vec<LoopEvent>` for tests and by a channel sender in
/// real callers.
pub trait EventSink: Send {
    fn emit(&mut self, event: LoopEvent);
}

impl EventSink for Vec<LoopEvent> {
    fn emit(&mut self, event: LoopEvent) {
        self.push(event);
    }
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<LoopEvent> {
    fn emit(&mut self, event: LoopEvent) {
        let _ = self.send(event);
    }
}
