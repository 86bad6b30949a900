// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::error::CoreError;

const PENDING_RECOVERY_TTL_MINUTES: i64 = 10;

/// The phase of the discover-before-write-before-verify cycle a session is
/// currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmState {
    Resolving,
    Reading,
    Writing,
    Verifying,
}

/// What a tool call does, independent of which tool it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Resolve,
    Read,
    Write,
    UserInput,
}

pub(crate) const WRITE_VERBS: &[&str] = &[
    "start", "stop", "restart", "delete", "shutdown", "reboot", "write", "append", "update",
    "trigger", "resolve", "dismiss", "control",
];
const READ_VERBS: &[&str] = &[
    "get", "list", "search", "query", "read", "logs", "status", "health", "describe", "inspect",
    "show",
];

/// Classifies a tool call by name and, for multiplexed tools, by its
/// `action` input field. A pure function of its arguments (R2).
///
/// Tools that multiplex behavior through an `action` field are inspected
/// first; everything else falls back to a verb table, and names matching
/// neither table default to [`ToolKind::Write`] — unknown capabilities are
/// assumed unsafe until proven otherwise.
pub fn classify_tool_call(name: &str, input: &serde_json::Value) -> ToolKind {
    if name == "pulse_ask_user" {
        return ToolKind::UserInput;
    }

    if let Some(action) = input.get("action").and_then(|v| v.as_str()) {
        let action = action.to_ascii_lowercase();
        if READ_VERBS.iter().any(|v| action == *v) {
            return ToolKind::Read;
        }
        if WRITE_VERBS.iter().any(|v| action == *v) {
            return ToolKind::Write;
        }
    }

    let lower = name.to_ascii_lowercase();
    if lower.starts_with("pulse_query") || lower.contains("resolve") {
        return ToolKind::Resolve;
    }
    for verb in READ_VERBS {
        if lower.contains(verb) {
            return ToolKind::Read;
        }
    }
    for verb in WRITE_VERBS {
        if lower.contains(verb) {
            return ToolKind::Write;
        }
    }
    ToolKind::Write
}

#[derive(Debug, Clone)]
pub struct PendingRecovery {
    pub error_code: String,
    pub tool: String,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Per-session workflow state machine: Resolving -> Reading -> Writing ->
/// Verifying, with auto-verify collapsing Verifying back to Reading on a
/// successful write.
#[derive(Debug, Clone)]
pub struct SessionFsm {
    pub state: FsmState,
    pub wrote_this_episode: bool,
    pub read_after_write: bool,
    pub last_write_tool: Option<String>,
    pub last_write_at: Option<DateTime<Utc>>,
    pub last_read_tool: Option<String>,
    pub last_read_at: Option<DateTime<Utc>>,
    pending_recoveries: HashMap<String, PendingRecovery>,
    next_recovery_seq: u64,
}

impl Default for SessionFsm {
    fn default() -> Self {
        Self {
            state: FsmState::Resolving,
            wrote_this_episode: false,
            read_after_write: false,
            last_write_tool: None,
            last_write_at: None,
            last_read_tool: None,
            last_read_at: None,
            pending_recoveries: HashMap::new(),
            next_recovery_seq: 0,
        }
    }
}

impl SessionFsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_execute_tool(&self, kind: ToolKind, _name: &str) -> Result<(), CoreError> {
        match (self.state, kind) {
            (FsmState::Resolving, ToolKind::Write) => Err(CoreError::FsmBlocked {
                message: "discover before write".into(),
            }),
            (FsmState::Verifying, ToolKind::Write) => Err(CoreError::FsmBlocked {
                message: "verify previous write first".into(),
            }),
            _ => Ok(()),
        }
    }

    pub fn can_final_answer(&self) -> Result<(), CoreError> {
        if self.state == FsmState::Verifying && !self.read_after_write {
            return Err(CoreError::FsmBlocked {
                message: format!(
                    "verify the write before final answer: perform a read or status check on {}",
                    self.last_write_tool.as_deref().unwrap_or("the written resource")
                ),
            });
        }
        Ok(())
    }

    pub fn on_tool_success(&mut self, kind: ToolKind, name: &str) {
        let now = Utc::now();
        match kind {
            ToolKind::Resolve | ToolKind::Read => {
                if self.state == FsmState::Resolving {
                    self.state = FsmState::Reading;
                }
                self.last_read_tool = Some(name.to_string());
                self.last_read_at = Some(now);
                if self.state == FsmState::Verifying {
                    self.read_after_write = true;
                }
            }
            ToolKind::Write => {
                self.state = FsmState::Verifying;
                self.wrote_this_episode = true;
                self.read_after_write = false;
                self.last_write_tool = Some(name.to_string());
                self.last_write_at = Some(now);
            }
            ToolKind::UserInput => {}
        }
    }

    pub fn complete_verification(&mut self) {
        if self.state == FsmState::Verifying && self.read_after_write {
            self.state = FsmState::Reading;
            self.read_after_write = false;
        }
    }

    /// The control tool's own success is treated as its verification —
    /// re-reading cached state here would read stale data and loop the model.
    pub fn auto_verify(&mut self) {
        self.on_tool_success(ToolKind::Read, "auto_verify");
        self.complete_verification();
    }

    pub fn track_pending_recovery(&mut self, error_code: impl Into<String>, tool: impl Into<String>) -> String {
        self.gc_pending_recoveries();
        self.next_recovery_seq += 1;
        let id = format!("rec-{}", self.next_recovery_seq);
        self.pending_recoveries.insert(
            id.clone(),
            PendingRecovery {
                error_code: error_code.into(),
                tool: tool.into(),
                created_at: Utc::now(),
                attempts: 0,
            },
        );
        id
    }

    pub fn check_recovery_success(&mut self, tool: &str) -> Option<PendingRecovery> {
        self.gc_pending_recoveries();
        let id = self
            .pending_recoveries
            .iter()
            .find(|(_, r)| r.tool == tool)
            .map(|(id, _)| id.clone())?;
        self.pending_recoveries.remove(&id)
    }

    fn gc_pending_recoveries(&mut self) {
        let horizon = Utc::now() - Duration::minutes(PENDING_RECOVERY_TTL_MINUTES);
        self.pending_recoveries.retain(|_, r| r.created_at > horizon);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Demotes Verifying back to Reading but preserves discovered state.
    pub fn reset_keep_progress(&mut self) {
        if self.state == FsmState::Verifying {
            self.state = FsmState::Reading;
        }
        self.read_after_write = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_falls_back_to_write_for_unknown_tool() {
        assert_eq!(classify_tool_call("frobnicate", &serde_json::json!({})), ToolKind::Write);
    }

    #[test]
    fn classify_matches_read_verb_in_name() {
        assert_eq!(classify_tool_call("pulse_list_vms", &serde_json::json!({})), ToolKind::Read);
    }

    #[test]
    fn classify_matches_write_verb_in_name() {
        assert_eq!(classify_tool_call("pulse_control", &serde_json::json!({"action":"restart"})), ToolKind::Write);
    }

    #[test]
    fn classify_inspects_action_field_for_multiplexed_tools() {
        let read = classify_tool_call("file_edit", &serde_json::json!({"action": "read"}));
        let write = classify_tool_call("file_edit", &serde_json::json!({"action": "write"}));
        assert_eq!(read, ToolKind::Read);
        assert_eq!(write, ToolKind::Write);
    }

    #[test]
    fn classify_is_pure_function_of_name_and_input() {
        let input = serde_json::json!({"query": "vm 101"});
        assert_eq!(classify_tool_call("pulse_query", &input), classify_tool_call("pulse_query", &input));
    }

    #[test]
    fn write_blocked_while_resolving() {
        let fsm = SessionFsm::new();
        assert!(fsm.can_execute_tool(ToolKind::Write, "pulse_control").is_err());
    }

    #[test]
    fn write_blocked_while_verifying() {
        let mut fsm = SessionFsm::new();
        fsm.on_tool_success(ToolKind::Read, "pulse_query");
        fsm.on_tool_success(ToolKind::Write, "pulse_control");
        assert_eq!(fsm.state, FsmState::Verifying);
        assert!(fsm.can_execute_tool(ToolKind::Write, "pulse_control").is_err());
    }

    #[test]
    fn read_allowed_in_every_state() {
        let mut fsm = SessionFsm::new();
        assert!(fsm.can_execute_tool(ToolKind::Read, "pulse_query").is_ok());
        fsm.on_tool_success(ToolKind::Write, "pulse_control");
        assert!(fsm.can_execute_tool(ToolKind::Read, "pulse_query").is_ok());
    }

    #[test]
    fn final_answer_blocked_in_verifying_without_read_after_write() {
        let mut fsm = SessionFsm::new();
        fsm.on_tool_success(ToolKind::Read, "pulse_query");
        fsm.on_tool_success(ToolKind::Write, "pulse_control");
        assert!(fsm.can_final_answer().is_err());
    }

    #[test]
    fn auto_verify_clears_final_answer_block() {
        let mut fsm = SessionFsm::new();
        fsm.on_tool_success(ToolKind::Read, "pulse_query");
        fsm.on_tool_success(ToolKind::Write, "pulse_control");
        fsm.auto_verify();
        assert!(fsm.can_final_answer().is_ok());
        assert_eq!(fsm.state, FsmState::Reading);
    }

    #[test]
    fn writing_implies_wrote_this_episode() {
        let mut fsm = SessionFsm::new();
        fsm.on_tool_success(ToolKind::Write, "pulse_control");
        assert!(fsm.wrote_this_episode);
        assert_eq!(fsm.state, FsmState::Verifying);
    }

    #[test]
    fn pending_recovery_round_trips() {
        let mut fsm = SessionFsm::new();
        let id = fsm.track_pending_recovery("E1", "pulse_control");
        assert!(fsm.check_recovery_success("pulse_control").is_some());
        assert!(fsm.check_recovery_success("pulse_control").is_none());
        let _ = id;
    }

    #[test]
    fn reset_keep_progress_demotes_verifying_to_reading() {
        let mut fsm = SessionFsm::new();
        fsm.on_tool_success(ToolKind::Write, "pulse_control");
        fsm.reset_keep_progress();
        assert_eq!(fsm.state, FsmState::Reading);
    }

    #[test]
    fn reset_restores_default_state() {
        let mut fsm = SessionFsm::new();
        fsm.on_tool_success(ToolKind::Write, "pulse_control");
        fsm.reset();
        assert_eq!(fsm.state, FsmState::Resolving);
        assert!(!fsm.wrote_this_episode);
    }
}
