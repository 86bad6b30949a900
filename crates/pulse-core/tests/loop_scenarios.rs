// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end scenarios driven entirely through `pulse_core`'s public API —
//! wiring a scripted provider and a canned executor the way a real caller
//! would, rather than reaching into dispatch/driver internals directly.

use std::collections::HashMap;

use pulse_config::LoopConfig;
use pulse_core::{ensure_session, save_session, ExploreOutcome, ExplorePhase, LoopEvent, Session, TurnContext};
use pulse_model::mock::{MockProvider, ScriptedTurn};
use pulse_model::{ModelProvider, ResponseEvent, ToolCall};
use pulse_tools::approval::mock::InMemoryApprovalStore;
use pulse_tools::executor::mock::MockExecutor;
use pulse_tools::{ApprovalStatus, ToolDescriptor, ToolOutput};

fn cfg() -> LoopConfig {
    LoopConfig {
        explore_enabled: false,
        max_agentic_turns: 6,
        ..LoopConfig::default()
    }
}

fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new("pulse_query", "resolves a resource", serde_json::json!({})),
        ToolDescriptor::new("pulse_control", "performs a write action", serde_json::json!({})),
        ToolDescriptor::new("pulse_status_check", "reads current status", serde_json::json!({})),
    ]
}

fn tool_call(id: &str, name: &str, input: serde_json::Value) -> ToolCall {
    ToolCall { id: id.into(), name: name.into(), input, thought_signature: None }
}

/// Scenario 1 from the driver's literal walk-through: discover, write,
/// auto-verify, answer — with the resulting session round-tripped through
/// disk to cover the serialize/reload property.
#[tokio::test]
async fn discover_then_write_round_trips_through_disk() {
    let mut session = Session::new("s1");
    let mut responses = HashMap::new();
    responses.insert("pulse_query".to_string(), ToolOutput::ok(r#"{"id":"vm:101","status":"running"}"#));
    responses.insert("pulse_control".to_string(), ToolOutput::ok(r#"{"id":"vm:101","status":"restarted"}"#));
    let exec = MockExecutor::new(descriptors(), responses);

    let turns: Vec<ScriptedTurn> = vec![
        vec![ResponseEvent::Done {
            tool_calls: vec![tool_call("c1", "pulse_query", serde_json::json!({"query": "vm 101"}))],
            input_tokens: 10,
            output_tokens: 5,
        }],
        vec![ResponseEvent::Done {
            tool_calls: vec![tool_call("c2", "pulse_control", serde_json::json!({"action": "restart", "target_host": "vm-101"}))],
            input_tokens: 10,
            output_tokens: 5,
        }],
        vec![
            ResponseEvent::Content("Restarted vm-101 successfully.".into()),
            ResponseEvent::Done { tool_calls: vec![], input_tokens: 10, output_tokens: 5 },
        ],
    ];
    let provider = MockProvider::new("mock", turns);
    let store = InMemoryApprovalStore::new();
    let ctx = TurnContext { provider: &provider, executor: &exec, approval_store: &store, explore_providers: &[], abort: None };
    let mut sink: Vec<LoopEvent> = Vec::new();

    let outcome = pulse_core::run_turn(&mut session, "restart vm 101".into(), &ctx, &cfg(), &mut sink).await.unwrap();

    assert_eq!(outcome.final_text, "Restarted vm-101 successfully.");
    assert!(session.fsm.wrote_this_episode);
    assert!(session.fsm.can_final_answer().is_ok());

    let dir = tempfile::tempdir().unwrap();
    save_session(dir.path(), &session.record).unwrap();
    let reloaded = ensure_session(dir.path(), "s1").unwrap();
    assert_eq!(reloaded.messages.len(), session.record.messages.len());
    for (a, b) in reloaded.messages.iter().zip(session.record.messages.iter()) {
        assert_eq!(a.content, b.content);
        assert_eq!(a.role, b.role);
    }
}

/// Scenario 2: a read-only question should never push the FSM into Writing.
#[tokio::test]
async fn read_only_request_never_enters_writing_state() {
    let mut session = Session::new("s1");
    let mut responses = HashMap::new();
    responses.insert("pulse_status_check".to_string(), ToolOutput::ok(r#"{"id":"homepage-docker","cpu":42}"#));
    let exec = MockExecutor::new(
        vec![ToolDescriptor::new("pulse_status_check", "reads cpu/status", serde_json::json!({}))],
        responses,
    );

    let turns: Vec<ScriptedTurn> = vec![
        vec![ResponseEvent::Done {
            tool_calls: vec![tool_call("c1", "pulse_status_check", serde_json::json!({"host": "homepage-docker"}))],
            input_tokens: 5,
            output_tokens: 5,
        }],
        vec![
            ResponseEvent::Content("CPU on homepage-docker is 42%.".into()),
            ResponseEvent::Done { tool_calls: vec![], input_tokens: 5, output_tokens: 5 },
        ],
    ];
    let provider = MockProvider::new("mock", turns);
    let store = InMemoryApprovalStore::new();
    let ctx = TurnContext { provider: &provider, executor: &exec, approval_store: &store, explore_providers: &[], abort: None };
    let mut sink: Vec<LoopEvent> = Vec::new();

    let outcome = pulse_core::run_turn(&mut session, "what's the CPU on @homepage-docker?".into(), &ctx, &cfg(), &mut sink).await.unwrap();

    assert!(outcome.final_text.contains("42%"));
    assert!(!session.fsm.wrote_this_episode);
    assert!(matches!(session.fsm.state, pulse_core::FsmState::Reading));
}

/// Scenario 3: the fourth identical call within one turn is loop-detected
/// and the next turn is forced text-only.
#[tokio::test]
async fn fourth_identical_call_in_one_turn_forces_text_only_next_turn() {
    let mut session = Session::new("s1");
    let mut responses = HashMap::new();
    responses.insert("pulse_query".to_string(), ToolOutput::ok(r#"{"id":"x","status":"unknown"}"#));
    let exec = MockExecutor::new(descriptors(), responses);

    let same_call = serde_json::json!({"query": "x"});
    let turns: Vec<ScriptedTurn> = vec![
        vec![ResponseEvent::Done {
            tool_calls: vec![
                tool_call("c1", "pulse_query", same_call.clone()),
                tool_call("c2", "pulse_query", same_call.clone()),
                tool_call("c3", "pulse_query", same_call.clone()),
                tool_call("c4", "pulse_query", same_call.clone()),
            ],
            input_tokens: 5,
            output_tokens: 5,
        }],
        vec![
            ResponseEvent::Content("I couldn't resolve that after a few tries.".into()),
            ResponseEvent::Done { tool_calls: vec![], input_tokens: 5, output_tokens: 5 },
        ],
    ];
    let provider = MockProvider::new("mock", turns);
    let store = InMemoryApprovalStore::new();
    let ctx = TurnContext { provider: &provider, executor: &exec, approval_store: &store, explore_providers: &[], abort: None };
    let mut sink: Vec<LoopEvent> = Vec::new();

    let outcome = pulse_core::run_turn(&mut session, "look up x".into(), &ctx, &cfg(), &mut sink).await.unwrap();

    assert_eq!(outcome.final_text, "I couldn't resolve that after a few tries.");
    let loop_detected_results = session
        .record
        .messages
        .iter()
        .filter(|m| m.tool_result.as_ref().is_some_and(|tr| tr.content.contains("LOOP_DETECTED")))
        .count();
    assert_eq!(loop_detected_results, 1);
    assert_eq!(exec_call_count(&exec, "pulse_query"), 3);
}

fn exec_call_count(exec: &MockExecutor, name: &str) -> usize {
    exec.calls.lock().unwrap().iter().filter(|(n, _)| n == name).count()
}

/// Scenario 4: a write that requires approval resolves once the store marks
/// it Approved, without the driver ever surfacing the approval payload as a
/// final answer.
#[tokio::test]
async fn approval_required_write_resolves_once_approved() {
    let mut session = Session::new("s1");
    session.fsm.on_tool_success(pulse_core::ToolKind::Read, "pulse_query");

    let mut responses = HashMap::new();
    responses.insert(
        "pulse_control".to_string(),
        ToolOutput::ok(r#"APPROVAL_REQUIRED:{"approval_id":"A1","command":"systemctl restart x","risk":"medium","description":"restart x"}"#),
    );
    let exec = MockExecutor::new(descriptors(), responses);
    let store = InMemoryApprovalStore::new();
    store.set_status("A1", ApprovalStatus::Approved);

    let turns: Vec<ScriptedTurn> = vec![
        vec![ResponseEvent::Done {
            tool_calls: vec![tool_call("c1", "pulse_control", serde_json::json!({"action": "restart", "target_host": "x"}))],
            input_tokens: 5,
            output_tokens: 5,
        }],
        vec![
            ResponseEvent::Content("Restarted x after approval.".into()),
            ResponseEvent::Done { tool_calls: vec![], input_tokens: 5, output_tokens: 5 },
        ],
    ];
    let provider = MockProvider::new("mock", turns);
    let ctx = TurnContext { provider: &provider, executor: &exec, approval_store: &store, explore_providers: &[], abort: None };
    let mut sink: Vec<LoopEvent> = Vec::new();

    let outcome = pulse_core::run_turn(&mut session, "restart x".into(), &ctx, &cfg(), &mut sink).await.unwrap();

    assert_eq!(outcome.final_text, "Restarted x after approval.");
    assert!(sink.iter().any(|e| matches!(e, LoopEvent::ApprovalNeeded { approval_id, .. } if approval_id == "A1")));
    assert_eq!(exec_call_count(&exec, "pulse_control"), 2);
}

/// Scenario 6: a conversational message skips the explore pre-pass entirely
/// — the scouting provider is never even called.
#[tokio::test]
async fn conversational_message_skips_explore_prepass() {
    let mut session = Session::new("s1");
    let exec = MockExecutor::new(descriptors(), HashMap::new());
    let main_provider = MockProvider::new(
        "mock",
        vec![vec![
            ResponseEvent::Content("You're welcome!".into()),
            ResponseEvent::Done { tool_calls: vec![], input_tokens: 3, output_tokens: 3 },
        ]],
    );
    let scout_provider = MockProvider::new("scout", vec![]);
    let scout_ref: &dyn ModelProvider = &scout_provider;
    let explore_providers: Vec<(String, &dyn ModelProvider)> = vec![("scout:mock".to_string(), scout_ref)];
    let store = InMemoryApprovalStore::new();
    let ctx = TurnContext {
        provider: &main_provider,
        executor: &exec,
        approval_store: &store,
        explore_providers: &explore_providers,
        abort: None,
    };
    let mut sink: Vec<LoopEvent> = Vec::new();

    let explore_enabled_cfg = LoopConfig { explore_enabled: true, max_agentic_turns: 5, ..LoopConfig::default() };
    let outcome = pulse_core::run_turn(&mut session, "thanks!".into(), &ctx, &explore_enabled_cfg, &mut sink).await.unwrap();

    assert_eq!(outcome.final_text, "You're welcome!");
    assert!(matches!(
        outcome.explore.as_ref().map(|r| r.outcome),
        Some(ExploreOutcome::SkippedConversational)
    ));
    assert!(sink.iter().any(|e| matches!(e, LoopEvent::ExploreStatus { phase: ExplorePhase::Skipped, .. })));
}
