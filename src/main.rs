// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Minimal terminal harness for the agentic tool-calling loop. Wires a
//! scripted mock provider and a canned tool executor through `pulse-core` so
//! the full discover-then-write cycle can be driven end to end without a
//! real model or a real infrastructure backend.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use pulse_core::{ensure_session, save_session, LoopEvent, Session, TurnContext};
use pulse_model::mock::{MockProvider, ScriptedTurn};
use pulse_model::{ModelProvider, ResponseEvent, ToolCall};
use pulse_tools::approval::mock::InMemoryApprovalStore;
use pulse_tools::executor::mock::MockExecutor;
use pulse_tools::{ToolDescriptor, ToolExecutor, ToolOutput};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    pulse_core::metrics::install();

    let user_message = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let user_message = if user_message.trim().is_empty() {
        "restart vm 101".to_string()
    } else {
        user_message
    };

    let cfg = pulse_config::load(std::env::var("PULSE_CONFIG").ok().map(PathBuf::from).as_deref());

    let data_dir = pulse_agent_data_dir();
    let record = ensure_session(&data_dir, "cli").context("loading session")?;
    let mut session = Session::from_record(record);

    let executor = demo_executor();
    let provider = demo_provider(&user_message);
    let approval_store = InMemoryApprovalStore::new();

    let ctx = TurnContext {
        provider: &provider,
        executor: &executor,
        approval_store: &approval_store,
        explore_providers: &[],
        abort: None,
    };

    let mut sink: Vec<LoopEvent> = Vec::new();
    let outcome = pulse_core::run_turn(&mut session, user_message, &ctx, &cfg, &mut sink).await?;

    for event in &sink {
        print_event(event);
    }
    println!("\n{}", outcome.final_text);

    save_session(&data_dir, &session.record).context("saving session")?;
    Ok(())
}

fn pulse_agent_data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(std::env::temp_dir).join("pulse-agent").join("sessions")
}

/// Two read-only tools and one write tool, enough to exercise the
/// discover-then-write cycle without any real infrastructure behind them.
fn demo_executor() -> impl ToolExecutor {
    let descriptors = vec![
        ToolDescriptor::new(
            "pulse_query",
            "Look up the current status of a VM or host by name.",
            serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
        ),
        ToolDescriptor::new(
            "pulse_control",
            "Perform a control action (restart, stop) against a target host.",
            serde_json::json!({"type": "object", "properties": {"action": {"type": "string"}, "target_host": {"type": "string"}}, "required": ["action", "target_host"]}),
        ),
    ];
    let mut responses = HashMap::new();
    responses.insert(
        "pulse_query".to_string(),
        ToolOutput::ok(r#"{"id":"vm:101","status":"running"}"#),
    );
    responses.insert(
        "pulse_control".to_string(),
        ToolOutput::ok(r#"{"id":"vm:101","status":"restarted"}"#),
    );
    MockExecutor::new(descriptors, responses)
}

/// Scripts the two-turn discover-then-write exchange described in the
/// driver's own test suite, regardless of what the user actually typed —
/// there is no real model behind this binary, only a demonstration of the
/// loop's control flow.
fn demo_provider(_user_message: &str) -> impl ModelProvider {
    let turn0: ScriptedTurn = vec![ResponseEvent::Done {
        tool_calls: vec![ToolCall {
            id: "c1".into(),
            name: "pulse_query".into(),
            input: serde_json::json!({"query": "vm 101"}),
            thought_signature: None,
        }],
        input_tokens: 50,
        output_tokens: 20,
    }];
    let turn1: ScriptedTurn = vec![ResponseEvent::Done {
        tool_calls: vec![ToolCall {
            id: "c2".into(),
            name: "pulse_control".into(),
            input: serde_json::json!({"action": "restart", "target_host": "vm-101"}),
            thought_signature: None,
        }],
        input_tokens: 60,
        output_tokens: 25,
    }];
    let turn2: ScriptedTurn = vec![
        ResponseEvent::Content("Restarted vm-101 successfully.".into()),
        ResponseEvent::Done {
            tool_calls: vec![],
            input_tokens: 70,
            output_tokens: 8,
        },
    ];
    MockProvider::new("demo-mock", vec![turn0, turn1, turn2])
}

fn print_event(event: &LoopEvent) {
    match event {
        LoopEvent::Content { text } => println!("[content] {text}"),
        LoopEvent::Thinking { text } => println!("[thinking] {text}"),
        LoopEvent::ToolStart { name, input, .. } => println!("[tool_start] {name} {input}"),
        LoopEvent::ToolEnd { name, success, output, .. } => println!("[tool_end] {name} success={success} {output}"),
        LoopEvent::ApprovalNeeded { tool_name, command, .. } => println!("[approval_needed] {tool_name}: {command}"),
        LoopEvent::ExploreStatus { phase, message, .. } => println!("[explore:{phase:?}] {message}"),
        LoopEvent::Error { message } => eprintln!("[error] {message}"),
        LoopEvent::Done { input_tokens, output_tokens, .. } => {
            println!("[done] input_tokens={input_tokens} output_tokens={output_tokens}")
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
