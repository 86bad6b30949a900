// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::time::{Duration, Instant};

use futures::StreamExt;
use pulse_model::{CompletionRequest, Message, ModelProvider, ResponseEvent, ToolCall, ToolChoice, ToolSchema};
use pulse_tools::{ToolContext, ToolDescriptor, ToolExecutor};

use crate::events::{ExploreOutcome, ExplorePrepassResult};
use crate::fsm::{classify_tool_call, ToolKind};
use crate::knowledge::KnowledgeAccumulator;

const EXPLORE_SYSTEM_PROMPT: &str = "You are scouting the environment before the main turn begins. \
Use the available read-only tools to gather the facts a later write or answer will need. \
Do not ask the user anything. Stop and answer in plain text once you have enough context.";

const GREETINGS: &[&str] = &["hi", "hello", "hey", "thanks", "thank you", "ok", "okay", "yes", "no", "sure", "cool"];

pub struct ExploreConfig {
    pub max_turns: u32,
    pub timeout: Duration,
    pub summary_char_limit: usize,
}

/// True for messages too short or too conversational to be worth a scouting
/// pass — a bare greeting never needs infrastructure facts.
fn is_conversational(user_message: &str) -> bool {
    let trimmed = user_message.trim().trim_end_matches(['.', '!', '?']).to_ascii_lowercase();
    trimmed.len() < 4 || GREETINGS.contains(&trimmed.as_str())
}

/// Drops every tool the workflow FSM would classify as a write or as
/// user-input, leaving only what's safe to run unsupervised. Classification
/// runs against an empty input object, so multiplexed tools whose kind
/// depends on an `action` field default to whatever their name implies.
fn read_only_tools(descriptors: &[ToolDescriptor]) -> Vec<ToolDescriptor> {
    descriptors
        .iter()
        .filter(|d| matches!(classify_tool_call(&d.name, &serde_json::Value::Null), ToolKind::Read | ToolKind::Resolve))
        .cloned()
        .collect()
}

fn to_schema(d: &ToolDescriptor) -> ToolSchema {
    ToolSchema {
        name: d.name.clone(),
        description: d.description.clone(),
        parameters: d.input_schema.clone(),
    }
}

/// Splits a candidate label on its first colon, requiring both the provider
/// and model halves to be non-empty. Labels that don't parse are dropped
/// before the scouting pass ever tries them, so a result always identifies
/// which backend actually ran.
fn parse_provider_model(s: &str) -> Option<(&str, &str)> {
    let (provider, model) = s.split_once(':')?;
    if provider.is_empty() || model.is_empty() {
        return None;
    }
    Some((provider, model))
}

fn truncate(summary: String, limit: usize) -> String {
    if summary.chars().count() <= limit {
        return summary;
    }
    let mut truncated: String = summary.chars().take(limit.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

/// Runs a short, read-only scouting pass before the main turn loop starts,
/// trying each `(label, provider)` candidate in order until one completes
/// without error. `label` should be in `provider:model` form so the result
/// tells the caller which backend actually ran.
pub async fn run_explore_prepass(
    user_message: &str,
    tool_descriptors: &[ToolDescriptor],
    executor: &dyn ToolExecutor,
    providers: &[(String, &dyn ModelProvider)],
    session_id: &str,
    cfg: &ExploreConfig,
) -> ExplorePrepassResult {
    let started = Instant::now();

    if is_conversational(user_message) {
        return ExplorePrepassResult {
            summary: String::new(),
            model: None,
            outcome: ExploreOutcome::SkippedConversational,
            duration_ms: elapsed_ms(started),
            input_tokens: 0,
            output_tokens: 0,
            error: None,
        };
    }

    let tools = read_only_tools(tool_descriptors);
    if tools.is_empty() {
        return ExplorePrepassResult {
            summary: String::new(),
            model: None,
            outcome: ExploreOutcome::SkippedNoTools,
            duration_ms: elapsed_ms(started),
            input_tokens: 0,
            output_tokens: 0,
            error: None,
        };
    }

    let candidates: Vec<&(String, &dyn ModelProvider)> = providers.iter().filter(|(label, _)| parse_provider_model(label).is_some()).collect();
    if candidates.is_empty() {
        return ExplorePrepassResult {
            summary: String::new(),
            model: None,
            outcome: ExploreOutcome::SkippedNoModel,
            duration_ms: elapsed_ms(started),
            input_tokens: 0,
            output_tokens: 0,
            error: None,
        };
    }

    let mut last_error = String::new();
    for (label, provider) in candidates {
        match tokio::time::timeout(cfg.timeout, run_with_provider(user_message, &tools, executor, *provider, session_id, cfg)).await {
            Ok(Ok(mut result)) => {
                result.model = Some(label.clone());
                result.duration_ms = elapsed_ms(started);
                return result;
            }
            Ok(Err(err)) => last_error = err,
            Err(_) => last_error = format!("explore pre-pass timed out after {:?}", cfg.timeout),
        }
    }

    ExplorePrepassResult {
        summary: String::new(),
        model: None,
        outcome: ExploreOutcome::Failed,
        duration_ms: elapsed_ms(started),
        input_tokens: 0,
        output_tokens: 0,
        error: Some(last_error),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

async fn run_with_provider(
    user_message: &str,
    tools: &[ToolDescriptor],
    executor: &dyn ToolExecutor,
    provider: &dyn ModelProvider,
    session_id: &str,
    cfg: &ExploreConfig,
) -> Result<ExplorePrepassResult, String> {
    let schemas: Vec<ToolSchema> = tools.iter().map(to_schema).collect();
    let mut messages = vec![Message::user(user_message)];
    let mut knowledge = KnowledgeAccumulator::new();
    let mut input_tokens = 0u32;
    let mut output_tokens = 0u32;
    let mut final_text = String::new();

    for turn in 0..cfg.max_turns {
        let req = CompletionRequest {
            messages: messages.clone(),
            system_prompt: EXPLORE_SYSTEM_PROMPT.to_string(),
            tools: schemas.clone(),
            tool_choice: ToolChoice::Auto,
        };

        let mut stream = provider.chat_stream(req).await.map_err(|e| e.to_string())?;
        let mut content = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();

        while let Some(event) = stream.next().await {
            match event.map_err(|e| e.to_string())? {
                ResponseEvent::Content(text) => content.push_str(&text),
                ResponseEvent::Thinking(_) => {}
                ResponseEvent::ToolStart { .. } => {}
                ResponseEvent::Done { tool_calls: calls, input_tokens: i, output_tokens: o } => {
                    tool_calls = calls;
                    input_tokens += i;
                    output_tokens += o;
                }
                ResponseEvent::Error(message) => return Err(message),
            }
        }

        if tool_calls.is_empty() {
            final_text = content;
            break;
        }

        messages.push(Message::assistant_with_tool_calls(content, tool_calls.clone()));
        for call in &tool_calls {
            let kind = classify_tool_call(&call.name, &call.input);
            if kind == ToolKind::Write || kind == ToolKind::UserInput {
                messages.push(Message::tool_result(&call.id, "skipped: not permitted during exploration", true));
                continue;
            }
            let ctx = ToolContext { session_id: session_id.to_string() };
            let output = executor.execute_tool(&ctx, &call.name, &call.input).await;
            if !output.is_error {
                if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&output.as_text()) {
                    knowledge.extract_facts(&call.name, turn, &call.id, &parsed);
                }
            }
            messages.push(Message::tool_result(&call.id, output.as_text(), output.is_error));
        }
    }

    let summary = if !final_text.trim().is_empty() {
        final_text
    } else if !knowledge.is_empty() {
        knowledge.render_bullets()
    } else {
        String::new()
    };

    Ok(ExplorePrepassResult {
        summary: truncate(summary, cfg.summary_char_limit),
        model: None,
        outcome: ExploreOutcome::Success,
        duration_ms: 0,
        input_tokens,
        output_tokens,
        error: None,
    })
}

/// Wraps a non-empty explore summary for injection into the latest user
/// message. Callers should append this to the message content, not replace
/// it.
pub fn render_injection(summary: &str) -> Option<String> {
    if summary.trim().is_empty() {
        return None;
    }
    Some(format!("\n\n<explore_context>\n{summary}\n</explore_context>"))
}
