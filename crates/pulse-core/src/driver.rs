// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use pulse_config::LoopConfig;
use pulse_model::{CompletionRequest, Message, ModelProvider, ResponseEvent, Role, ToolChoice, ToolResult, ToolSchema};
use pulse_tools::{ApprovalStore, ToolDescriptor, ToolExecutor};

use crate::compact::{compact_old_tool_results, prune_messages};
use crate::dispatch::{dispatch_tool_calls, truncate_for_provider, DispatchConfig};
use crate::error::CoreError;
use crate::events::{EventSink, ExploreOutcome, ExplorePhase, LoopEvent};
use crate::explore::{render_injection, run_explore_prepass, ExploreConfig};
use crate::fsm::WRITE_VERBS;
use crate::phantom::{has_phantom_execution, FALLBACK_APOLOGY};
use crate::session::Session;

const BASE_SYSTEM_PROMPT: &str = "You are an infrastructure operations assistant. \
Discover the resources a request refers to before acting on them, and confirm a write \
succeeded before reporting it as done. Never claim to have taken an action you did not call a tool for.";

const WRAP_UP_SOFT_NUDGE: &str = "You've made a number of tool calls already. \
If you have enough information, answer the user now instead of continuing to explore.";
const WRAP_UP_HARD_NUDGE: &str = "You are well past the point where further tool calls help. \
Answer the user now with what you have, noting any gaps.";
const FINAL_SUMMARY_NUDGE: &str = "Summarize what you found and did so far in plain text. Do not call any tools.";

/// Phrases that indicate the user wants a resource re-checked rather than
/// trusted from whatever's already cached, overriding the knowledge gate for
/// this turn's first dispatch.
const FRESH_DATA_PHRASES: &[&str] = &["check again", "refresh", "re-check", "recheck", "latest status", "current status", "right now"];

pub struct TurnContext<'a> {
    pub provider: &'a dyn ModelProvider,
    pub executor: &'a dyn ToolExecutor,
    pub approval_store: &'a dyn ApprovalStore,
    pub explore_providers: &'a [(String, &'a dyn ModelProvider)],
    /// Flips to `true` to cancel the turn between provider/dispatch round
    /// trips. `None` means this caller never wants to cancel mid-turn.
    pub abort: Option<tokio::sync::watch::Receiver<bool>>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub final_text: String,
    pub turns_used: u32,
    pub explore: Option<crate::events::ExplorePrepassResult>,
}

/// Runs the full per-user-message turn loop: optional explore pre-pass,
/// then up to `cfg.max_agentic_turns` provider round-trips, dispatching any
/// tool calls through [`dispatch_tool_calls`] between them, until the model
/// produces a final text answer or the turn cap is hit and the final-text
/// guarantee kicks in.
pub async fn run_turn(
    session: &mut Session,
    user_message: String,
    ctx: &TurnContext<'_>,
    cfg: &LoopConfig,
    sink: &mut dyn EventSink,
) -> anyhow::Result<TurnOutcome> {
    let tool_descriptors = ctx.executor.list_tools();
    let explore = maybe_run_explore(session, &user_message, &tool_descriptors, ctx, cfg, sink).await;

    let mut preferred_tool = detect_explicit_tool(&user_message, &tool_descriptors);
    let action_intent_detected = has_action_intent(&user_message);
    let fresh_data_override = has_fresh_data_intent(&user_message);

    let injected = explore.as_ref().and_then(|r| render_injection(&r.summary));
    let message_text = match injected {
        Some(suffix) => format!("{user_message}{suffix}"),
        None => user_message,
    };
    session.record.push(Message::user(message_text));

    let schemas: Vec<ToolSchema> = tool_descriptors.iter().map(to_schema).collect();
    let mut recent_call_counts: HashMap<(String, String), u32> = HashMap::new();
    let mut force_text_only = false;
    let mut any_tool_succeeded_ever = false;
    let mut cumulative_tool_calls = 0u32;
    let mut soft_nudge_sent = false;
    let mut hard_nudge_sent = false;
    let mut verify_nudge_sent = false;
    let mut tool_required_retried = false;
    let mut budget_exceeded = false;
    let mut turns_used = 0u32;

    for turn in 0..cfg.max_agentic_turns {
        if is_aborted(ctx) {
            return Err(CoreError::SessionAborted.into());
        }
        turns_used = turn + 1;
        let turn_start_index = session.record.messages.len();
        if turn > 0 {
            compact_old_tool_results(&mut session.record.messages, turn_start_index, cfg.keep_turns, cfg.min_compact_chars, &session.knowledge);
        }
        prune_messages(&mut session.record.messages, cfg.max_context_messages);

        let tools_available = !schemas.is_empty();
        let tool_choice = choose_tool_choice(turn, cfg.max_agentic_turns, force_text_only, tools_available, preferred_tool.as_deref(), action_intent_detected);
        let request = CompletionRequest {
            messages: build_provider_messages(&session.record.messages, cfg.max_tool_result_chars),
            system_prompt: build_system_prompt(&session.knowledge),
            tools: if matches!(tool_choice, ToolChoice::None) { vec![] } else { schemas.clone() },
            tool_choice: tool_choice.clone(),
        };

        let (content, reasoning, mut tool_calls, input_tokens, output_tokens) = match stream_turn(ctx.provider, request, sink).await {
            Ok(parts) => parts,
            Err(message) => {
                sink.emit(LoopEvent::Error { message: message.clone() });
                return Ok(TurnOutcome { final_text: FALLBACK_APOLOGY.to_string(), turns_used, explore });
            }
        };

        let mut discarded_by_none = false;
        if matches!(tool_choice, ToolChoice::None) && !tool_calls.is_empty() {
            tracing::warn!(count = tool_calls.len(), "provider returned tool calls despite ToolChoice::None, discarding");
            tool_calls.clear();
            discarded_by_none = true;
        }

        if exceeds_budget(input_tokens, output_tokens, ctx.provider.context_window()) {
            budget_exceeded = true;
        }

        let mut final_content = content;
        if tool_calls.is_empty() && !any_tool_succeeded_ever && has_phantom_execution(&final_content) {
            final_content = FALLBACK_APOLOGY.to_string();
        }

        let mut assistant_message = Message::assistant_with_tool_calls(final_content.clone(), tool_calls.clone());
        assistant_message.reasoning = if reasoning.is_empty() { None } else { Some(reasoning) };
        if tool_calls.is_empty() {
            assistant_message.tool_calls = None;
        }
        session.record.push(assistant_message);

        if budget_exceeded {
            break;
        }

        if tool_calls.is_empty() {
            let tool_was_required = matches!(tool_choice, ToolChoice::Any | ToolChoice::Specific(_));
            if tool_was_required && !tool_required_retried {
                tool_required_retried = true;
                append_internal_note(&mut session.record.messages, &build_tool_required_nudge(preferred_tool.as_deref()));
                session.record.updated_at = Utc::now();
                continue;
            }
            if tool_was_required {
                preferred_tool = None;
            }
            // A last-turn forced ToolChoice::None can discard a tool call
            // the model tried to make, leaving nothing to say. Don't treat
            // that silence as the final answer; let the turn loop end and
            // fall through to the final-text guarantee instead.
            let nothing_to_say = discarded_by_none && final_content.trim().is_empty();
            if !nothing_to_say {
                if let Err(err) = session.fsm.can_final_answer() {
                    if verify_nudge_sent {
                        break;
                    }
                    verify_nudge_sent = true;
                    append_internal_note(&mut session.record.messages, &err.to_string());
                    session.record.updated_at = Utc::now();
                    continue;
                }
                sink.emit(LoopEvent::Done { session_id: session.record.id.clone(), input_tokens, output_tokens });
                return Ok(TurnOutcome { final_text: final_content, turns_used, explore });
            }
        } else if let Some(name) = preferred_tool.clone() {
            let matched = tool_calls.iter().any(|c| c.name == name);
            if matched {
                preferred_tool = None;
            } else if !tool_required_retried {
                tool_required_retried = true;
                append_internal_note(&mut session.record.messages, &build_tool_required_nudge(Some(&name)));
                session.record.updated_at = Utc::now();
                continue;
            } else {
                preferred_tool = None;
            }
        }

        if is_aborted(ctx) {
            return Err(CoreError::SessionAborted.into());
        }

        let dispatch_cfg = DispatchConfig {
            concurrency: cfg.dispatch_concurrency,
            approval_poll_interval: Duration::from_millis(cfg.approval_poll_interval_ms),
            approval_wait_timeout: Duration::from_secs(cfg.approval_wait_timeout_secs),
            autonomous: false,
            fresh_data_override: turn == 0 && fresh_data_override,
            session_id: session.record.id.clone(),
            turn,
        };
        let outcome = dispatch_tool_calls(
            tool_calls.clone(),
            &mut session.fsm,
            &mut session.knowledge,
            ctx.executor,
            ctx.approval_store,
            &mut recent_call_counts,
            &dispatch_cfg,
        )
        .await;

        for event in outcome.events {
            sink.emit(event);
        }
        for message in outcome.result_messages {
            session.record.push(message);
        }
        any_tool_succeeded_ever |= outcome.any_tool_succeeded;
        force_text_only = outcome.force_text_only_next_turn;
        cumulative_tool_calls += tool_calls.len() as u32;

        if cumulative_tool_calls >= cfg.wrap_up_hard_threshold && !hard_nudge_sent {
            hard_nudge_sent = true;
            append_internal_note(&mut session.record.messages, WRAP_UP_HARD_NUDGE);
            session.record.updated_at = Utc::now();
        } else if cumulative_tool_calls >= cfg.wrap_up_soft_threshold && !soft_nudge_sent {
            soft_nudge_sent = true;
            append_internal_note(&mut session.record.messages, WRAP_UP_SOFT_NUDGE);
            session.record.updated_at = Utc::now();
        }
    }

    let final_text = final_text_guarantee(session, ctx.provider, cfg).await;
    sink.emit(LoopEvent::Done { session_id: session.record.id.clone(), input_tokens: 0, output_tokens: 0 });
    Ok(TurnOutcome { final_text, turns_used, explore })
}

fn is_aborted(ctx: &TurnContext<'_>) -> bool {
    ctx.abort.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Picks the provider-facing tool choice for this turn: text-only when
/// forced or no tools exist, text-only on the last available turn so the
/// model is pushed to summarize instead of calling yet another tool, a
/// specific tool when one was explicitly requested and not yet satisfied,
/// or `Any` on the very first turn when the user's phrasing implies they
/// want an action taken, not just a conversational reply.
fn choose_tool_choice(turn: u32, max_agentic_turns: u32, force_text_only: bool, tools_available: bool, preferred_tool: Option<&str>, action_intent_detected: bool) -> ToolChoice {
    if force_text_only || !tools_available {
        return ToolChoice::None;
    }
    if turn + 1 >= max_agentic_turns {
        return ToolChoice::None;
    }
    if let Some(name) = preferred_tool {
        return ToolChoice::Specific(name.to_string());
    }
    if turn == 0 && action_intent_detected {
        return ToolChoice::Any;
    }
    ToolChoice::Auto
}

/// Finds a tool the user named explicitly by substring match against the
/// available tool names, so a message like "run pulse_query on vm 101" pins
/// the provider to that exact tool instead of leaving the choice open.
fn detect_explicit_tool(user_message: &str, descriptors: &[ToolDescriptor]) -> Option<String> {
    let lower = user_message.to_ascii_lowercase();
    descriptors.iter().find(|d| lower.contains(&d.name.to_ascii_lowercase())).map(|d| d.name.clone())
}

fn has_action_intent(user_message: &str) -> bool {
    let lower = user_message.to_ascii_lowercase();
    WRITE_VERBS.iter().any(|v| lower.contains(v))
}

fn has_fresh_data_intent(user_message: &str) -> bool {
    let lower = user_message.to_ascii_lowercase();
    FRESH_DATA_PHRASES.iter().any(|p| lower.contains(p))
}

fn build_tool_required_nudge(preferred_tool: Option<&str>) -> String {
    match preferred_tool {
        Some(name) => format!("A tool call is required to proceed. Call {name} now."),
        None => "A tool call is required to proceed. Call an appropriate tool now.".to_string(),
    }
}

/// Appends `note` to the most recent assistant message instead of pushing a
/// synthetic new user turn, so internal nudges read as the assistant's own
/// running context rather than fabricated user input in the transcript.
fn append_internal_note(messages: &mut [Message], note: &str) {
    if let Some(last_assistant) = messages.iter_mut().rev().find(|m| m.role == Role::Assistant) {
        if last_assistant.content.is_empty() {
            last_assistant.content = note.to_string();
        } else {
            last_assistant.content.push_str("\n\n");
            last_assistant.content.push_str(note);
        }
    }
}

/// Builds the message history actually sent to the provider, capping any
/// oversized tool result to `max_chars`. The full result stays in
/// `session.record.messages` untouched — only this request-scoped copy is
/// truncated, so a persisted session always keeps the complete history.
fn build_provider_messages(messages: &[Message], max_chars: usize) -> Vec<Message> {
    messages
        .iter()
        .map(|m| match &m.tool_result {
            Some(tr) if tr.content.chars().count() > max_chars => {
                let mut capped = m.clone();
                capped.tool_result = Some(ToolResult {
                    tool_use_id: tr.tool_use_id.clone(),
                    content: truncate_for_provider(&tr.content, max_chars),
                    is_error: tr.is_error,
                });
                capped
            }
            _ => m.clone(),
        })
        .collect()
}

fn build_system_prompt(knowledge: &crate::knowledge::KnowledgeAccumulator) -> String {
    if knowledge.is_empty() {
        return BASE_SYSTEM_PROMPT.to_string();
    }
    format!("{BASE_SYSTEM_PROMPT}\n\nKnown facts so far:\n{}", knowledge.render_bullets())
}

fn to_schema(d: &ToolDescriptor) -> ToolSchema {
    ToolSchema {
        name: d.name.clone(),
        description: d.description.clone(),
        parameters: d.input_schema.clone(),
    }
}

fn exceeds_budget(input_tokens: u32, output_tokens: u32, context_window: usize) -> bool {
    (input_tokens as u64 + output_tokens as u64) as f64 > context_window as f64 * 0.9
}

/// Streams one provider turn to completion, forwarding incremental events to
/// `sink` and returning the accumulated (content, reasoning, tool_calls,
/// input_tokens, output_tokens). The error branch carries the provider's
/// error message, not a typed error — the caller decides how fatal it is.
async fn stream_turn(
    provider: &dyn ModelProvider,
    request: CompletionRequest,
    sink: &mut dyn EventSink,
) -> Result<(String, String, Vec<pulse_model::ToolCall>, u32, u32), String> {
    let mut stream = provider.chat_stream(request).await.map_err(|e| e.to_string())?;
    let mut content = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();
    let mut input_tokens = 0u32;
    let mut output_tokens = 0u32;

    while let Some(event) = stream.next().await {
        match event.map_err(|e| e.to_string())? {
            ResponseEvent::Content(text) => {
                sink.emit(LoopEvent::Content { text: text.clone() });
                content.push_str(&text);
            }
            ResponseEvent::Thinking(text) => {
                sink.emit(LoopEvent::Thinking { text: text.clone() });
                reasoning.push_str(&text);
            }
            ResponseEvent::ToolStart { id, name, input } => {
                sink.emit(LoopEvent::ToolStart { id, name, input });
            }
            ResponseEvent::Done { tool_calls: calls, input_tokens: i, output_tokens: o } => {
                tool_calls = calls;
                input_tokens = i;
                output_tokens = o;
            }
            ResponseEvent::Error(message) => return Err(message),
        }
    }

    Ok((content, reasoning, tool_calls, input_tokens, output_tokens))
}

async fn maybe_run_explore(
    session: &mut Session,
    user_message: &str,
    tool_descriptors: &[ToolDescriptor],
    ctx: &TurnContext<'_>,
    cfg: &LoopConfig,
    sink: &mut dyn EventSink,
) -> Option<crate::events::ExplorePrepassResult> {
    if !cfg.explore_enabled {
        return None;
    }
    sink.emit(LoopEvent::ExploreStatus { phase: ExplorePhase::Started, message: "scouting environment".into(), model: None, outcome: None });

    let explore_cfg = ExploreConfig {
        max_turns: cfg.explore_max_turns,
        timeout: Duration::from_secs(cfg.explore_timeout_secs),
        summary_char_limit: cfg.explore_summary_char_limit,
    };
    let result = run_explore_prepass(user_message, tool_descriptors, ctx.executor, ctx.explore_providers, &session.record.id, &explore_cfg).await;

    let phase = match result.outcome {
        ExploreOutcome::Success => ExplorePhase::Completed,
        ExploreOutcome::Failed => ExplorePhase::Failed,
        _ => ExplorePhase::Skipped,
    };
    sink.emit(LoopEvent::ExploreStatus {
        phase,
        message: result.error.clone().unwrap_or_else(|| "done".to_string()),
        model: result.model.clone(),
        outcome: Some(result.outcome),
    });
    Some(result)
}

/// The final-text guarantee: one more provider call, tools disabled, asking
/// for a plain-text wrap-up. Falls back to a deterministic summary built
/// from whatever the session already knows if the provider call itself
/// fails or times out.
async fn final_text_guarantee(session: &Session, provider: &dyn ModelProvider, cfg: &LoopConfig) -> String {
    let mut messages: Vec<Message> = build_provider_messages(&session.record.messages, cfg.max_tool_result_chars);
    while let Some(last) = messages.last() {
        if last.role == pulse_model::Role::Assistant && last.content.trim().is_empty() && !last.has_tool_calls() {
            messages.pop();
        } else {
            break;
        }
    }
    messages.push(Message::user(FINAL_SUMMARY_NUDGE));

    let request = CompletionRequest {
        messages,
        system_prompt: BASE_SYSTEM_PROMPT.to_string(),
        tools: vec![],
        tool_choice: ToolChoice::None,
    };

    let timeout = Duration::from_secs(cfg.final_summary_timeout_secs);
    let attempt = tokio::time::timeout(timeout, async {
        let mut stream = provider.chat_stream(request).await.map_err(|e| e.to_string())?;
        let mut content = String::new();
        while let Some(event) = stream.next().await {
            match event.map_err(|e| e.to_string())? {
                ResponseEvent::Content(text) => content.push_str(&text),
                ResponseEvent::Done { .. } => break,
                ResponseEvent::Error(message) => return Err(message),
                _ => {}
            }
        }
        Ok::<String, String>(content)
    })
    .await;

    match attempt {
        Ok(Ok(text)) if !text.trim().is_empty() => text,
        _ => synthesize_fallback_summary(session),
    }
}

fn synthesize_fallback_summary(session: &Session) -> String {
    if session.fsm.wrote_this_episode {
        format!(
            "I made changes to {} but couldn't produce a full summary. Check {} directly to confirm the outcome.",
            session.fsm.last_write_tool.as_deref().unwrap_or("the target resource"),
            session.fsm.last_write_tool.as_deref().unwrap_or("the resource")
        )
    } else if !session.knowledge.is_empty() {
        format!("Here's what I found:\n{}", session.knowledge.render_bullets())
    } else {
        FALLBACK_APOLOGY.to_string()
    }
}
