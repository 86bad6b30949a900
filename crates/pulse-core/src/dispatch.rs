// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use pulse_model::{Message, ToolCall};
use pulse_tools::{ApprovalStatus, ApprovalStore, ToolContext, ToolExecutor, ToolOutput};

use crate::error::CoreError;
use crate::events::LoopEvent;
use crate::fsm::{classify_tool_call, SessionFsm, ToolKind};
use crate::knowledge::KnowledgeAccumulator;

const LOOP_DETECTION_LIMIT: u32 = 3;

/// Result of running the full three-phase pipeline once for a batch of
/// tool-call requests returned by a single provider turn.
#[derive(Default)]
pub struct DispatchOutcome {
    /// Tool-result messages, in the same order the provider requested them.
    pub result_messages: Vec<Message>,
    pub events: Vec<LoopEvent>,
    pub any_tool_succeeded: bool,
    /// Set once any call hits `LOOP_DETECTED` or a write completes — both
    /// force the next turn to be text-only.
    pub force_text_only_next_turn: bool,
    pub write_completed: bool,
}

pub struct DispatchConfig {
    pub concurrency: usize,
    pub approval_poll_interval: Duration,
    pub approval_wait_timeout: Duration,
    pub autonomous: bool,
    pub fresh_data_override: bool,
    pub session_id: String,
    pub turn: u32,
}

struct Settled {
    call: ToolCall,
    kind: ToolKind,
    output: ToolOutput,
}

/// Runs pre-check (Phase 1, sequential), execute (Phase 2, parallel), and
/// post-process (Phase 3, sequential, original order) for one turn's batch
/// of tool calls.
pub async fn dispatch_tool_calls(
    calls: Vec<ToolCall>,
    fsm: &mut SessionFsm,
    knowledge: &mut KnowledgeAccumulator,
    executor: &dyn ToolExecutor,
    approval_store: &dyn ApprovalStore,
    recent_call_counts: &mut HashMap<(String, String), u32>,
    cfg: &DispatchConfig,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();
    let mut to_execute = Vec::new();
    let mut settled: Vec<Option<Settled>> = (0..calls.len()).map(|_| None).collect();

    // Phase 1 — pre-check, sequential and order-preserving.
    for (index, call) in calls.into_iter().enumerate() {
        let kind = classify_tool_call(&call.name, &call.input);

        if let Err(err) = fsm.can_execute_tool(kind, &call.name) {
            let recovery_code = match &err {
                CoreError::FsmBlocked { message } => message.clone(),
                other => other.to_string(),
            };
            crate::metrics::record_recoverable_error(&recovery_code);
            fsm.track_pending_recovery(recovery_code, &call.name);
            settled[index] = Some(Settled {
                call: call.clone(),
                kind,
                output: ToolOutput::err(err.to_string()),
            });
            continue;
        }

        let canonical = canonical_json(&call.input);
        let count = recent_call_counts.entry((call.name.clone(), canonical)).or_insert(0);
        *count += 1;
        if *count > LOOP_DETECTION_LIMIT {
            outcome.force_text_only_next_turn = true;
            crate::metrics::record_loop_detected(&call.name);
            settled[index] = Some(Settled {
                call: call.clone(),
                kind,
                output: ToolOutput::err(CoreError::LoopDetected {
                    name: call.name.clone(),
                    limit: LOOP_DETECTION_LIMIT,
                }.to_string()),
            });
            continue;
        }

        if cfg.turn > 0 || !cfg.fresh_data_override {
            let predicted = knowledge.predict_fact_keys(&call.name, &call.input);
            if knowledge.all_keys_present(&predicted) {
                let cached = predicted
                    .iter()
                    .map(|k| match knowledge.lookup(k) {
                        Some(f) => format!("{}={}", f.key, f.value),
                        None => knowledge
                            .expand_marker(k)
                            .iter()
                            .map(|f| format!("{}={}", f.key, f.value))
                            .collect::<Vec<_>>()
                            .join(","),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                settled[index] = Some(Settled {
                    call: call.clone(),
                    kind,
                    output: ToolOutput::ok(cached),
                });
                continue;
            }
        }

        to_execute.push((index, call, kind));
    }

    // Phase 2 — execute, bounded concurrency, index-preserving.
    let session_id = cfg.session_id.clone();
    let executed: Vec<(usize, ToolCall, ToolKind, ToolOutput)> = stream::iter(to_execute.into_iter())
        .map(|(index, call, kind)| {
            let session_id = session_id.clone();
            async move {
                let ctx = ToolContext { session_id };
                let output = executor.execute_tool(&ctx, &call.name, &call.input).await;
                (index, call, kind, output)
            }
        })
        .buffer_unordered(cfg.concurrency.max(1))
        .collect()
        .await;

    for (index, call, kind, output) in executed {
        settled[index] = Some(Settled { call, kind, output });
    }

    // Phase 3 — post-process, sequential, original order.
    for slot in settled.into_iter() {
        let Settled { call, kind, output: mut output } = slot.expect("every call is settled by phase 1 or phase 2");

        if !output.is_error {
            outcome.any_tool_succeeded = true;
            let parsed = serde_json::from_str::<serde_json::Value>(&output.as_text())
                .unwrap_or_else(|_| serde_json::Value::String(output.as_text()));
            let facts = knowledge.extract_facts(&call.name, cfg.turn, &call.id, &parsed);
            if facts.is_empty() {
                let predicted = knowledge.predict_fact_keys(&call.name, &call.input);
                if !predicted.is_empty() {
                    knowledge.mark_negative(predicted[0].clone(), format!("checked: {}", output.as_text()));
                }
            }
        }

        if output.as_text().contains("STRICT_RESOLUTION") {
            fsm.track_pending_recovery("STRICT_RESOLUTION", &call.name);
        }

        output = apply_auto_recovery(output, &call, executor, &cfg.session_id).await;

        if output.starts_with_approval_request() {
            let (new_output, approval_event) = resolve_approval(output, &call, executor, approval_store, cfg).await;
            output = new_output;
            if let Some(event) = approval_event {
                outcome.events.push(event);
            }
        }

        outcome.events.push(LoopEvent::ToolEnd {
            id: call.id.clone(),
            name: call.name.clone(),
            input_display: canonical_json(&call.input),
            raw_input: call.input.clone(),
            output: output.as_text(),
            success: !output.is_error,
        });

        if !output.is_error {
            if fsm.check_recovery_success(&call.name).is_some() {
                crate::metrics::record_recovery_success(&call.name);
            }
            fsm.on_tool_success(kind, &call.name);
            if kind == ToolKind::Write {
                fsm.auto_verify();
                outcome.write_completed = true;
                outcome.force_text_only_next_turn = true;
            }
        }

        outcome.result_messages.push(Message::tool_result(&call.id, output.as_text(), output.is_error));
    }

    outcome
}

async fn apply_auto_recovery(output: ToolOutput, call: &ToolCall, executor: &dyn ToolExecutor, session_id: &str) -> ToolOutput {
    if call.input.get("_auto_recovery_attempt").is_some() {
        return output;
    }
    let parsed: Option<serde_json::Value> = serde_json::from_str(&output.as_text()).ok();
    let Some(parsed) = parsed else { return output };
    let auto_recoverable = parsed.get("auto_recoverable").and_then(|v| v.as_bool()).unwrap_or(false);
    let Some(rewrite) = parsed.get("suggested_rewrite").and_then(|v| v.as_str()) else {
        return output;
    };
    if !auto_recoverable {
        return output;
    }
    let Ok(mut new_input) = serde_json::from_str::<serde_json::Value>(rewrite) else {
        return output;
    };
    if let Some(obj) = new_input.as_object_mut() {
        obj.insert("_auto_recovery_attempt".to_string(), serde_json::Value::Bool(true));
    }
    crate::metrics::record_auto_recovery(&call.name);
    let ctx = ToolContext { session_id: session_id.to_string() };
    executor.execute_tool(&ctx, &call.name, &new_input).await
}

async fn resolve_approval(
    output: ToolOutput,
    call: &ToolCall,
    executor: &dyn ToolExecutor,
    approval_store: &dyn ApprovalStore,
    cfg: &DispatchConfig,
) -> (ToolOutput, Option<LoopEvent>) {
    let payload = output.as_text();
    let json_part = payload.trim_start_matches("APPROVAL_REQUIRED:");
    let Ok(request) = serde_json::from_str::<serde_json::Value>(json_part) else {
        return (ToolOutput::err("malformed approval request payload"), None);
    };
    let approval_id = request.get("approval_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let command = request.get("command").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let risk = request.get("risk").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
    let description = request.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string();

    let event = LoopEvent::ApprovalNeeded {
        approval_id: approval_id.clone(),
        tool_id: call.id.clone(),
        tool_name: call.name.clone(),
        command,
        target_host: None,
        risk,
        description,
    };

    if cfg.autonomous {
        return (ToolOutput::ok("FIX_QUEUED"), Some(event));
    }

    let deadline = tokio::time::Instant::now() + cfg.approval_wait_timeout;
    loop {
        if let Some(record) = approval_store.get_approval(&approval_id).await {
            match record.status {
                ApprovalStatus::Approved => {
                    let mut input = call.input.clone();
                    if let Some(obj) = input.as_object_mut() {
                        obj.insert("_approval_id".to_string(), serde_json::Value::String(approval_id.clone()));
                    }
                    let ctx = ToolContext { session_id: cfg.session_id.clone() };
                    let output = executor.execute_tool(&ctx, &call.name, &input).await;
                    return (output, Some(event));
                }
                ApprovalStatus::Denied { reason } => {
                    return (ToolOutput::err(CoreError::ApprovalDenied { reason }.to_string()), Some(event));
                }
                ApprovalStatus::Pending => {}
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return (ToolOutput::err(CoreError::ApprovalTimeout { approval_id }.to_string()), Some(event));
        }
        tokio::time::sleep(cfg.approval_poll_interval).await;
    }
}

/// Caps a tool result at `max_chars` for the copy sent to the model,
/// appending an annotated trailer noting how much was cut. The full,
/// untruncated result stays in `DispatchOutcome::result_messages` — this is
/// applied separately when the driver builds the provider-facing request,
/// so a persisted session always keeps the complete result history.
pub fn truncate_for_provider(content: &str, max_chars: usize) -> String {
    let total = content.chars().count();
    if total <= max_chars {
        return content.to_string();
    }
    let head: String = content.chars().take(max_chars).collect();
    format!("{head}\n...[truncated, showing {max_chars} of {total} chars]")
}

fn canonical_json(value: &serde_json::Value) -> String {
    match value.as_object() {
        Some(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            let body = keys.iter().map(|k| format!("\"{k}\":{}", obj[*k])).collect::<Vec<_>>().join(",");
            format!("{{{body}}}")
        }
        None => value.to_string(),
    }
}
