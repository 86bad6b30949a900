// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use pulse_model::{Message, Role};

use crate::knowledge::KnowledgeAccumulator;

/// Walks backward from `current_turn_start_index`, skipping the most recent
/// `keep_turns` assistant messages; everything before that boundary is
/// eligible for compaction. Eligible, non-error tool results of at least
/// `min_chars` have their content replaced with a one-line summary.
/// Assistant messages and their reasoning are never touched.
pub fn compact_old_tool_results(
    messages: &mut [Message],
    current_turn_start_index: usize,
    keep_turns: u32,
    min_chars: usize,
    ka: &KnowledgeAccumulator,
) {
    let boundary = compaction_boundary(messages, current_turn_start_index, keep_turns);

    for i in 0..boundary {
        let (tool_use_id, content_len, is_error) = match &messages[i].tool_result {
            Some(tr) if !tr.is_error && tr.content.len() >= min_chars => (tr.tool_use_id.clone(), tr.content.len(), tr.is_error),
            _ => continue,
        };
        let lines = messages[i].tool_result.as_ref().unwrap().content.lines().count();
        let (tool_name, params) = find_originating_call(messages, &tool_use_id)
            .unwrap_or_else(|| ("unknown_tool".to_string(), String::new()));

        let summary = if let Some(facts) = ka.fact_summary_for_tool(&tool_use_id) {
            format!("[Compacted: {tool_name}({params}) — Key facts: {facts}]")
        } else {
            format!("[Tool result compacted: {tool_name}({params}) — {content_len} chars, {lines} lines. …]")
        };
        let _ = is_error;

        if let Some(tr) = messages[i].tool_result.as_mut() {
            tr.content = summary;
        }
    }
}

fn compaction_boundary(messages: &[Message], current_turn_start_index: usize, keep_turns: u32) -> usize {
    let mut assistant_seen = 0u32;
    for i in (0..current_turn_start_index.min(messages.len())).rev() {
        if messages[i].role == Role::Assistant {
            assistant_seen += 1;
            if assistant_seen == keep_turns {
                return i;
            }
        }
    }
    0
}

fn find_originating_call(messages: &[Message], tool_use_id: &str) -> Option<(String, String)> {
    for m in messages {
        if let Some(calls) = &m.tool_calls {
            for call in calls {
                if call.id == tool_use_id {
                    let params = canonical_params(&call.input);
                    return Some((call.name.clone(), params));
                }
            }
        }
    }
    None
}

fn canonical_params(input: &serde_json::Value) -> String {
    match input.as_object() {
        Some(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            keys.iter()
                .map(|k| format!("{k}={}", obj[*k].to_string().trim_matches('"')))
                .collect::<Vec<_>>()
                .join(",")
        }
        None => String::new(),
    }
}

/// Enforces `MaxContextMessagesLimit`: drops the oldest `excess` messages,
/// then repeatedly strips whatever that leaves dangling — orphaned leading
/// tool results, and an assistant-with-tool-calls message (plus its
/// results) whose originating user message was itself pruned.
pub fn prune_messages(messages: &mut Vec<Message>, max_context_messages: usize) {
    if messages.len() <= max_context_messages {
        return;
    }
    let excess = messages.len() - max_context_messages;
    messages.drain(0..excess);

    loop {
        match messages.first() {
            Some(m) if m.is_tool_result() => {
                messages.remove(0);
            }
            Some(m) if m.role == Role::Assistant && m.has_tool_calls() => {
                let ids: Vec<String> = m.tool_calls.as_ref().unwrap().iter().map(|c| c.id.clone()).collect();
                messages.remove(0);
                while let Some(next) = messages.first() {
                    match &next.tool_result {
                        Some(tr) if ids.contains(&tr.tool_use_id) => {
                            messages.remove(0);
                        }
                        _ => break,
                    }
                }
            }
            _ => break,
        }
    }
}
