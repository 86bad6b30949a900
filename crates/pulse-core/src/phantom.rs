// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0

const METRIC_PATTERNS: &[&str] = &["cpu is at", "% memory", "memory usage is", "disk usage is"];
const STATE_PATTERNS: &[&str] = &["is currently running", "is currently stopped", "the logs show", "is now online", "is now offline"];
const FAKE_CALL_PATTERNS: &[&str] = &["```tool", "function_call:", "pulse_control(", "pulse_query("];
const PAST_ACTION_PATTERNS: &[&str] = &["i restarted the", "successfully stopped", "i stopped the", "i deleted the", "successfully restarted"];

pub const FALLBACK_APOLOGY: &str = "I apologize, but I wasn't able to access the infrastructure tools needed to complete this request. This may be because the tools are currently unavailable, there was a connection issue, or the model lacks function-calling support in this context.";

/// True if, and only if, the assistant's text contains a concrete claim that
/// only live tool output could produce while no tool call was made. Callers
/// are expected to check this only when `tools_succeeded_this_episode` is
/// false — the check does not itself inspect execution history.
pub fn has_phantom_execution(content: &str) -> bool {
    let lower = content.to_ascii_lowercase();
    METRIC_PATTERNS
        .iter()
        .chain(STATE_PATTERNS)
        .chain(FAKE_CALL_PATTERNS)
        .chain(PAST_ACTION_PATTERNS)
        .any(|pattern| lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_concrete_metric_claim() {
        assert!(has_phantom_execution("The CPU is at 87% right now."));
    }

    #[test]
    fn detects_current_state_assertion() {
        assert!(has_phantom_execution("The container is currently running fine."));
    }

    #[test]
    fn detects_fake_tool_call_marker() {
        assert!(has_phantom_execution("Calling pulse_control(action=restart) now."));
    }

    #[test]
    fn detects_past_tense_specific_action() {
        assert!(has_phantom_execution("I restarted the nginx container successfully."));
    }

    #[test]
    fn plain_hedge_is_not_phantom() {
        assert!(!has_phantom_execution("I would need to check the current status before answering."));
    }

    #[test]
    fn case_insensitive_match() {
        assert!(has_phantom_execution("THE LOGS SHOW an error."));
    }
}
