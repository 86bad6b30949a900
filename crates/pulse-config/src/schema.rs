// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_max_agentic_turns() -> u32 {
    10
}
fn default_max_context_messages() -> usize {
    120
}
fn default_max_tool_result_chars() -> usize {
    16_000
}
fn default_explore_enabled() -> bool {
    true
}
fn default_explore_max_turns() -> u32 {
    3
}
fn default_explore_timeout_secs() -> u64 {
    25
}
fn default_explore_summary_char_limit() -> usize {
    2_400
}
fn default_recovery_ttl_secs() -> u64 {
    600
}
fn default_keep_turns() -> u32 {
    2
}
fn default_min_compact_chars() -> usize {
    300
}
fn default_resolved_context_ttl_secs() -> u64 {
    1_800
}
fn default_resolved_context_capacity() -> usize {
    200
}
fn default_wrap_up_soft_threshold() -> u32 {
    12
}
fn default_wrap_up_hard_threshold() -> u32 {
    18
}
fn default_loop_detection_limit() -> u32 {
    3
}
fn default_dispatch_concurrency() -> usize {
    4
}
fn default_approval_poll_interval_ms() -> u64 {
    500
}
fn default_approval_wait_timeout_secs() -> u64 {
    300
}
fn default_final_summary_timeout_secs() -> u64 {
    20
}

/// Runtime configuration for the agentic tool-calling loop.
///
/// Every field has a serde default so a partially specified YAML document,
/// or no document at all, produces a usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Hard cap on turns per user message (`MaxAgenticTurns`).
    pub max_agentic_turns: u32,
    /// Message history cap (`MaxContextMessagesLimit`).
    pub max_context_messages: usize,
    /// Per-result size cap for the model-visible copy (`MaxToolResultCharsLimit`).
    pub max_tool_result_chars: usize,
    /// If true, send only the latest user message to the model (`StatelessContext`).
    pub stateless_context: bool,
    /// Enable the read-only explore pre-pass (`PULSE_EXPLORE_ENABLED`).
    pub explore_enabled: bool,
    /// Scout turn cap.
    pub explore_max_turns: u32,
    /// Scout wall-clock cap, in seconds.
    pub explore_timeout_secs: u64,
    /// Scout summary truncation length, in characters.
    pub explore_summary_char_limit: usize,
    /// Pending-recovery GC horizon, in seconds (`RecoveryTTL`).
    pub recovery_ttl_secs: u64,
    /// Number of most-recent assistant turns exempt from compaction.
    pub keep_turns: u32,
    /// Minimum tool-result length eligible for compaction.
    pub min_compact_chars: usize,
    /// `ResolvedContext` entry time-to-live, in seconds.
    pub resolved_context_ttl_secs: u64,
    /// `ResolvedContext` LRU capacity.
    pub resolved_context_capacity: usize,
    /// Cumulative tool-call count at which a soft wrap-up nudge is injected.
    pub wrap_up_soft_threshold: u32,
    /// Cumulative tool-call count at which a hard wrap-up nudge is injected.
    pub wrap_up_hard_threshold: u32,
    /// Number of identical (name, input) calls allowed before `LOOP_DETECTED`.
    pub loop_detection_limit: u32,
    /// Phase-2 bounded concurrency cap for parallel tool dispatch.
    pub dispatch_concurrency: usize,
    /// Approval-store poll interval, in milliseconds.
    pub approval_poll_interval_ms: u64,
    /// Approval-wait total timeout, in seconds.
    pub approval_wait_timeout_secs: u64,
    /// Final-summary fallback call timeout, in seconds.
    pub final_summary_timeout_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_agentic_turns: default_max_agentic_turns(),
            max_context_messages: default_max_context_messages(),
            max_tool_result_chars: default_max_tool_result_chars(),
            stateless_context: false,
            explore_enabled: default_explore_enabled(),
            explore_max_turns: default_explore_max_turns(),
            explore_timeout_secs: default_explore_timeout_secs(),
            explore_summary_char_limit: default_explore_summary_char_limit(),
            recovery_ttl_secs: default_recovery_ttl_secs(),
            keep_turns: default_keep_turns(),
            min_compact_chars: default_min_compact_chars(),
            resolved_context_ttl_secs: default_resolved_context_ttl_secs(),
            resolved_context_capacity: default_resolved_context_capacity(),
            wrap_up_soft_threshold: default_wrap_up_soft_threshold(),
            wrap_up_hard_threshold: default_wrap_up_hard_threshold(),
            loop_detection_limit: default_loop_detection_limit(),
            dispatch_concurrency: default_dispatch_concurrency(),
            approval_poll_interval_ms: default_approval_poll_interval_ms(),
            approval_wait_timeout_secs: default_approval_wait_timeout_secs(),
            final_summary_timeout_secs: default_final_summary_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_agentic_turns_is_positive() {
        assert!(LoopConfig::default().max_agentic_turns > 0);
    }

    #[test]
    fn default_loop_detection_limit_is_three() {
        assert_eq!(LoopConfig::default().loop_detection_limit, 3);
    }

    #[test]
    fn default_dispatch_concurrency_is_four() {
        assert_eq!(LoopConfig::default().dispatch_concurrency, 4);
    }

    #[test]
    fn default_explore_enabled_is_true() {
        assert!(LoopConfig::default().explore_enabled);
    }

    #[test]
    fn partial_yaml_fills_missing_fields_with_defaults() {
        let yaml = "max_agentic_turns: 25\n";
        let cfg: LoopConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.max_agentic_turns, 25);
        assert_eq!(cfg.dispatch_concurrency, LoopConfig::default().dispatch_concurrency);
    }

    #[test]
    fn yaml_round_trip_preserves_values() {
        let cfg = LoopConfig {
            max_agentic_turns: 42,
            ..LoopConfig::default()
        };
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: LoopConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(cfg, back);
    }
}
