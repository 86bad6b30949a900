// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use crate::LoopConfig;

/// Apply environment-variable overrides on top of a base configuration.
///
/// Every field may be overridden by a `PULSE_<FIELD_NAME_UPPERCASE>`
/// variable; unparsable or absent variables are silently ignored so a
/// malformed environment never prevents startup — the loop always has a
/// usable configuration.
pub fn apply_env_overrides(mut cfg: LoopConfig) -> LoopConfig {
    macro_rules! override_field {
        ($field:ident, $env:literal, $parse:ty) => {
            if let Ok(raw) = std::env::var($env) {
                match raw.parse::<$parse>() {
                    Ok(v) => cfg.$field = v,
                    Err(_) => {
                        tracing::warn!(var = $env, value = %raw, "ignoring unparsable override");
                    }
                }
            }
        };
    }

    override_field!(max_agentic_turns, "PULSE_MAX_AGENTIC_TURNS", u32);
    override_field!(max_context_messages, "PULSE_MAX_CONTEXT_MESSAGES", usize);
    override_field!(max_tool_result_chars, "PULSE_MAX_TOOL_RESULT_CHARS", usize);
    override_field!(stateless_context, "PULSE_STATELESS_CONTEXT", bool);
    override_field!(explore_enabled, "PULSE_EXPLORE_ENABLED", bool);
    override_field!(explore_max_turns, "PULSE_EXPLORE_MAX_TURNS", u32);
    override_field!(explore_timeout_secs, "PULSE_EXPLORE_TIMEOUT_SECS", u64);
    override_field!(recovery_ttl_secs, "PULSE_RECOVERY_TTL_SECS", u64);

    cfg
}

/// Load a [`LoopConfig`] from an optional YAML file, then apply environment
/// overrides. A missing or unreadable file falls back to defaults rather
/// than failing startup.
pub fn load(path: Option<&std::path::Path>) -> LoopConfig {
    let base = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(text) => serde_yaml::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %p.display(), error = %e, "invalid config file, using defaults");
                LoopConfig::default()
            }),
            Err(_) => LoopConfig::default(),
        },
        None => LoopConfig::default(),
    };
    apply_env_overrides(base)
}
