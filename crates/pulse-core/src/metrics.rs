// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::OnceLock;

use metrics_exporter_prometheus::PrometheusHandle;

static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the process-wide Prometheus recorder, if one hasn't been
/// installed already. Safe to call from every session; only the first call
/// takes effect.
pub fn install() -> &'static PrometheusHandle {
    RECORDER.get_or_init(|| {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus recorder installs exactly once per process")
    })
}

/// Renders the current metric snapshot in Prometheus text-exposition format.
/// Returns an empty string if [`install`] was never called.
pub fn render() -> String {
    match RECORDER.get() {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}

/// Sanitizes a value before it's used as a metric label: metrics backends
/// choke on blank labels, and unbounded operator-supplied strings (tool
/// names, session titles) shouldn't be allowed to blow up label cardinality.
pub fn sanitize_label(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "unknown".to_string();
    }
    let cleaned: String = trimmed.chars().map(|c| if c.is_whitespace() { '_' } else { c }).collect();
    cleaned.chars().take(64).collect()
}

pub fn record_turn(tool_kind: &str, success: bool) {
    let kind = sanitize_label(tool_kind);
    metrics::counter!("pulse_tool_calls_total", "kind" => kind, "success" => success.to_string()).increment(1);
}

pub fn record_tool_duration(tool_name: &str, millis: f64) {
    let name = sanitize_label(tool_name);
    metrics::histogram!("pulse_tool_duration_ms", "tool" => name).record(millis);
}

pub fn record_active_sessions(count: u64) {
    metrics::gauge!("pulse_active_sessions").set(count as f64);
}

/// A tool call was blocked by the FSM, rejected by strict resolution, or
/// otherwise failed in a way the model can self-correct from on its next
/// turn (encoded as an `is_error=true` tool result rather than a fatal
/// error).
pub fn record_recoverable_error(reason: &str) {
    metrics::counter!("pulse_recoverable_error_total", "reason" => sanitize_label(reason)).increment(1);
}

/// A tracked pending recovery (an earlier recoverable error against this
/// tool) was cleared by a subsequent successful call to the same tool.
pub fn record_recovery_success(tool_name: &str) {
    metrics::counter!("pulse_recovery_success_total", "tool" => sanitize_label(tool_name)).increment(1);
}

/// The same `(tool, canonical input)` pair was called more than
/// `LOOP_DETECTION_LIMIT` times within one turn's dispatch batch.
pub fn record_loop_detected(tool_name: &str) {
    metrics::counter!("pulse_loop_detected_total", "tool" => sanitize_label(tool_name)).increment(1);
}

/// A failed tool call carried `auto_recoverable: true` and was retried once
/// with the provider's suggested rewrite.
pub fn record_auto_recovery(tool_name: &str) {
    metrics::counter!("pulse_auto_recovery_total", "tool" => sanitize_label(tool_name)).increment(1);
}
