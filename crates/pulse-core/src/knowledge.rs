// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::OnceLock;

/// A single extracted fact, keyed for cheap lookup and prefix search.
#[derive(Debug, Clone)]
pub struct Fact {
    pub category: FactCategory,
    pub key: String,
    pub value: String,
    pub turn: u32,
    pub tool_use_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactCategory {
    Resource,
    Topology,
    Status,
    Metric,
    Log,
    Config,
}

/// Coarse keys that expand to the union of matching per-resource facts
/// already recorded, rather than being extracted directly.
const MARKER_EXPANSIONS: &[(&str, &str)] = &[("all_vms_status", "vm:"), ("all_hosts_status", "host:")];

/// Append-only store of facts extracted from tool results, used both to
/// short-circuit redundant calls (the knowledge gate) and to enrich
/// compacted history.
#[derive(Debug, Default)]
pub struct KnowledgeAccumulator {
    facts: Vec<Fact>,
    by_key: HashMap<String, usize>,
    /// Keys that were predicted for a tool use but produced no facts; a
    /// negative marker so the gate doesn't keep retrying.
    negative_markers: HashMap<String, String>,
}

/// Per-tool extraction function: same signature as `extract_facts` minus
/// `self`, so the registry can store them as plain function pointers.
type ExtractorFn = fn(&str, u32, &str, &serde_json::Value) -> Vec<Fact>;

/// List-shaped JSON results emit a count plus one fact per item's
/// `id`/`status`; object-shaped results with a `status` or metric-like
/// field emit a single per-resource fact. Tools not found in the registry
/// fall back to this same shape-based extraction — it's deterministic and
/// name-agnostic, so there's nothing tool-specific to gain by registering
/// most tools explicitly.
fn extract_shape_based(tool_name: &str, turn: u32, tool_use_id: &str, result_json: &serde_json::Value) -> Vec<Fact> {
    let mut facts = Vec::new();

    if let Some(items) = result_json.as_array() {
        facts.push(Fact {
            category: FactCategory::Topology,
            key: format!("{tool_name}:count"),
            value: items.len().to_string(),
            turn,
            tool_use_id: tool_use_id.to_string(),
        });
        for item in items {
            if let (Some(id), Some(status)) = (item.get("id").and_then(|v| v.as_str()), item.get("status").and_then(|v| v.as_str())) {
                facts.push(Fact {
                    category: FactCategory::Status,
                    key: format!("{id}:status"),
                    value: status.to_string(),
                    turn,
                    tool_use_id: tool_use_id.to_string(),
                });
            }
        }
    } else if let Some(obj) = result_json.as_object() {
        let id = obj.get("id").and_then(|v| v.as_str()).unwrap_or(tool_name);
        for (field, category) in [("status", FactCategory::Status), ("cpu", FactCategory::Metric), ("memory", FactCategory::Metric)] {
            if let Some(v) = obj.get(field) {
                facts.push(Fact {
                    category,
                    key: format!("{id}:{field}"),
                    value: scalar_to_string(v),
                    turn,
                    tool_use_id: tool_use_id.to_string(),
                });
            }
        }
    }

    facts
}

/// Process-wide table of per-tool extractors, built once on first use.
/// Known tool names route to their registered extractor; anything else
/// falls back to `extract_shape_based`.
fn extractor_registry() -> &'static HashMap<&'static str, ExtractorFn> {
    static REGISTRY: OnceLock<HashMap<&'static str, ExtractorFn>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut m: HashMap<&'static str, ExtractorFn> = HashMap::new();
        m.insert("pulse_query", extract_shape_based);
        m.insert("pulse_metrics", extract_shape_based);
        m.insert("pulse_status_check", extract_shape_based);
        m
    })
}

impl KnowledgeAccumulator {
    pub fn new() -> Self {
        extractor_registry();
        Self::default()
    }

    /// Looks up `tool_name` in the extractor registry, falling back to
    /// shape-based extraction for unregistered tools.
    pub fn extract_facts(&mut self, tool_name: &str, turn: u32, tool_use_id: &str, result_json: &serde_json::Value) -> Vec<Fact> {
        let extractor = extractor_registry().get(tool_name).copied().unwrap_or(extract_shape_based);
        let facts = extractor(tool_name, turn, tool_use_id, result_json);

        for fact in &facts {
            self.by_key.insert(fact.key.clone(), self.facts.len());
            self.facts.push(fact.clone());
        }
        facts
    }

    /// Predicts the keys a call *would* produce, without executing it.
    /// Used by the knowledge gate to decide whether a cache hit is possible.
    /// A tool name that reads as a bulk listing (`pulse_list_vms`, etc.)
    /// predicts the matching marker key instead of a per-resource key, since
    /// no single resource ID is available yet to predict a `{id}:status` key.
    pub fn predict_fact_keys(&self, tool_name: &str, input: &serde_json::Value) -> Vec<String> {
        if let Some(id) = input.get("id").and_then(|v| v.as_str()).or_else(|| input.get("target").and_then(|v| v.as_str())) {
            return vec![format!("{id}:status")];
        }
        for (marker, prefix) in MARKER_EXPANSIONS {
            if tool_name.contains(prefix.trim_end_matches(':')) {
                return vec![(*marker).to_string()];
            }
        }
        vec![format!("{tool_name}:count")]
    }

    pub fn add_fact_for_tool(&mut self, fact: Fact) {
        self.by_key.insert(fact.key.clone(), self.facts.len());
        self.facts.push(fact);
    }

    pub fn lookup(&self, key: &str) -> Option<&Fact> {
        let &idx = self.by_key.get(key)?;
        self.facts.get(idx)
    }

    /// A coarse marker key (`all_vms_status`) stands for the union of every
    /// per-resource fact already recorded under its prefix, not one fact —
    /// callers that need a single value should use `lookup` instead.
    pub fn expand_marker(&self, key: &str) -> Vec<&Fact> {
        MARKER_EXPANSIONS
            .iter()
            .find(|(marker, _)| *marker == key)
            .map(|(_, prefix)| self.facts.iter().filter(|f| f.key.starts_with(prefix)).collect())
            .unwrap_or_default()
    }

    pub fn all_keys_present(&self, keys: &[String]) -> bool {
        !keys.is_empty()
            && keys
                .iter()
                .all(|k| self.lookup(k).is_some() || self.negative_markers.contains_key(k) || !self.expand_marker(k).is_empty())
    }

    pub fn mark_negative(&mut self, key: impl Into<String>, summary: impl Into<String>) {
        self.negative_markers.insert(key.into(), summary.into());
    }

    pub fn fact_summary_for_tool(&self, tool_use_id: &str) -> Option<String> {
        let matching: Vec<&Fact> = self.facts.iter().filter(|f| f.tool_use_id == tool_use_id).collect();
        if matching.is_empty() {
            return None;
        }
        Some(matching.iter().map(|f| format!("{}={}", f.key, f.value)).collect::<Vec<_>>().join(","))
    }

    pub fn related_facts(&self, prefix: &str) -> Vec<&Fact> {
        self.facts.iter().filter(|f| f.key.starts_with(prefix)).collect()
    }

    /// Renders the current fact set as a bullet list for system-prompt
    /// injection ("what we already know").
    pub fn render_bullets(&self) -> String {
        self.facts.iter().map(|f| format!("- {}: {}", f.key, f.value)).collect::<Vec<_>>().join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

/// Renders a JSON scalar the way an operator would type it: bare strings,
/// not `"quoted"` ones.
fn scalar_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_count_fact_from_list_result() {
        let mut ka = KnowledgeAccumulator::new();
        let result = serde_json::json!([{"id":"vm:101","status":"running"}]);
        let facts = ka.extract_facts("pulse_query", 0, "c1", &result);
        assert!(facts.iter().any(|f| f.key == "pulse_query:count" && f.value == "1"));
        assert!(facts.iter().any(|f| f.key == "vm:101:status" && f.value == "running"));
    }

    #[test]
    fn extracts_status_fact_from_object_result() {
        let mut ka = KnowledgeAccumulator::new();
        let result = serde_json::json!({"id":"vm:101","status":"running","cpu":42});
        ka.extract_facts("pulse_metrics", 0, "c1", &result);
        assert_eq!(ka.lookup("vm:101:status").unwrap().value, "running");
        assert_eq!(ka.lookup("vm:101:cpu").unwrap().value, "42");
    }

    #[test]
    fn predicted_keys_present_enables_cache_hit() {
        let mut ka = KnowledgeAccumulator::new();
        ka.extract_facts("pulse_query", 0, "c1", &serde_json::json!({"id":"vm:101","status":"running"}));
        let keys = ka.predict_fact_keys("pulse_query", &serde_json::json!({"id":"vm:101"}));
        assert!(ka.all_keys_present(&keys));
    }

    #[test]
    fn negative_marker_satisfies_gate_without_a_fact() {
        let mut ka = KnowledgeAccumulator::new();
        ka.mark_negative("vm:999:status", "checked: not found");
        assert!(ka.all_keys_present(&["vm:999:status".to_string()]));
    }

    #[test]
    fn empty_keys_never_satisfy_the_gate() {
        let ka = KnowledgeAccumulator::new();
        assert!(!ka.all_keys_present(&[]));
    }

    #[test]
    fn fact_summary_for_tool_joins_all_its_facts() {
        let mut ka = KnowledgeAccumulator::new();
        ka.extract_facts("pulse_query", 0, "c1", &serde_json::json!({"id":"vm:101","status":"running"}));
        let summary = ka.fact_summary_for_tool("c1").unwrap();
        assert!(summary.contains("vm:101:status=running"));
    }

    #[test]
    fn bulk_listing_tool_predicts_a_marker_key() {
        let ka = KnowledgeAccumulator::new();
        let keys = ka.predict_fact_keys("pulse_list_vms", &serde_json::json!({}));
        assert_eq!(keys, vec!["all_vms_status".to_string()]);
    }

    #[test]
    fn marker_key_expands_to_union_of_per_resource_facts() {
        let mut ka = KnowledgeAccumulator::new();
        ka.extract_facts(
            "pulse_query",
            0,
            "c1",
            &serde_json::json!([{"id":"vm:101","status":"running"},{"id":"vm:102","status":"stopped"}]),
        );
        let keys = ka.predict_fact_keys("pulse_list_vms", &serde_json::json!({}));
        assert_eq!(ka.expand_marker("all_vms_status").len(), 2);
        assert!(ka.all_keys_present(&keys));
    }

    #[test]
    fn related_facts_filters_by_prefix() {
        let mut ka = KnowledgeAccumulator::new();
        ka.extract_facts("pulse_query", 0, "c1", &serde_json::json!({"id":"vm:101","status":"running"}));
        ka.extract_facts("pulse_query", 0, "c2", &serde_json::json!({"id":"host:a","status":"up"}));
        assert_eq!(ka.related_facts("vm:").len(), 1);
    }
}
