// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::descriptor::ToolDescriptor;
use crate::tool::ToolOutput;

/// Per-call context threaded through to a tool executor. Kept deliberately
/// thin: the loop owns session state, the executor owns side effects.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: String,
}

/// The external side-effecting surface the loop drives. Implementations are
/// assumed stateless with respect to the loop itself — any durable effect of
/// `execute_tool` lives outside this crate.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn list_tools(&self) -> Vec<ToolDescriptor>;

    async fn execute_tool(&self, ctx: &ToolContext, name: &str, input: &serde_json::Value) -> ToolOutput;
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned-response executor for unit and integration tests: maps a tool
    /// name to a fixed [`ToolOutput`] and records every call it receives.
    pub struct MockExecutor {
        descriptors: Vec<ToolDescriptor>,
        responses: HashMap<String, ToolOutput>,
        pub calls: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl MockExecutor {
        pub fn new(descriptors: Vec<ToolDescriptor>, responses: HashMap<String, ToolOutput>) -> Self {
            Self {
                descriptors,
                responses,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ToolExecutor for MockExecutor {
        fn list_tools(&self) -> Vec<ToolDescriptor> {
            self.descriptors.clone()
        }

        async fn execute_tool(&self, _ctx: &ToolContext, name: &str, input: &serde_json::Value) -> ToolOutput {
            self.calls.lock().unwrap().push((name.to_string(), input.clone()));
            self.responses
                .get(name)
                .cloned()
                .unwrap_or_else(|| ToolOutput::err(format!("no such tool: {name}")))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn mock_executor_records_calls_and_returns_scripted_output() {
            let mut responses = HashMap::new();
            responses.insert("pulse_query".to_string(), ToolOutput::ok("vm:101:status=running"));
            let exec = MockExecutor::new(vec![], responses);
            let ctx = ToolContext {
                session_id: "s1".into(),
            };
            let out = exec.execute_tool(&ctx, "pulse_query", &serde_json::json!({"query": "vm 101"})).await;
            assert!(!out.is_error);
            assert_eq!(exec.call_count(), 1);
        }

        #[tokio::test]
        async fn unscripted_tool_name_returns_error() {
            let exec = MockExecutor::new(vec![], HashMap::new());
            let ctx = ToolContext {
                session_id: "s1".into(),
            };
            let out = exec.execute_tool(&ctx, "unknown_tool", &serde_json::json!({})).await;
            assert!(out.is_error);
        }
    }
}
