// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! An in-memory [`ModelProvider`] used only by pulse-core's own test suite.
//! Feature-gated behind `mock` so it never ships in a real build.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio_stream::wrappers::ReceiverStream;

use crate::provider::{ModelProvider, ResponseStream};
use crate::types::{CompletionRequest, ResponseEvent};

/// One pre-scripted model turn: the events to emit, in order.
pub type ScriptedTurn = Vec<ResponseEvent>;

/// Replays a fixed sequence of turns, one per `chat_stream` call. Panics if
/// called more times than scripted — tests should script exactly as many
/// turns as the scenario under test requires.
pub struct MockProvider {
    name: String,
    turns: Mutex<std::collections::VecDeque<ScriptedTurn>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>, turns: Vec<ScriptedTurn>) -> Self {
        Self {
            name: name.into(),
            turns: Mutex::new(turns.into()),
        }
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat_stream(&self, _req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("mock provider '{}' exhausted its scripted turns", self.name))?;

        let (tx, rx) = tokio::sync::mpsc::channel(turn.len().max(1));
        tokio::spawn(async move {
            for event in turn {
                if tx.send(Ok(event)).await.is_err() {
                    break;
                }
            }
        });
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
