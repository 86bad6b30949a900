// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::types::{CompletionRequest, ResponseEvent};

/// Stream of [`ResponseEvent`]s produced by a single [`ModelProvider::chat_stream`] call.
pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// A chat-completion backend the driver can turn a conversation through.
///
/// The core never speaks to a vendor API directly; every call goes through
/// this trait so the loop, dispatcher and compactor stay provider-agnostic.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Begin a streamed completion for `req`. Implementations should emit
    /// `Content`/`Thinking` deltas as they arrive and exactly one `Done` (or
    /// `Error`) as the terminal event.
    async fn chat_stream(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;

    /// Context-window size in tokens, used for budget accounting. Providers
    /// that cannot report this return a conservative default.
    fn context_window(&self) -> usize {
        128_000
    }
}
