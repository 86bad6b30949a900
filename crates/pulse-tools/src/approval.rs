// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

/// Current disposition of an approval request. Transitions are made by an
/// external actor (operator UI, chat command) outside this crate; the loop
/// only ever polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRecord {
    pub approval_id: String,
    pub status: ApprovalStatus,
}

/// Durable (or in-memory, for tests) lookup of approval decisions. The loop
/// never writes to this store — only external actors set a decision.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn get_approval(&self, id: &str) -> Option<ApprovalRecord>;
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store whose decisions are set directly by test code,
    /// simulating the out-of-band actor described by the trait contract.
    #[derive(Default)]
    pub struct InMemoryApprovalStore {
        records: Mutex<HashMap<String, ApprovalRecord>>,
    }

    impl InMemoryApprovalStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_status(&self, approval_id: impl Into<String>, status: ApprovalStatus) {
            let approval_id = approval_id.into();
            self.records.lock().unwrap().insert(
                approval_id.clone(),
                ApprovalRecord { approval_id, status },
            );
        }
    }

    #[async_trait]
    impl ApprovalStore for InMemoryApprovalStore {
        async fn get_approval(&self, id: &str) -> Option<ApprovalRecord> {
            self.records.lock().unwrap().get(id).cloned()
        }
    }

}
