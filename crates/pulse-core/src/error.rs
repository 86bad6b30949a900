// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Recoverable and fatal error classes the loop can produce.
///
/// Recoverable variants are encoded as `is_error=true` tool results so the
/// model can self-correct on its next turn; fatal variants short-circuit the
/// turn loop while preserving any messages already collected.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{message}")]
    FsmBlocked { message: String },

    #[error("LOOP_DETECTED: {name} blocked after {limit} identical calls. Try a different tool or approach.")]
    LoopDetected { name: String, limit: u32 },

    #[error("STRICT_RESOLUTION: {message}")]
    StrictResolutionBlocked { message: String },

    #[error("read-only violation: {message}")]
    ReadOnlyViolation { message: String },

    #[error("approval denied: {reason}")]
    ApprovalDenied { reason: String },

    #[error("approval timed out waiting for decision on {approval_id}")]
    ApprovalTimeout { approval_id: String },

    #[error("budget exceeded: {message}")]
    BudgetExceeded { message: String },

    #[error("provider error: {0}")]
    ProviderError(#[from] anyhow::Error),

    #[error("session aborted")]
    SessionAborted,
}

impl CoreError {
    /// True for classes the model can self-correct from (encoded as a tool
    /// result rather than surfaced to the caller).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoreError::FsmBlocked { .. }
                | CoreError::LoopDetected { .. }
                | CoreError::StrictResolutionBlocked { .. }
                | CoreError::ReadOnlyViolation { .. }
                | CoreError::ApprovalDenied { .. }
                | CoreError::ApprovalTimeout { .. }
        )
    }
}
