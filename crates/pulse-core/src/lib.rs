// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
mod compact;
mod dispatch;
mod driver;
mod error;
mod events;
mod explore;
mod fsm;
mod knowledge;
pub mod metrics;
mod phantom;
mod resolved_context;
mod session;

pub use compact::{compact_old_tool_results, prune_messages};
pub use dispatch::{dispatch_tool_calls, DispatchConfig, DispatchOutcome};
pub use driver::{run_turn, TurnContext, TurnOutcome};
pub use error::CoreError;
pub use events::{EventSink, ExploreOutcome, ExplorePhase, ExplorePrepassResult, LoopEvent};
pub use explore::{render_injection, run_explore_prepass, ExploreConfig};
pub use fsm::{classify_tool_call, FsmState, SessionFsm, ToolKind};
pub use knowledge::{Fact, FactCategory, KnowledgeAccumulator};
pub use phantom::{has_phantom_execution, FALLBACK_APOLOGY};
pub use resolved_context::{ResolvedContext, ResolvedResource};
pub use session::{ensure_session, save_session, Session, SessionRecord};
