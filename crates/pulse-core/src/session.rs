// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pulse_model::Message;
use serde::{Deserialize, Serialize};

use crate::fsm::SessionFsm;
use crate::knowledge::KnowledgeAccumulator;
use crate::resolved_context::ResolvedContext;

const TITLE_MAX_RUNES: usize = 50;

/// The durable, serializable half of a session: what gets written to disk.
/// FSM/KA/ResolvedContext are in-memory-only working state, rebuilt fresh
/// on load rather than persisted, since they're derived from message
/// history as the driver replays it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: String::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push(&mut self, message: Message) {
        if self.title.is_empty() && self.messages.is_empty() {
            self.title = derive_title(&message.content);
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
    }
}

/// Breaks on the last space at or before 50 characters, so the title never
/// splits mid-word.
fn derive_title(first_message: &str) -> String {
    let chars: Vec<char> = first_message.chars().collect();
    if chars.len() <= TITLE_MAX_RUNES {
        return first_message.to_string();
    }
    let window: String = chars[..TITLE_MAX_RUNES].iter().collect();
    match window.rfind(' ') {
        Some(idx) if idx > 0 => window[..idx].to_string(),
        _ => window,
    }
}

/// A durable conversation: the record plus the in-memory working state the
/// driver mutates while turning through one user message.
pub struct Session {
    pub record: SessionRecord,
    pub fsm: SessionFsm,
    pub knowledge: KnowledgeAccumulator,
    pub resolved_context: ResolvedContext,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            record: SessionRecord::new(id),
            fsm: SessionFsm::new(),
            knowledge: KnowledgeAccumulator::new(),
            resolved_context: ResolvedContext::default(),
        }
    }

    pub fn from_record(record: SessionRecord) -> Self {
        Self {
            record,
            fsm: SessionFsm::new(),
            knowledge: KnowledgeAccumulator::new(),
            resolved_context: ResolvedContext::default(),
        }
    }

    pub fn clear(&mut self) {
        self.record.messages.clear();
        self.fsm.reset();
        self.knowledge = KnowledgeAccumulator::new();
    }
}

/// Path to a session's JSON file under `data_dir`.
fn session_path(data_dir: &Path, id: &str) -> PathBuf {
    data_dir.join(format!("{id}.json"))
}

/// Loads a session record from disk if present, otherwise creates a fresh
/// one. Callers are expected to call this once per incoming user message
/// (`EnsureSession`).
pub fn ensure_session(data_dir: &Path, id: &str) -> anyhow::Result<SessionRecord> {
    let path = session_path(data_dir, id);
    if path.exists() {
        let text = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    } else {
        Ok(SessionRecord::new(id))
    }
}

/// Persists a session record as `0600`-mode JSON under a `0700`-mode
/// directory.
#[cfg(unix)]
pub fn save_session(data_dir: &Path, record: &SessionRecord) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(data_dir)?;
    std::fs::set_permissions(data_dir, std::fs::Permissions::from_mode(0o700))?;

    let path = session_path(data_dir, &record.id);
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(&path, json)?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn save_session(data_dir: &Path, record: &SessionRecord) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let path = session_path(data_dir, &record.id);
    std::fs::write(&path, serde_json::to_string_pretty(record)?)?;
    Ok(())
}
