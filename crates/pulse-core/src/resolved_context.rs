// Copyright (c) 2026 Pulse Agent Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;

const DEFAULT_TTL_SECS: i64 = 1_800;
const DEFAULT_CAPACITY: usize = 200;

/// A resolved alias or canonical resource ID, carrying the routing data
/// needed to dispatch an action against it.
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    pub canonical_id: String,
    pub target_host: String,
    pub agent_id: String,
    pub adapter: String,
    pub allowed_actions: Vec<String>,
    pub best_executor: Option<String>,
    pub aliases: Vec<String>,
}

/// LRU+TTL map from alias strings and canonical resource IDs
/// (`kind:host:provider_uid`) to resolved routing records. Pinned entries
/// bypass both TTL expiry and LRU eviction.
pub struct ResolvedContext {
    cache: LruCache<String, ResolvedResource>,
    inserted_at: HashMap<String, DateTime<Utc>>,
    pinned: HashSet<String>,
    ttl_secs: i64,
}

impl ResolvedContext {
    pub fn new(capacity: usize, ttl_secs: i64) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
            inserted_at: HashMap::new(),
            pinned: HashSet::new(),
            ttl_secs,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, resource: ResolvedResource) {
        let key = key.into();
        if !self.cache.contains(&key) && self.cache.len() >= self.cache.cap().get() {
            self.evict_one_unpinned();
        }
        self.inserted_at.insert(key.clone(), Utc::now());
        self.cache.put(key, resource);
    }

    pub fn pin(&mut self, key: impl Into<String>) {
        self.pinned.insert(key.into());
    }

    /// Evicts the least-recently-used *unpinned* entry to make room for an
    /// insert at capacity. If every entry happens to be pinned, falls back to
    /// the true LRU victim rather than growing past capacity.
    fn evict_one_unpinned(&mut self) {
        let pinned = &self.pinned;
        let victim = self.cache.iter().rev().find(|(k, _)| !pinned.contains(*k)).map(|(k, _)| k.clone());
        match victim {
            Some(key) => {
                self.cache.pop(&key);
                self.inserted_at.remove(&key);
            }
            None => {
                if let Some((key, _)) = self.cache.pop_lru() {
                    self.inserted_at.remove(&key);
                }
            }
        }
    }

    /// Returns the resource for `key` unless it's expired and unpinned, in
    /// which case it's evicted and `None` is returned.
    pub fn get(&mut self, key: &str) -> Option<&ResolvedResource> {
        if !self.pinned.contains(key) {
            if let Some(&inserted) = self.inserted_at.get(key) {
                if Utc::now() - inserted > Duration::seconds(self.ttl_secs) {
                    self.cache.pop(key);
                    self.inserted_at.remove(key);
                    return None;
                }
            }
        }
        self.cache.get(key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for ResolvedContext {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL_SECS)
    }
}

fn sample_resource(id: &str) -> ResolvedResource {
    ResolvedResource {
        canonical_id: id.to_string(),
        target_host: "host-a".into(),
        agent_id: "agent-1".into(),
        adapter: "proxmox".into(),
        allowed_actions: vec!["restart".into(), "stop".into()],
        best_executor: Some("agent-1".into()),
        aliases: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_entry_is_retrievable() {
        let mut ctx = ResolvedContext::new(10, 1_800);
        ctx.insert("vm:101", sample_resource("vm:host-a:101"));
        assert!(ctx.get("vm:101").is_some());
    }

    #[test]
    fn expired_entry_is_evicted_on_access() {
        let mut ctx = ResolvedContext::new(10, -1);
        ctx.insert("vm:101", sample_resource("vm:host-a:101"));
        assert!(ctx.get("vm:101").is_none());
        assert_eq!(ctx.len(), 0);
    }

    #[test]
    fn pinned_entry_survives_ttl_expiry() {
        let mut ctx = ResolvedContext::new(10, -1);
        ctx.insert("vm:101", sample_resource("vm:host-a:101"));
        ctx.pin("vm:101");
        assert!(ctx.get("vm:101").is_some());
    }

    #[test]
    fn lru_eviction_respects_capacity() {
        let mut ctx = ResolvedContext::new(1, 1_800);
        ctx.insert("vm:101", sample_resource("vm:host-a:101"));
        ctx.insert("vm:102", sample_resource("vm:host-a:102"));
        assert_eq!(ctx.len(), 1);
        assert!(ctx.get("vm:101").is_none());
        assert!(ctx.get("vm:102").is_some());
    }

    #[test]
    fn pinned_entry_survives_lru_capacity_eviction() {
        let mut ctx = ResolvedContext::new(2, 1_800);
        ctx.insert("vm:101", sample_resource("vm:host-a:101"));
        ctx.pin("vm:101");
        ctx.insert("vm:102", sample_resource("vm:host-a:102"));
        ctx.insert("vm:103", sample_resource("vm:host-a:103"));
        assert_eq!(ctx.len(), 2);
        assert!(ctx.get("vm:101").is_some());
        assert!(ctx.get("vm:103").is_some());
        assert!(ctx.get("vm:102").is_none());
    }

    #[test]
    fn default_starts_empty() {
        let ctx = ResolvedContext::default();
        assert!(ctx.is_empty());
    }
}
