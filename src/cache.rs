//! Bounded cache of successful runs.
//!
//! Runs are deterministic in their source, context and limits, so a
//! completed result can be replayed. Failures are never cached.

use crate::config::ResourceLimits;
use crate::errors::Result;
use crate::protocol::ExecutionResult;
use crate::value::Value;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

/// Cache key: hex SHA-256 over source, context and limits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(
        source: &str,
        context: &BTreeMap<String, Value>,
        limits: &ResourceLimits,
    ) -> Result<CacheKey> {
        #[derive(Serialize)]
        struct Keyed<'a> {
            source: &'a str,
            context: &'a BTreeMap<String, Value>,
            limits: &'a ResourceLimits,
        }

        let canonical = serde_json::to_vec(&Keyed {
            source,
            context,
            limits,
        })?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        let digest = hasher.finalize();
        Ok(CacheKey(
            digest.iter().map(|b| format!("{:02x}", b)).collect(),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

struct Entries {
    map: HashMap<CacheKey, ExecutionResult>,
    /// Least recently used at the front
    order: VecDeque<CacheKey>,
}

impl Entries {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

/// LRU cache of completed results, safe to share between runs.
pub struct ResultCache {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        // A panic while holding the lock leaves the map consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &CacheKey) -> Option<ExecutionResult> {
        let mut entries = self.lock();
        let hit = entries.map.get(key).cloned();
        if hit.is_some() {
            entries.touch(key);
            debug!(key = key.as_str(), "cache hit");
        }
        hit
    }

    pub fn insert(&self, key: CacheKey, result: ExecutionResult) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.lock();
        if entries.map.insert(key.clone(), result).is_some() {
            entries.touch(&key);
            return;
        }
        entries.order.push_back(key);
        while entries.order.len() > self.capacity {
            if let Some(evicted) = entries.order.pop_front() {
                entries.map.remove(&evicted);
                debug!(key = evicted.as_str(), "cache eviction");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.map.clear();
        entries.order.clear();
    }
}
