//! TTL cache for discovered schema sets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use super::types::DiscoveryFilter;
use crate::schema::{ProfileDepth, Schema};

#[derive(Debug, Clone)]
struct CacheEntry {
    schemas: Arc<Vec<Schema>>,
    skipped: Arc<Vec<String>>,
    inserted_at: Instant,
}

/// A cached discovery result.
#[derive(Debug, Clone)]
pub struct CachedSchemas {
    pub schemas: Arc<Vec<Schema>>,
    pub skipped: Arc<Vec<String>>,
    pub age: Duration,
}

/// Schema sets keyed by the filter that produced them.
///
/// Backed by a sharded map, so a refresh of one key does not block reads of
/// other keys.
#[derive(Debug)]
pub struct SchemaCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Statistics about the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

impl SchemaCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache key: SHA-256 over the canonical JSON of the filter and depth.
    pub fn key_for(filter: &DiscoveryFilter, depth: ProfileDepth) -> String {
        let mut hasher = Sha256::new();
        // Serializing plain data into a Vec cannot fail.
        hasher.update(serde_json::to_vec(filter).unwrap_or_default());
        hasher.update(format!("{depth:?}").as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Live entry for `key`; expired entries count as misses and are dropped.
    pub fn get(&self, key: &str) -> Option<CachedSchemas> {
        let found = self.entries.get(key).and_then(|entry| {
            let age = entry.inserted_at.elapsed();
            (age < self.ttl).then(|| CachedSchemas {
                schemas: Arc::clone(&entry.schemas),
                skipped: Arc::clone(&entry.skipped),
                age,
            })
        });
        match found {
            Some(cached) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(cached)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.entries
                    .remove_if(key, |_, entry| entry.inserted_at.elapsed() >= self.ttl);
                None
            }
        }
    }

    pub fn insert(&self, key: String, schemas: Vec<Schema>, skipped: Vec<String>) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.remove_expired();
            if self.entries.len() >= self.max_entries {
                self.evict_oldest();
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                schemas: Arc::new(schemas),
                skipped: Arc::new(skipped),
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drops one key. Returns true if it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every cached set that contains `event_type`.
    pub fn invalidate_event_type(&self, event_type: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.schemas.iter().any(|s| s.name == event_type));
        before - self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn remove_expired(&self) {
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.inserted_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let total_entries = self.entries.len();
        let expired_entries = self
            .entries
            .iter()
            .filter(|entry| entry.inserted_at.elapsed() >= self.ttl)
            .count();
        CacheStats {
            total_entries,
            expired_entries,
            active_entries: total_entries - expired_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
