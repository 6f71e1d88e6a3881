//! Generic TTL cache.
//!
//! Each entry is stamped when stored. A read that finds an entry older than
//! the TTL removes it and reports a miss in the same call, so `get` and `has`
//! can never disagree about staleness.

use std::{borrow::Borrow, collections::HashMap, hash::Hash, time::Duration};

use parley_core::Environment;
use regex::Regex;

use crate::error::CacheError;

/// A stored value and when it was stored.
#[derive(Debug, Clone)]
struct CacheEntry<V, I> {
    value: V,
    stored_at: I,
}

/// Key/value store whose entries expire after a fixed TTL.
///
/// Separate instances are used per entity class so their expiry timing is
/// independent.
#[derive(Debug, Clone)]
pub struct EntityCache<K, V, E: Environment> {
    env: E,
    ttl: Duration,
    entries: HashMap<K, CacheEntry<V, E::Instant>>,
}

impl<K, V, E> EntityCache<K, V, E>
where
    K: Eq + Hash,
    E: Environment,
{
    /// Create an empty cache.
    ///
    /// # Errors
    ///
    /// - `CacheError::InvalidTtl` if `ttl` is zero
    pub fn new(env: E, ttl: Duration) -> Result<Self, CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }
        Ok(Self { env, ttl, entries: HashMap::new() })
    }

    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value`, replacing any existing entry and restarting its TTL.
    pub fn set(&mut self, key: K, value: V) {
        let stored_at = self.env.now();
        self.entries.insert(key, CacheEntry { value, stored_at });
    }

    /// Fresh value for `key`, evicting it if it has expired.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = self.env.now();
        let expired = now - self.entries.get(key)?.stored_at > self.ttl;

        if expired {
            self.entries.remove(key);
            tracing::trace!("cache entry expired");
            return None;
        }

        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Mutable access to a fresh value. Does not restart its TTL.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.get(key)?;
        self.entries.get_mut(key).map(|entry| &mut entry.value)
    }

    /// Same answer as `get(key).is_some()`, with the same eviction.
    pub fn has<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Remove `key`. Returns whether an entry existed.
    pub fn invalidate<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.remove(key).is_some()
    }

    /// Remove every key matching `predicate`. Returns how many were removed.
    pub fn invalidate_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        before - self.entries.len()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.env.now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.stored_at <= ttl);
        before - self.entries.len()
    }

    /// Stored entries, including any that expired but were not read since.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V, E> EntityCache<K, V, E>
where
    K: Eq + Hash + AsRef<str>,
    E: Environment,
{
    /// Remove every key matching `pattern`. Returns how many were removed.
    pub fn invalidate_pattern(&mut self, pattern: &Regex) -> usize {
        let removed = self.invalidate_where(|key| pattern.is_match(key.as_ref()));
        tracing::debug!(pattern = pattern.as_str(), removed, "cache entries invalidated");
        removed
    }
}
