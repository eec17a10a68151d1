use std::collections::{HashMap, VecDeque};
use std::hash::{BuildHasher, RandomState};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::cache::{Cache, CacheKey};
use crate::config::Options;
use crate::engine::Decision;
use crate::error::Result;

const DEFAULT_SHARDS: usize = 16;
const DEFAULT_CAPACITY: usize = 4096;
const DEFAULT_TTL_SECS: u64 = 30;

/// In-memory decision cache.
///
/// Entries are spread over independently locked shards. Reads take a shared
/// lock and treat expired entries as absent; writes take the shard's
/// exclusive lock, sweep expired entries and evict the oldest insertions
/// once the shard is full. Clones share the same storage.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    shards: Arc<[RwLock<Shard>]>,
    hasher: RandomState,
    capacity: usize,
    ttl: Option<Duration>,
}

#[derive(Debug, Default)]
struct Shard {
    entries: HashMap<CacheKey, CacheEntry>,
    order: VecDeque<CacheKey>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    decision: Decision,
    inserted_at: Instant,
}

impl MemoryCache {
    /// Creates a cache holding about `capacity` decisions without expiry.
    ///
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            shards: Self::make_shards(DEFAULT_SHARDS.min(capacity.max(1))),
            hasher: RandomState::new(),
            capacity,
            ttl: None,
        }
    }

    /// Reads `cache_capacity`, `cache_seconds` and `cache_shards`.
    ///
    /// `cache_seconds = 0` disables caching.
    pub fn from_options(opts: &Options) -> Result<Self> {
        let capacity = opts.parse_or("cache_capacity", DEFAULT_CAPACITY)?;
        let seconds = opts.parse_or("cache_seconds", DEFAULT_TTL_SECS)?;
        let shards = opts.parse_or("cache_shards", DEFAULT_SHARDS)?;
        let capacity = if seconds == 0 { 0 } else { capacity };
        Ok(Self::new(capacity)
            .with_shards(shards)
            .with_ttl(Duration::from_secs(seconds)))
    }

    /// Configures a time-to-live for cache entries.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the number of lock shards, between one and the capacity.
    /// Drops current entries.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = Self::make_shards(shards.clamp(1, self.capacity.max(1)));
        self
    }

    /// Returns the number of live and expired-but-unswept entries.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entries
                    .len()
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn make_shards(count: usize) -> Arc<[RwLock<Shard>]> {
        (0..count).map(|_| RwLock::new(Shard::default())).collect()
    }

    // Shards never outnumber the capacity, so the total stays within it.
    fn shard_capacity(&self) -> usize {
        (self.capacity / self.shards.len()).max(1)
    }

    fn shard(&self, key: &CacheKey) -> &RwLock<Shard> {
        let index = (self.hasher.hash_one(key) as usize) % self.shards.len();
        &self.shards[index]
    }

    fn write(shard: &RwLock<Shard>) -> RwLockWriteGuard<'_, Shard> {
        shard.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(entry: &CacheEntry, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) > ttl
    }

    fn prune_expired(shard: &mut Shard, ttl: Duration, now: Instant) {
        shard
            .entries
            .retain(|_, entry| !Self::is_expired(entry, ttl, now));
        let entries = &shard.entries;
        shard.order.retain(|key| entries.contains_key(key));
    }

    fn evict_if_needed(shard: &mut Shard, capacity: usize) {
        while shard.entries.len() > capacity {
            if let Some(key) = shard.order.pop_front() {
                shard.entries.remove(&key);
            } else {
                break;
            }
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<Decision> {
        if self.capacity == 0 {
            return None;
        }

        let guard = self
            .shard(key)
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = guard.entries.get(key)?;
        if let Some(ttl) = self.ttl
            && Self::is_expired(entry, ttl, Instant::now())
        {
            return None;
        }
        Some(entry.decision.clone())
    }

    async fn set(&self, key: CacheKey, decision: Decision) {
        if self.capacity == 0 {
            return;
        }

        let now = Instant::now();
        let capacity = self.shard_capacity();
        let mut guard = Self::write(self.shard(&key));

        if let Some(ttl) = self.ttl {
            Self::prune_expired(&mut guard, ttl, now);
        }

        let previous = guard.entries.insert(
            key.clone(),
            CacheEntry {
                decision,
                inserted_at: now,
            },
        );
        if previous.is_some() {
            guard.order.retain(|existing| existing != &key);
        }
        guard.order.push_back(key);
        Self::evict_if_needed(&mut guard, capacity);
    }

    async fn invalidate_user(&self, username: &str) {
        for shard in self.shards.iter() {
            let mut guard = Self::write(shard);
            guard.entries.retain(|key, _| key.username() != username);
            guard.order.retain(|key| key.username() != username);
        }
    }

    async fn clear(&self) {
        for shard in self.shards.iter() {
            let mut guard = Self::write(shard);
            guard.entries.clear();
            guard.order.clear();
        }
    }
}
