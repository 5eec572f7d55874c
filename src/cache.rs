//! TTL- and size-bounded key→value stores for per-actor capability state.
//!
//! One [`StateCache`] instance exists per state category (cooldowns, toggles), each
//! with its own policy. These caches are the only structures in this crate intended
//! to be shared between the simulation thread and scheduled background jobs; they
//! synchronize internally, so callers never take a lock of their own.

use core::fmt;
use core::hash::Hash;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use arcstr::ArcStr;
use hashbrown::HashMap;

use crate::actor::ActorId;

/// Bounds applied to a [`StateCache`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(clippy::exhaustive_structs)]
pub struct CachePolicy {
    /// Entries older than this are treated as absent. [`None`] means entries do not
    /// expire.
    pub ttl: Option<Duration>,
    /// Maximum number of entries; exceeding it evicts the oldest-written entry.
    pub capacity: usize,
}

/// A concurrent key→value store with lazy TTL expiry and write-order eviction.
///
/// An entry is authoritative only until its TTL elapses: no entry is ever returned
/// after that, even if eviction has not yet physically run (expiry is checked on
/// read). Absence of an entry means “use the default policy”, which is the caller's
/// business — see [`CooldownCache`] and [`ToggleCache`].
///
/// Time is passed in explicitly to the `*_at` methods so that scheduled jobs can use
/// one consistent timestamp per run and tests need not sleep; the plain methods use
/// [`Instant::now()`].
pub struct StateCache<K, V> {
    policy: CachePolicy,
    inner: Mutex<Inner<K, V>>,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Keys in insertion order, for eviction. Contains exactly the keys of `entries`
    /// (re-insertion moves a key to the back).
    write_order: VecDeque<K>,
}

#[derive(Clone, Debug)]
struct Entry<V> {
    value: V,
    inserted: Instant,
}

impl<K: Eq + Hash + Clone, V: Clone> StateCache<K, V> {
    /// Constructs an empty cache with the given policy.
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                write_order: VecDeque::new(),
            }),
        }
    }

    /// The policy this cache was constructed with.
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Retrieves the value for `key`, if present and unexpired.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// As [`Self::get`], with an explicit current time.
    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        match inner.entries.get(key) {
            Some(entry) if !self.expired(entry, now) => Some(entry.value.clone()),
            Some(_) => {
                // Lazy expiry: drop the stale entry now that we have noticed it.
                inner.entries.remove(key);
                inner.write_order.retain(|k| k != key);
                None
            }
            None => None,
        }
    }

    /// Stores `value` under `key`, replacing any existing entry and evicting the
    /// oldest-written entry if the capacity would be exceeded.
    pub fn put(&self, key: K, value: V) {
        self.put_at(key, value, Instant::now());
    }

    /// As [`Self::put`], with an explicit current time (used as the insertion time
    /// from which the TTL is measured).
    pub fn put_at(&self, key: K, value: V, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.remove(&key).is_some() {
            inner.write_order.retain(|k| k != &key);
        }
        while inner.entries.len() >= self.policy.capacity.max(1) {
            match inner.write_order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        inner.entries.insert(
            key.clone(),
            Entry {
                value,
                inserted: now,
            },
        );
        inner.write_order.push_back(key);
    }

    /// Removes the entry for `key`, if any.
    pub fn invalidate(&self, key: &K) {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.remove(key).is_some() {
            inner.write_order.retain(|k| k != key);
        }
    }

    /// Removes every entry whose key matches the predicate.
    pub fn invalidate_if(&self, mut predicate: impl FnMut(&K) -> bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.retain(|k, _| !predicate(k));
        let Inner {
            entries,
            write_order,
        } = &mut *inner;
        write_order.retain(|k| entries.contains_key(k));
    }

    /// Removes all entries.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.write_order.clear();
    }

    /// Number of entries physically present (possibly including expired entries that
    /// have not yet been noticed by a read).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Whether the cache is physically empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        match self.policy.ttl {
            Some(ttl) => now.saturating_duration_since(entry.inserted) >= ttl,
            None => false,
        }
    }
}

impl<K, V> fmt::Debug for StateCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("StateCache");
        s.field("policy", &self.policy);
        match self.inner.try_lock() {
            Ok(inner) => s.field("len", &inner.entries.len()),
            Err(_) => s.field("len", &"?"),
        };
        s.finish_non_exhaustive()
    }
}

/// Key for per-actor, per-capability cache entries.
pub type StateKey = (ActorId, ArcStr);

/// Cooldown state: which (actor, capability) pairs have recently fired.
///
/// The cached value is the instant at which the cooldown ends. An absent entry means
/// “no cooldown active”.
#[derive(Debug)]
pub struct CooldownCache {
    cache: StateCache<StateKey, Instant>,
}

impl CooldownCache {
    /// Constructs an empty cooldown cache.
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            cache: StateCache::new(policy),
        }
    }

    /// Begins a cooldown of the given duration.
    pub fn begin(&self, actor: ActorId, capability: &ArcStr, duration: Duration, now: Instant) {
        self.cache
            .put_at((actor, capability.clone()), now + duration, now);
    }

    /// Returns the remaining cooldown time, or [`None`] if no cooldown is active.
    pub fn remaining(&self, actor: ActorId, capability: &ArcStr, now: Instant) -> Option<Duration> {
        let key = (actor, capability.clone());
        let end = self.cache.get_at(&key, now)?;
        if end > now {
            Some(end - now)
        } else {
            self.cache.invalidate(&key);
            None
        }
    }

    /// Discards all state for the given actor (on departure).
    pub fn purge_actor(&self, actor: ActorId) {
        self.cache.invalidate_if(|(a, _)| *a == actor);
    }
}

/// Toggle state: which (actor, capability) pairs the actor has explicitly disabled
/// or re-enabled.
///
/// An absent entry means the capability is **enabled** (default-on policy).
#[derive(Debug)]
pub struct ToggleCache {
    cache: StateCache<StateKey, bool>,
}

impl ToggleCache {
    /// Constructs an empty toggle cache.
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            cache: StateCache::new(policy),
        }
    }

    /// Whether the capability is enabled for this actor. A cache miss (or expired
    /// entry) is enabled.
    pub fn is_enabled(&self, actor: ActorId, capability: &ArcStr, now: Instant) -> bool {
        self.cache
            .get_at(&(actor, capability.clone()), now)
            .unwrap_or(true)
    }

    /// Records the actor's preference.
    pub fn set_enabled(&self, actor: ActorId, capability: &ArcStr, enabled: bool, now: Instant) {
        self.cache.put_at((actor, capability.clone()), enabled, now);
    }

    /// Discards all state for the given actor (on departure).
    pub fn purge_actor(&self, actor: ActorId) {
        self.cache.invalidate_if(|(a, _)| *a == actor);
    }
}
