/*
[INPUT]:  Keys, values and per-entry time-to-live
[OUTPUT]: Timestamped values with staleness checks
[POS]:    Cache layer - storage behind the request cache coordinator
[UPDATE]: When changing staleness rules or entry bookkeeping
*/

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    updated_at: Instant,
    ttl: Duration,
}

/// Key/value store with a TTL per entry.
///
/// Expired entries are kept and reported as stale; nothing is evicted.
#[derive(Debug, Clone)]
pub struct ExpiringCache<K, V> {
    slots: HashMap<K, Slot<V>>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Insert or replace a value, stamping it with the current time.
    pub fn insert(&mut self, key: K, value: V, ttl: Duration) {
        self.insert_stamped(key, value, ttl, Instant::now());
    }

    /// Insert or replace a value carrying its own `updated_at`.
    pub fn insert_stamped(&mut self, key: K, value: V, ttl: Duration, updated_at: Instant) {
        self.slots.insert(
            key,
            Slot {
                value,
                updated_at,
                ttl,
            },
        );
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.slots.get(key).map(|slot| &slot.value)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.slots.get_mut(key).map(|slot| &mut slot.value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.slots.contains_key(key)
    }

    /// Time since the entry was last stamped.
    pub fn age<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.slots.get(key).map(|slot| slot.updated_at.elapsed())
    }

    /// `now - updated_at > ttl`. Absent keys are not stale.
    pub fn is_stale<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.slots
            .get(key)
            .is_some_and(|slot| slot.updated_at.elapsed() > slot.ttl)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<K, V> Default for ExpiringCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
