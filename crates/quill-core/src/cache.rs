//! Shared cache for formatter-like objects.
//!
//! Compiled templates are evaluated concurrently on many threads, and the
//! formatter objects they need are expensive enough to share. The cache is a
//! two-tier approximate LRU: a "recent" generation and an "older" generation.
//! Reads promote lazily from older to recent; when the recent tier fills up,
//! it is rotated wholesale into the older slot and the previous older tier is
//! dropped. Under contention the tier sizes may over- or under-count
//! slightly; what is guaranteed is the retention floor: an entry accessed
//! since the last rotation survives the next one, and at least
//! `floor` entries are retained across any single rotation.

use std::hash::Hash;
use std::sync::Mutex;

use dashmap::DashMap;

pub struct TwoTierCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    recent: DashMap<K, V>,
    older: DashMap<K, V>,
    /// Rotation threshold for the recent tier; also the guaranteed minimum
    /// number of retained entries.
    floor: usize,
    rotate_lock: Mutex<()>,
}

impl<K, V> TwoTierCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(floor: usize) -> Self {
        assert!(floor > 0, "cache floor must be positive");
        Self {
            recent: DashMap::new(),
            older: DashMap::new(),
            floor,
            rotate_lock: Mutex::new(()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(hit) = self.recent.get(key) {
            return Some(hit.clone());
        }
        // Lazy promotion: an older-generation hit moves to the recent tier.
        if let Some((key, value)) = self.older.remove(key) {
            let result = value.clone();
            self.recent.insert(key, value);
            self.maybe_rotate();
            return Some(result);
        }
        None
    }

    pub fn get_or_insert_with(&self, key: &K, create: impl FnOnce() -> V) -> V {
        if let Some(hit) = self.get(key) {
            return hit;
        }
        let value = create();
        self.insert(key.clone(), value.clone());
        value
    }

    pub fn insert(&self, key: K, value: V) {
        self.older.remove(&key);
        self.recent.insert(key, value);
        self.maybe_rotate();
    }

    /// Total entries across both generations. Approximate under contention.
    pub fn len(&self) -> usize {
        self.recent.len() + self.older.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let _guard = self.rotate_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.older.clear();
        self.recent.clear();
    }

    fn maybe_rotate(&self) {
        if self.recent.len() <= self.floor {
            return;
        }
        let Ok(_guard) = self.rotate_lock.try_lock() else {
            // Someone else is rotating; a slightly oversized recent tier is
            // within the documented tolerance.
            return;
        };
        if self.recent.len() <= self.floor {
            return;
        }
        self.older.clear();
        let keys: Vec<K> = self.recent.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((key, value)) = self.recent.remove(&key) {
                self.older.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_and_miss() {
        let cache: TwoTierCache<String, i32> = TwoTierCache::new(4);
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn entries_survive_one_rotation_and_promotion_rescues_them() {
        let cache: TwoTierCache<i32, i32> = TwoTierCache::new(2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        cache.insert(3, 30); // rotates {1,2,3} into the older tier
        assert_eq!(cache.get(&1), Some(10)); // promoted back to recent
        cache.insert(4, 40);
        cache.insert(5, 50); // rotates again; 1 was promoted, so it survives
        assert_eq!(cache.get(&1), Some(10));
    }

    #[test]
    fn retention_never_drops_below_floor() {
        let cache: TwoTierCache<i32, i32> = TwoTierCache::new(8);
        for i in 0..100 {
            cache.insert(i, i);
        }
        assert!(cache.len() >= 8, "len {} below floor", cache.len());
    }

    #[test]
    fn get_or_insert_creates_once() {
        let cache: TwoTierCache<&'static str, i32> = TwoTierCache::new(4);
        let mut calls = 0;
        let v = cache.get_or_insert_with(&"k", || {
            calls += 1;
            7
        });
        assert_eq!(v, 7);
        let v = cache.get_or_insert_with(&"k", || {
            calls += 1;
            8
        });
        assert_eq!(v, 7);
        assert_eq!(calls, 1);
    }
}
