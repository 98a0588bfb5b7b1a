//! Decoded-sample cache consulted before a voice starts so that the
//! voice pool can mix immediately instead of waiting on the loader pool.
//!
//! Entries are added in two ways: explicitly, via a `precache` command
//! (refcounted so nested precache/unprecache pairs compose), or
//! incidentally, as a side effect of a flow starting a sound that was
//! not precached. Incidental entries are subject to LRU eviction;
//! precached entries are pinned until their refcount drops to zero.

use crate::memory::pool::MemoryPool;
use dashmap::DashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Observable lifecycle state of a sound's cache entry, returned by
/// `Engine::query_precache_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecacheState {
    Idle,
    Loading,
    Ready,
}

struct Entry {
    data: NonNull<f32>,
    frames: usize,
    channels: u16,
    last_used: u64,
    precache_refcount: AtomicUsize,
}

pub struct PrerollCache {
    pool: MemoryPool,
    entries: DashMap<String, Entry>,
    max_entries: usize,
    access_counter: AtomicU64,
}

impl PrerollCache {
    pub fn new(max_entries: usize, pool_size: usize) -> Self {
        Self {
            pool: MemoryPool::new(pool_size),
            entries: DashMap::new(),
            max_entries,
            access_counter: AtomicU64::new(0),
        }
    }

    /// Insert decoded, already-resampled interleaved frames for `name`.
    /// Called by the loader pool once a background decode completes.
    pub fn insert(&self, name: &str, interleaved: &[f32], channels: u16) -> bool {
        if self.entries.contains_key(name) {
            return true;
        }

        if self.entries.len() >= self.max_entries {
            self.evict_one_unpinned();
        }

        let Some(data_ptr) = self.pool.allocate(interleaved.len() * 4, 16) else {
            return false;
        };
        let data_ptr = data_ptr.cast::<f32>();
        unsafe {
            std::ptr::copy_nonoverlapping(interleaved.as_ptr(), data_ptr.as_ptr(), interleaved.len());
        }

        let counter = self.access_counter.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            name.to_string(),
            Entry {
                data: data_ptr,
                frames: interleaved.len() / channels.max(1) as usize,
                channels,
                last_used: counter,
                precache_refcount: AtomicUsize::new(0),
            },
        );
        true
    }

    /// Lock-free read of a cached sound's interleaved frames, real-time
    /// safe for use from the voice pool during `turn_handle`.
    pub fn get(&self, name: &str) -> Option<&[f32]> {
        let entry = self.entries.get(name)?;
        self.access_counter.fetch_add(1, Ordering::Relaxed);
        unsafe {
            Some(std::slice::from_raw_parts(
                entry.data.as_ptr(),
                entry.frames * entry.channels as usize,
            ))
        }
    }

    /// Copy a cached sound's interleaved frames out of the pool. Cloning
    /// out (rather than handing back a raw pointer into the bump
    /// allocator) lets the resulting buffer outlive a later `reset()`
    /// or eviction, which a playing voice's stream must be able to do.
    pub fn get_owned(&self, name: &str) -> Option<(Vec<f32>, u16)> {
        let entry = self.entries.get(name)?;
        let counter = self.access_counter.fetch_add(1, Ordering::Relaxed);
        let _ = counter;
        let slice = unsafe {
            std::slice::from_raw_parts(entry.data.as_ptr(), entry.frames * entry.channels as usize)
        };
        Some((slice.to_vec(), entry.channels))
    }

    pub fn channels_of(&self, name: &str) -> Option<u16> {
        self.entries.get(name).map(|e| e.channels)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn state_of(&self, name: &str, loading: impl Fn(&str) -> bool) -> PrecacheState {
        if self.entries.contains_key(name) {
            PrecacheState::Ready
        } else if loading(name) {
            PrecacheState::Loading
        } else {
            PrecacheState::Idle
        }
    }

    /// Mark `name` as explicitly precached, incrementing its pin count.
    /// Safe to call before the entry exists; the count is consulted once
    /// the loader pool inserts the decoded data.
    pub fn precache(&self, name: &str) {
        self.entries
            .entry(name.to_string())
            .and_modify(|e| {
                e.precache_refcount.fetch_add(1, Ordering::Relaxed);
            });
        // If the entry doesn't exist yet, the refcount is tracked by the
        // caller (Engine) until the loader pool inserts it; see
        // `Engine::pending_precache_refs`.
    }

    pub fn bump_refcount_on_insert(&self, name: &str, by: usize) {
        if let Some(entry) = self.entries.get(name) {
            entry.precache_refcount.fetch_add(by, Ordering::Relaxed);
        }
    }

    /// Decrement `name`'s pin count; once it reaches zero the entry
    /// becomes eligible for LRU eviction again.
    pub fn unprecache(&self, name: &str) {
        if let Some(entry) = self.entries.get(name) {
            let prev = entry.precache_refcount.load(Ordering::Relaxed);
            if prev > 0 {
                entry.precache_refcount.fetch_sub(1, Ordering::Relaxed);
            }
        }
    }

    /// Drop every precache pin. Does not force eviction; entries simply
    /// become eligible for normal LRU reclamation.
    pub fn unprecache_all(&self) {
        for entry in self.entries.iter() {
            entry.value().precache_refcount.store(0, Ordering::Relaxed);
        }
    }

    fn evict_one_unpinned(&self) {
        let victim = self
            .entries
            .iter()
            .filter(|e| e.value().precache_refcount.load(Ordering::Relaxed) == 0)
            .min_by_key(|e| e.value().last_used)
            .map(|e| e.key().clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }

    pub fn reset(&self) {
        self.entries.clear();
        self.pool.reset();
        self.access_counter.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

unsafe impl Send for PrerollCache {}
unsafe impl Sync for PrerollCache {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trips() {
        let cache = PrerollCache::new(4, 1024 * 1024);
        let data = vec![0.1_f32, 0.2, 0.3, 0.4];
        assert!(cache.insert("kick", &data, 2));
        let got = cache.get("kick").unwrap();
        assert_eq!(got, &data[..]);
    }

    #[test]
    fn precached_entries_survive_eviction_pressure() {
        let cache = PrerollCache::new(1, 1024 * 1024);
        cache.insert("a", &[0.0; 4], 2);
        cache.precache("a");
        cache.insert("b", &[0.0; 4], 2);
        // "a" is pinned, so it should not have been evicted in favor of "b"
        // even though max_entries is 1 - eviction only considers unpinned.
        assert!(cache.contains("a"));
    }
}
