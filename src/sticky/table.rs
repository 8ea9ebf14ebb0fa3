use std::sync::atomic::{AtomicUsize, Ordering};

use crate::hash::murmur3_64;
use crate::primitives::Spinlock;

use super::{Entry, Key};

#[derive(Debug, Default)]
struct LruState {
    head: Option<u32>,
    tail: Option<u32>,
}

/// Keyed map with open chaining over a stable-index arena. Read path hits
/// only the bucket's spinlock; the write path (`get_or_create`) additionally
/// evicts under the LRU lock when the table is full. Per the locking
/// discipline in §5, the bucket lock is always acquired before the LRU
/// lock, never the reverse.
pub struct Table {
    name: String,
    size: usize,
    default_expire_ms: u64,
    buckets: Vec<Spinlock<Vec<u32>>>,
    arena: parking_lot::RwLock<Vec<Option<Entry>>>,
    free: Spinlock<Vec<u32>>,
    lru: Spinlock<LruState>,
    current: AtomicUsize,
}

impl Table {
    pub fn new(name: impl Into<String>, size: usize, default_expire_ms: u64) -> Self {
        let num_buckets = (size.max(16)).next_power_of_two();
        Self {
            name: name.into(),
            size,
            default_expire_ms,
            buckets: (0..num_buckets).map(|_| Spinlock::new(Vec::new())).collect(),
            arena: parking_lot::RwLock::new(Vec::new()),
            free: Spinlock::new(Vec::new()),
            lru: Spinlock::new(LruState::default()),
            current: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    fn bucket_index(&self, key: &Key) -> usize {
        let h = murmur3_64(&key.as_bytes(), 0);
        (h as usize) & (self.buckets.len() - 1)
    }

    /// Unlinks `idx` from the LRU list. Caller holds the LRU lock.
    fn lru_unlink(&self, lru: &mut LruState, idx: u32) {
        let mut arena = self.arena.write();
        let (prev, next) = {
            let entry = arena[idx as usize].as_ref().unwrap();
            (entry.lru_prev, entry.lru_next)
        };
        match prev {
            Some(p) => arena[p as usize].as_mut().unwrap().lru_next = next,
            None => lru.head = next,
        }
        match next {
            Some(n) => arena[n as usize].as_mut().unwrap().lru_prev = prev,
            None => lru.tail = prev,
        }
        let entry = arena[idx as usize].as_mut().unwrap();
        entry.lru_prev = None;
        entry.lru_next = None;
    }

    /// Pushes `idx` onto the front (most-recently-used end) of the LRU
    /// list. Caller holds the LRU lock.
    fn lru_push_front(&self, lru: &mut LruState, idx: u32) {
        let mut arena = self.arena.write();
        let old_head = lru.head;
        {
            let entry = arena[idx as usize].as_mut().unwrap();
            entry.lru_prev = None;
            entry.lru_next = old_head;
        }
        if let Some(h) = old_head {
            arena[h as usize].as_mut().unwrap().lru_prev = Some(idx);
        }
        lru.head = Some(idx);
        if lru.tail.is_none() {
            lru.tail = Some(idx);
        }
    }

    /// Moves `idx` to the LRU head ("touch").
    pub fn touch(&self, idx: u32) {
        let mut lru = self.lru.lock();
        self.lru_unlink(&mut lru, idx);
        self.lru_push_front(&mut lru, idx);
    }

    /// Read path: hash the key, lock its bucket, walk the chain. On hit,
    /// updates `last_access_ms` and returns the entry's arena index.
    pub fn get(&self, key: &Key, now_ms: u64) -> Option<u32> {
        let bucket_idx = self.bucket_index(key);
        let bucket = self.buckets[bucket_idx].lock();
        let found = {
            let arena = self.arena.read();
            bucket
                .iter()
                .copied()
                .find(|&i| arena[i as usize].as_ref().map(|e| &e.key) == Some(key))
        };
        if let Some(idx) = found {
            let mut arena = self.arena.write();
            if let Some(e) = arena[idx as usize].as_mut() {
                e.last_access_ms = now_ms;
            }
        }
        drop(bucket);
        if let Some(idx) = found {
            self.touch(idx);
        }
        found
    }

    /// Write path: find-or-create. On miss, evicts under the size limit
    /// (expiring first, then LRU-evicting an unreferenced entry) before
    /// allocating the new slot.
    pub fn get_or_create(&self, key: Key, now_ms: u64) -> u32 {
        let bucket_idx = self.bucket_index(&key);
        let mut bucket = self.buckets[bucket_idx].lock();

        let existing = {
            let arena = self.arena.read();
            bucket
                .iter()
                .copied()
                .find(|&i| arena[i as usize].as_ref().map(|e| &e.key) == Some(&key))
        };
        if let Some(idx) = existing {
            drop(bucket);
            self.touch(idx);
            return idx;
        }

        if self.current.load(Ordering::Relaxed) >= self.size {
            drop(bucket);
            self.expire(now_ms);
            if self.current.load(Ordering::Relaxed) >= self.size {
                self.evict_one_unreferenced();
            }
            bucket = self.buckets[bucket_idx].lock();
        }

        let idx = self.alloc_slot(Entry::new(key, bucket_idx, now_ms, self.default_expire_ms));
        bucket.push(idx);
        drop(bucket);
        self.current.fetch_add(1, Ordering::Relaxed);
        self.touch(idx);
        idx
    }

    fn alloc_slot(&self, entry: Entry) -> u32 {
        let mut free = self.free.lock();
        if let Some(idx) = free.pop() {
            *self.arena.write().get_mut(idx as usize).unwrap() = Some(entry);
            idx
        } else {
            let mut arena = self.arena.write();
            arena.push(Some(entry));
            (arena.len() - 1) as u32
        }
    }

    /// Removes `idx` from its bucket chain and the LRU list, freeing the
    /// slot for reuse. Caller must not hold the entry's bucket lock.
    fn remove_index(&self, idx: u32) {
        let bucket_idx = {
            let arena = self.arena.read();
            match arena[idx as usize].as_ref() {
                Some(e) => e.bucket,
                None => return,
            }
        };
        {
            let mut bucket = self.buckets[bucket_idx].lock();
            bucket.retain(|&i| i != idx);
        }
        {
            let mut lru = self.lru.lock();
            self.lru_unlink(&mut lru, idx);
        }
        *self.arena.write().get_mut(idx as usize).unwrap() = None;
        self.free.lock().push(idx);
        self.current.fetch_sub(1, Ordering::Relaxed);
    }

    /// Walks the LRU tail, unlinking entries that are both unreferenced
    /// and past their expiry.
    pub fn expire(&self, now_ms: u64) {
        loop {
            let candidate = {
                let lru = self.lru.lock();
                lru.tail
            };
            let Some(idx) = candidate else { break };
            let removable = {
                let arena = self.arena.read();
                match arena[idx as usize].as_ref() {
                    Some(e) => e.is_evictable() && e.is_expired(now_ms),
                    None => false,
                }
            };
            if removable {
                self.remove_index(idx);
            } else {
                break;
            }
        }
    }

    /// Evicts the least-recently-used unreferenced entry, regardless of
    /// expiry, when the table is full and a write needs room. Scans from
    /// the LRU tail forward until it finds one with `ref_cnt == 0`.
    fn evict_one_unreferenced(&self) {
        let mut idx = { self.lru.lock().tail };
        while let Some(i) = idx {
            let (evictable, prev) = {
                let arena = self.arena.read();
                let e = arena[i as usize].as_ref().unwrap();
                (e.is_evictable(), e.lru_prev)
            };
            if evictable {
                self.remove_index(i);
                return;
            }
            idx = prev;
        }
    }

    pub fn with_entry<R>(&self, idx: u32, f: impl FnOnce(&Entry) -> R) -> Option<R> {
        self.arena.read()[idx as usize].as_ref().map(f)
    }

    pub fn with_entry_mut<R>(&self, idx: u32, f: impl FnOnce(&mut Entry) -> R) -> Option<R> {
        self.arena.write()[idx as usize].as_mut().map(f)
    }

    pub fn incref(&self, idx: u32) {
        self.with_entry_mut(idx, |e| e.ref_cnt += 1);
    }

    pub fn decref(&self, idx: u32) {
        self.with_entry_mut(idx, |e| {
            if e.ref_cnt > 0 {
                e.ref_cnt -= 1;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent_for_same_key() {
        let t = Table::new("t", 16, 60_000);
        let a = t.get_or_create(Key::String("a".into()), 0);
        let b = t.get_or_create(Key::String("a".into()), 1);
        assert_eq!(a, b);
        assert_eq!(t.current(), 1);
    }

    #[test]
    fn current_never_exceeds_size() {
        let t = Table::new("t", 4, 60_000);
        for i in 0..20 {
            t.get_or_create(Key::Integer(i), i as u64);
        }
        assert!(t.current() <= t.size());
    }

    #[test]
    fn referenced_entries_are_never_evicted() {
        let t = Table::new("t", 2, 0);
        let a = t.get_or_create(Key::Integer(1), 0);
        t.incref(a);
        t.get_or_create(Key::Integer(2), 0);
        t.get_or_create(Key::Integer(3), 1_000);
        assert!(t.with_entry(a, |_| ()).is_some());
    }

    #[test]
    fn expire_removes_stale_unreferenced_entries() {
        let t = Table::new("t", 16, 100);
        let a = t.get_or_create(Key::Integer(1), 0);
        t.expire(1000);
        assert!(t.with_entry(a, |_| ()).is_none());
        assert_eq!(t.current(), 0);
    }

    #[test]
    fn get_updates_last_access_and_touches_lru() {
        let t = Table::new("t", 16, 60_000);
        let idx = t.get_or_create(Key::String("k".into()), 0);
        let found = t.get(&Key::String("k".into()), 500).unwrap();
        assert_eq!(found, idx);
        t.with_entry(idx, |e| assert_eq!(e.last_access_ms, 500));
    }

    #[test]
    fn bucket_chain_lengths_sum_to_current() {
        let t = Table::new("t", 64, 60_000);
        for i in 0..30 {
            t.get_or_create(Key::Integer(i), 0);
        }
        let total: usize = t.buckets.iter().map(|b| b.lock().len()).sum();
        assert_eq!(total, t.current());
    }
}
