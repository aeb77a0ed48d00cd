//! Ref-counted, content-addressed dedup table.
//!
//! Generic over the stored value and the hasher, expressed as a type
//! parameter bounded by `BuildHasher` rather than hardcoding one.
//!
//! Layout: a fixed-capacity open-addressing table (`buckets`, length a power
//! of two) holding `(id, hash, psl)` triples, plus a flat `items` array
//! indexed directly by `Id` holding the actual value and its ref count.
//! Robin Hood probing keeps worst-case lookup bounded by `max_psl`, which the
//! table tracks so lookups can abort early instead of scanning the whole
//! table on a miss.

use std::hash::{BuildHasher, Hash, Hasher};
use tracing::{debug, trace};

/// Identifier into a [`RefCountedSet`]. `0` is reserved for "the default
/// value" and is never assigned to a stored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(pub u16);

impl Id {
    pub const DEFAULT: Id = Id(0);

    pub fn is_default(self) -> bool {
        self.0 == 0
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::DEFAULT
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    /// 0 means this bucket is empty (ids are 1-based).
    id: u16,
    hash: u64,
    psl: u32,
}

impl Bucket {
    const EMPTY: Bucket = Bucket {
        id: 0,
        hash: 0,
        psl: 0,
    };

    fn is_empty(&self) -> bool {
        self.id == 0
    }
}

struct Item<V> {
    value: V,
    hash: u64,
    ref_count: u32,
}

/// Outcome of an insertion attempt, distinguishing a fresh slot from a
/// resurrected/bumped existing one so callers can log or account for each
/// differently if they want to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted(Id),
    Existing(Id),
}

impl AddOutcome {
    pub fn id(self) -> Id {
        match self {
            AddOutcome::Inserted(id) | AddOutcome::Existing(id) => id,
        }
    }
}

/// Failure modes for [`RefCountedSet::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddError {
    /// No free slot, but enough tombstones exist that a [`RefCountedSet::compact`]
    /// would very likely make room. The caller should compact and retry.
    NeedsRehash,
    /// No free slot and not enough garbage to justify compaction.
    OutOfMemory,
}

/// A Robin-Hood-probed, reference-counted, content-addressed set.
pub struct RefCountedSet<V, S = std::collections::hash_map::RandomState> {
    buckets: Vec<Bucket>,
    items: Vec<Option<Item<V>>>, // index 0 unused; ids are 1-based
    free: Vec<u16>,
    max_psl: u32,
    psl_stats: [u32; 32],
    hasher: S,
}

impl<V> RefCountedSet<V, std::collections::hash_map::RandomState> {
    pub fn new(capacity: u16) -> Self {
        Self::with_hasher(capacity, std::collections::hash_map::RandomState::new())
    }
}

impl<V, S: BuildHasher> RefCountedSet<V, S> {
    pub fn with_hasher(capacity: u16, hasher: S) -> Self {
        let buckets = (capacity.max(1) as usize).next_power_of_two();
        // Load factor ~13/16: keep a margin of always-empty buckets so Robin
        // Hood probe chains stay short even near capacity.
        let max_items = (buckets * 13 / 16).max(1);
        Self {
            buckets: vec![Bucket::EMPTY; buckets],
            items: (0..=max_items).map(|_| None).collect(),
            free: (1..=max_items as u16).rev().collect(),
            max_psl: 0,
            psl_stats: [0; 32],
            hasher,
        }
    }

    pub fn capacity(&self) -> usize {
        self.items.len().saturating_sub(1)
    }

    pub fn max_psl(&self) -> u32 {
        self.max_psl
    }

    pub fn psl_histogram(&self) -> &[u32; 32] {
        &self.psl_stats
    }

    fn hash_value(&self, value: &V) -> u64
    where
        V: Hash,
    {
        let mut h = self.hasher.build_hasher();
        value.hash(&mut h);
        h.finish()
    }

    fn mask(&self) -> usize {
        self.buckets.len() - 1
    }

    fn bump_psl_stat(&mut self, psl: u32) {
        let slot = (psl as usize).min(self.psl_stats.len() - 1);
        self.psl_stats[slot] += 1;
        self.max_psl = self.max_psl.max(psl);
    }

    /// Look up the id of a stored value matching `value`, live or tombstoned.
    /// Bounded by `max_psl`: Robin Hood's invariant guarantees that if the key
    /// were present past that distance, some earlier-probed bucket would have
    /// displaced it, so it is safe to give up there.
    fn lookup_hash(&self, hash: u64, value: &V) -> Option<u16>
    where
        V: Eq,
    {
        let mask = self.mask();
        let mut pos = (hash as usize) & mask;
        let mut psl = 0u32;
        loop {
            let b = &self.buckets[pos];
            if b.is_empty() || b.psl < psl {
                return None;
            }
            if b.hash == hash {
                if let Some(item) = &self.items[b.id as usize] {
                    if item.value == *value {
                        return Some(b.id);
                    }
                }
            }
            if psl >= self.max_psl {
                return None;
            }
            pos = (pos + 1) & mask;
            psl += 1;
        }
    }

    fn robin_hood_insert(&mut self, mut hash: u64, mut id: u16) {
        let mask = self.mask();
        let mut pos = (hash as usize) & mask;
        let mut psl = 0u32;
        loop {
            if self.buckets[pos].is_empty() {
                self.buckets[pos] = Bucket { id, hash, psl };
                self.bump_psl_stat(psl);
                return;
            }
            if self.buckets[pos].psl < psl {
                std::mem::swap(&mut self.buckets[pos].id, &mut id);
                std::mem::swap(&mut self.buckets[pos].hash, &mut hash);
                std::mem::swap(&mut self.buckets[pos].psl, &mut psl);
                self.bump_psl_stat(self.buckets[pos].psl);
            }
            pos = (pos + 1) & mask;
            psl += 1;
        }
    }

    /// Insert `value`, deduplicating against any existing (live or
    /// tombstoned) equal entry. `on_duplicate` is invoked with the redundant
    /// incoming value when an existing entry satisfies the request, mirroring
    /// a `deleted()` callback for values that own external resources.
    pub fn add(&mut self, value: V, on_duplicate: impl FnOnce(V)) -> Result<AddOutcome, AddError>
    where
        V: Eq + Hash,
    {
        let hash = self.hash_value(&value);
        if let Some(id) = self.lookup_hash(hash, &value) {
            let item = self.items[id as usize].as_mut().expect("looked-up id must be occupied");
            let resurrected = item.ref_count == 0;
            item.ref_count += 1;
            trace!(target: "style.set", id, resurrected, "style_ref_bump");
            on_duplicate(value);
            return Ok(if resurrected {
                AddOutcome::Inserted(Id(id))
            } else {
                AddOutcome::Existing(Id(id))
            });
        }

        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                let dead = self
                    .items
                    .iter()
                    .skip(1)
                    .filter(|s| matches!(s, Some(it) if it.ref_count == 0))
                    .count();
                let total = self.items.len().saturating_sub(1).max(1);
                if dead * 10 >= total {
                    debug!(target: "style.set", dead, total, "style_set_needs_rehash");
                    return Err(AddError::NeedsRehash);
                }
                return Err(AddError::OutOfMemory);
            }
        };

        self.items[id as usize] = Some(Item {
            value,
            hash,
            ref_count: 1,
        });
        self.robin_hood_insert(hash, id);
        Ok(AddOutcome::Inserted(Id(id)))
    }

    /// Decrement the reference count for `id`. At zero the slot becomes a
    /// tombstone: still present in the probe table (so equal future inserts
    /// can resurrect it cheaply) but eligible for reclamation by [`compact`](Self::compact).
    pub fn release(&mut self, id: Id) {
        if id.is_default() {
            return;
        }
        if let Some(Some(item)) = self.items.get_mut(id.0 as usize) {
            debug_assert!(item.ref_count > 0, "release on a id with ref_count already 0");
            item.ref_count = item.ref_count.saturating_sub(1);
        }
    }

    pub fn ref_count(&self, id: Id) -> u32 {
        if id.is_default() {
            return 0;
        }
        self.items
            .get(id.0 as usize)
            .and_then(|s| s.as_ref())
            .map(|it| it.ref_count)
            .unwrap_or(0)
    }

    /// Look up the stored value for `id`. Returns `None` for `Id::DEFAULT`
    /// and for never-assigned ids; a tombstoned id (`ref_count == 0`) still
    /// resolves, since the value is only transiently in that state.
    pub fn lookup(&self, id: Id) -> Option<&V> {
        if id.is_default() {
            return None;
        }
        self.items.get(id.0 as usize)?.as_ref().map(|it| &it.value)
    }

    /// Reclaim tombstoned slots: calls `on_evict` for each, frees the id for
    /// reuse, then fully rebuilds the probe table from the surviving live
    /// entries. This is the caller-triggered recovery path for
    /// [`AddError::NeedsRehash`].
    pub fn compact(&mut self, mut on_evict: impl FnMut(&V)) {
        let mut reclaimed = 0usize;
        for (id, slot) in self.items.iter_mut().enumerate().skip(1) {
            let is_dead = matches!(slot, Some(item) if item.ref_count == 0);
            if is_dead {
                if let Some(item) = slot.as_ref() {
                    on_evict(&item.value);
                }
                *slot = None;
                self.free.push(id as u16);
                reclaimed += 1;
            }
        }
        self.buckets.fill(Bucket::EMPTY);
        self.max_psl = 0;
        self.psl_stats = [0; 32];
        let live: Vec<(u16, u64)> = self
            .items
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(id, slot)| slot.as_ref().map(|it| (id as u16, it.hash)))
            .collect();
        for (id, hash) in live {
            self.robin_hood_insert(hash, id);
        }
        debug!(target: "style.set", reclaimed, "style_set_compacted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> RefCountedSet<u32> {
        RefCountedSet::new(8)
    }

    #[test]
    fn insert_and_lookup() {
        let mut s = set();
        let id = s.add(42, |_| panic!("no duplicate")).unwrap().id();
        assert_eq!(s.lookup(id), Some(&42));
        assert_eq!(s.ref_count(id), 1);
    }

    #[test]
    fn duplicate_bumps_ref_and_calls_back() {
        let mut s = set();
        let id1 = s.add(7, |_| panic!("first insert is not a duplicate")).unwrap().id();
        let mut called = false;
        let outcome = s.add(7, |v| {
            called = true;
            assert_eq!(v, 7);
        });
        assert!(called);
        match outcome.unwrap() {
            AddOutcome::Existing(id2) => assert_eq!(id1, id2),
            other => panic!("expected Existing, got {other:?}"),
        }
        assert_eq!(s.ref_count(id1), 2);
    }

    #[test]
    fn release_to_zero_is_tombstone_not_freed() {
        let mut s = set();
        let id = s.add(1, |_| {}).unwrap().id();
        s.release(id);
        assert_eq!(s.ref_count(id), 0);
        // still resolvable: transient tombstone state
        assert_eq!(s.lookup(id), Some(&1));
    }

    #[test]
    fn resurrect_tombstone_on_reinsert() {
        let mut s = set();
        let id = s.add(99, |_| {}).unwrap().id();
        s.release(id);
        let outcome = s.add(99, |_| {}).unwrap();
        assert_eq!(outcome.id(), id);
        assert_eq!(s.ref_count(id), 1);
    }

    #[test]
    fn compact_frees_tombstones_and_reports_them() {
        let mut s = set();
        let id = s.add(5, |_| {}).unwrap().id();
        s.release(id);
        let mut evicted = Vec::new();
        s.compact(|v| evicted.push(*v));
        assert_eq!(evicted, vec![5]);
        assert_eq!(s.lookup(id), None);
        // id is now free and reusable
        let id2 = s.add(123, |_| {}).unwrap().id();
        assert_eq!(id2, id);
    }

    #[test]
    fn out_of_memory_when_full_and_no_garbage() {
        let mut s: RefCountedSet<u32> = RefCountedSet::new(8); // ~6 usable items
        let cap = s.capacity();
        let mut ids = Vec::new();
        for i in 0..cap as u32 {
            ids.push(s.add(i, |_| {}).unwrap().id());
        }
        let err = s.add(999_999, |_| {}).unwrap_err();
        assert_eq!(err, AddError::OutOfMemory);
    }

    #[test]
    fn needs_rehash_when_mostly_garbage() {
        let mut s: RefCountedSet<u32> = RefCountedSet::new(8);
        let cap = s.capacity();
        let mut ids = Vec::new();
        for i in 0..cap as u32 {
            ids.push(s.add(i, |_| {}).unwrap().id());
        }
        for id in &ids {
            s.release(*id);
        }
        let err = s.add(999_999, |_| {}).unwrap_err();
        assert_eq!(err, AddError::NeedsRehash);
        s.compact(|_| {});
        let id = s.add(999_999, |_| {}).unwrap().id();
        assert_eq!(s.lookup(id), Some(&999_999));
    }

    #[test]
    fn default_id_never_stored() {
        let s = set();
        assert_eq!(s.lookup(Id::DEFAULT), None);
        assert_eq!(s.ref_count(Id::DEFAULT), 0);
    }
}
