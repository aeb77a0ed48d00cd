//! Page-local style dedup table.
//!
//! The Robin Hood bucket array is pure integers (`id`, `hash`, `psl`), valid
//! for any bit pattern, so it lives in the page's own offset arena like the
//! row and grapheme regions. The interned `Style` values themselves stay in
//! a conventional `Vec`: `Style`'s `Color`/`Underline` fields are ordinary
//! Rust enums with no `repr` guarantee, so they are not safe to place behind
//! a zero-initialized, raw-pointer-resolved arena slot.

use crate::buffer::PageBuffer;
use core_offset::{OSlice, OffsetBuf};
use core_style::{AddError, AddOutcome, Id as StyleId, Style};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, trace};

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Bucket {
    /// 0 means this bucket is empty (ids are 1-based).
    id: u16,
    hash: u64,
    psl: u32,
}

impl Bucket {
    const EMPTY: Bucket = Bucket { id: 0, hash: 0, psl: 0 };

    fn is_empty(&self) -> bool {
        self.id == 0
    }
}

struct Item {
    value: Style,
    hash: u64,
    ref_count: u32,
}

/// A Robin-Hood-probed, reference-counted style dedup table, scoped to one
/// page. Mirrors `core_style::RefCountedSet`'s algorithm, but the bucket
/// array is resolved against the page's arena instead of owning its own
/// allocation.
pub struct PageStyleTable {
    buckets: OSlice<Bucket>,
    items: Vec<Option<Item>>,
    free: Vec<u16>,
    max_psl: u32,
}

impl PageStyleTable {
    pub fn alloc(arena: &mut OffsetBuf, capacity: u16) -> Self {
        let buckets_len = (capacity.max(1) as u32).next_power_of_two();
        // Load factor ~13/16, same margin RefCountedSet keeps so probe chains
        // stay short near capacity.
        let max_items = (buckets_len as usize * 13 / 16).max(1);
        Self {
            buckets: arena.alloc_slice(buckets_len),
            items: (0..=max_items).map(|_| None).collect(),
            free: (1..=max_items as u16).rev().collect(),
            max_psl: 0,
        }
    }

    fn mask(&self) -> usize {
        self.buckets.len() - 1
    }

    fn hash_value(value: &Style) -> u64 {
        let mut h = DefaultHasher::new();
        value.hash(&mut h);
        h.finish()
    }

    fn lookup_hash(&self, buffer: &PageBuffer, hash: u64, value: &Style) -> Option<u16> {
        // SAFETY: `buckets` was allocated from this page's own arena and
        // `buffer` is that same page's buffer.
        let buckets = unsafe { self.buckets.resolve(buffer.as_ptr()) };
        let mask = self.mask();
        let mut pos = (hash as usize) & mask;
        let mut psl = 0u32;
        loop {
            let b = &buckets[pos];
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

    fn robin_hood_insert(&mut self, buffer: &mut PageBuffer, mut hash: u64, mut id: u16) {
        // SAFETY: see `lookup_hash`.
        let buckets = unsafe { self.buckets.resolve_mut(buffer.as_mut_ptr()) };
        let mask = buckets.len() - 1;
        let mut pos = (hash as usize) & mask;
        let mut psl = 0u32;
        loop {
            if buckets[pos].is_empty() {
                buckets[pos] = Bucket { id, hash, psl };
                self.max_psl = self.max_psl.max(psl);
                return;
            }
            if buckets[pos].psl < psl {
                std::mem::swap(&mut buckets[pos].id, &mut id);
                std::mem::swap(&mut buckets[pos].hash, &mut hash);
                std::mem::swap(&mut buckets[pos].psl, &mut psl);
                self.max_psl = self.max_psl.max(buckets[pos].psl);
            }
            pos = (pos + 1) & mask;
            psl += 1;
        }
    }

    pub fn add(&mut self, buffer: &mut PageBuffer, value: Style) -> Result<AddOutcome, AddError> {
        let hash = Self::hash_value(&value);
        if let Some(id) = self.lookup_hash(buffer, hash, &value) {
            let item = self.items[id as usize]
                .as_mut()
                .expect("looked-up id must be occupied");
            let resurrected = item.ref_count == 0;
            item.ref_count += 1;
            trace!(target: "page.style", id, resurrected, "style_ref_bump");
            return Ok(if resurrected {
                AddOutcome::Inserted(StyleId(id))
            } else {
                AddOutcome::Existing(StyleId(id))
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
                    debug!(target: "page.style", dead, total, "style_table_needs_rehash");
                    return Err(AddError::NeedsRehash);
                }
                return Err(AddError::OutOfMemory);
            }
        };

        self.items[id as usize] = Some(Item { value, hash, ref_count: 1 });
        self.robin_hood_insert(buffer, hash, id);
        Ok(AddOutcome::Inserted(StyleId(id)))
    }

    pub fn release(&mut self, id: StyleId) {
        if id.is_default() {
            return;
        }
        if let Some(Some(item)) = self.items.get_mut(id.0 as usize) {
            item.ref_count = item.ref_count.saturating_sub(1);
        }
    }

    pub fn lookup(&self, id: StyleId) -> Option<Style> {
        if id.is_default() {
            return None;
        }
        self.items.get(id.0 as usize)?.as_ref().map(|it| it.value)
    }

    /// Reclaim tombstoned slots and rebuild the probe table from survivors.
    pub fn compact(&mut self, buffer: &mut PageBuffer) {
        let mut reclaimed = 0usize;
        for (id, slot) in self.items.iter_mut().enumerate().skip(1) {
            let is_dead = matches!(slot, Some(item) if item.ref_count == 0);
            if is_dead {
                *slot = None;
                self.free.push(id as u16);
                reclaimed += 1;
            }
        }
        {
            // SAFETY: see `lookup_hash`.
            let buckets = unsafe { self.buckets.resolve_mut(buffer.as_mut_ptr()) };
            buckets.fill(Bucket::EMPTY);
        }
        self.max_psl = 0;
        let live: Vec<(u16, u64)> = self
            .items
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(id, slot)| slot.as_ref().map(|it| (id as u16, it.hash)))
            .collect();
        for (id, hash) in live {
            self.robin_hood_insert(buffer, hash, id);
        }
        debug!(target: "page.style", reclaimed, "style_table_compacted");
    }
}
