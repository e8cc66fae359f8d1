//! ChainMap: structural bucket-and-chain layer over an arena.
//!
//! Entries live in a `SlotMap` arena and are referenced by generational
//! `EntryId`s; each bucket in the table holds the head of a doubly-linked
//! chain threaded through arena ids. Unlinking rewires ids instead of
//! pointers, so a stale id can never be dereferenced into freed memory.
//! This layer knows nothing about lifecycle hooks.

use crate::digest::{DigestProvider, Xxh3Digest};
use crate::reentrancy::ReentryCheck;
use slotmap::{DefaultKey, SlotMap};

/// Bucket mask used by [`ChainMap::new`]: 16 buckets.
pub const DEFAULT_MASK: u64 = 0x0F;

/// Stable identifier for one entry. Survives grow/shrink (entries never
/// move in the arena); invalidated by removal and never aliases a later
/// entry that reuses the slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EntryId(DefaultKey);

/// Error constructing a map whose mask is not of the form `2^n - 1`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MaskError {
    NotAllOnes,
}

#[derive(Debug)]
pub enum InsertError {
    DuplicateKey,
}

#[derive(Debug)]
struct Entry<V> {
    digest: u128,
    key: Box<str>,
    value: V,
    prev: Option<DefaultKey>,
    next: Option<DefaultKey>,
}

pub struct ChainMap<V, D = Xxh3Digest> {
    provider: D,
    slots: SlotMap<DefaultKey, Entry<V>>, // entry storage, generational keys
    buckets: Vec<Option<DefaultKey>>,     // chain heads, length mask + 1
    mask: u64,
    reentry: ReentryCheck,
}

impl<V> ChainMap<V> {
    /// Map with [`DEFAULT_MASK`] and the default digest provider.
    pub fn new() -> Self {
        Self::with_mask(DEFAULT_MASK).expect("DEFAULT_MASK is a valid mask")
    }
}

impl<V> Default for ChainMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

fn mask_is_all_ones(mask: u64) -> bool {
    // 2^n - 1 for some n >= 0; mask 0 (one bucket) is allowed.
    mask != u64::MAX && mask & (mask + 1) == 0
}

/// Next mask after a doubling, or `None` once the bucket table (length
/// `mask + 1`, indexed by `usize`) can no longer represent it.
pub(crate) fn grown_mask(mask: u64) -> Option<u64> {
    if mask >= (usize::MAX as u64) >> 1 {
        None
    } else {
        Some((mask << 1) | 1)
    }
}

impl<V, D> ChainMap<V, D>
where
    D: DigestProvider,
{
    pub fn with_mask(mask: u64) -> Result<Self, MaskError>
    where
        D: Default,
    {
        Self::with_mask_and_provider(mask, D::default())
    }

    pub fn with_mask_and_provider(mask: u64, provider: D) -> Result<Self, MaskError> {
        if !mask_is_all_ones(mask) {
            return Err(MaskError::NotAllOnes);
        }
        Ok(Self {
            provider,
            slots: SlotMap::with_key(),
            buckets: vec![None; mask as usize + 1],
            mask,
            reentry: ReentryCheck::new(),
        })
    }

    /// Locate the entry for `key`: digest, mask to a bucket, then walk the
    /// chain comparing the full digest before the key bytes.
    pub fn find(&self, key: &str) -> Option<EntryId> {
        let _g = self.reentry.enter();
        let digest = self.provider.digest(key.as_bytes());
        let mut cursor = self.buckets[self.bucket_of(digest)];
        while let Some(id) = cursor {
            let e = &self.slots[id];
            if e.digest == digest && &*e.key == key {
                return Some(EntryId(id));
            }
            cursor = e.next;
        }
        None
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Insert a new entry at the head of its bucket's chain. Rejects a key
    /// that is already present; upsert is the caller's composition of
    /// `find` and `insert`.
    pub fn insert(&mut self, key: &str, value: V) -> Result<EntryId, InsertError> {
        let _g = self.reentry.enter();
        let digest = self.provider.digest(key.as_bytes());
        let bucket = self.bucket_of(digest);

        let mut cursor = self.buckets[bucket];
        while let Some(id) = cursor {
            let e = &self.slots[id];
            if e.digest == digest && &*e.key == key {
                return Err(InsertError::DuplicateKey);
            }
            cursor = e.next;
        }

        let head = self.buckets[bucket];
        let id = self.slots.insert(Entry {
            digest,
            key: key.into(),
            value,
            prev: None,
            next: head,
        });
        if let Some(h) = head {
            self.slots[h].prev = Some(id);
        }
        self.buckets[bucket] = Some(id);
        Ok(EntryId(id))
    }
}

// Structural operations below never invoke the digest provider: they work
// from the digest stored in each entry at insertion time.
impl<V, D> ChainMap<V, D> {
    #[inline]
    fn bucket_of(&self, digest: u128) -> usize {
        ((digest as u64) & self.mask) as usize
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
    pub fn mask(&self) -> u64 {
        self.mask
    }
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn key(&self, id: EntryId) -> Option<&str> {
        self.slots.get(id.0).map(|e| &*e.key)
    }

    pub fn value(&self, id: EntryId) -> Option<&V> {
        self.slots.get(id.0).map(|e| &e.value)
    }

    pub fn value_mut(&mut self, id: EntryId) -> Option<&mut V> {
        self.slots.get_mut(id.0).map(|e| &mut e.value)
    }

    /// Key and mutable value of one entry, borrowed together.
    pub fn key_value_mut(&mut self, id: EntryId) -> Option<(&str, &mut V)> {
        self.slots.get_mut(id.0).map(|e| (&*e.key, &mut e.value))
    }

    /// Unlink the entry from its chain and reclaim its slot, returning the
    /// owned key and value. `None` for a stale id.
    pub fn remove(&mut self, id: EntryId) -> Option<(Box<str>, V)> {
        let _g = self.reentry.enter();
        let entry = self.slots.remove(id.0)?;

        match entry.prev {
            Some(p) => self.slots[p].next = entry.next,
            // Head of its chain: the bucket slot is the only inbound link.
            None => {
                let bucket = self.bucket_of(entry.digest);
                self.buckets[bucket] = entry.next;
            }
        }
        if let Some(n) = entry.next {
            self.slots[n].prev = entry.prev;
        }

        Some((entry.key, entry.value))
    }

    /// Double the bucket count: new mask `(m << 1) | 1`. A no-op at the
    /// largest representable mask.
    pub fn grow(&mut self) {
        let _g = self.reentry.enter();
        if let Some(mask) = grown_mask(self.mask) {
            Self::relink(&mut self.slots, &mut self.buckets, &mut self.mask, mask);
        }
    }

    /// Halve the bucket count: new mask `m >> 1`, floored at one bucket.
    pub fn shrink(&mut self) {
        let _g = self.reentry.enter();
        if self.mask == 0 {
            return;
        }
        let mask = self.mask >> 1;
        Self::relink(&mut self.slots, &mut self.buckets, &mut self.mask, mask);
    }

    /// Rebuild the bucket table at `mask` and relink every entry from its
    /// stored digest. Entries stay put in the arena, so ids remain valid
    /// and values are not touched; only chain membership changes.
    fn relink(
        slots: &mut SlotMap<DefaultKey, Entry<V>>,
        buckets: &mut Vec<Option<DefaultKey>>,
        mask_field: &mut u64,
        mask: u64,
    ) {
        *mask_field = mask;
        buckets.clear();
        buckets.resize(mask as usize + 1, None);

        let ids: Vec<DefaultKey> = slots.keys().collect();
        for id in ids {
            let bucket = ((slots[id].digest as u64) & mask) as usize;
            let head = buckets[bucket];
            let e = &mut slots[id];
            e.prev = None;
            e.next = head;
            if let Some(h) = head {
                slots[h].prev = Some(id);
            }
            buckets[bucket] = Some(id);
        }
    }

    /// Walk buckets in index order, each chain head to tail. Deterministic
    /// for a fixed mask and insertion history; not insertion order, and a
    /// grow/shrink reshuffles it.
    pub fn iter(&self) -> Iter<'_, V, D> {
        Iter {
            map: self,
            bucket: 0,
            cursor: None,
        }
    }
}

/// Bucket-order iterator over `(EntryId, &str, &V)`.
pub struct Iter<'a, V, D> {
    map: &'a ChainMap<V, D>,
    bucket: usize,
    cursor: Option<DefaultKey>,
}

impl<'a, V, D> Iterator for Iter<'a, V, D> {
    type Item = (EntryId, &'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.cursor {
                Some(id) => {
                    let e = &self.map.slots[id];
                    self.cursor = e.next;
                    return Some((EntryId(id), &*e.key, &e.value));
                }
                None => {
                    if self.bucket >= self.map.buckets.len() {
                        return None;
                    }
                    self.cursor = self.map.buckets[self.bucket];
                    self.bucket += 1;
                }
            }
        }
    }
}
