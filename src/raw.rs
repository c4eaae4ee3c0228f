//! Type-erased table core
//!
//! The table stores opaque keys and values described only by a
//! [`RecordLayout`]: one contiguous storage block holds `slot_count`
//! fixed-stride records, each an occupied flag followed by key and value
//! bytes at precomputed offsets. Collisions are resolved by linear
//! probing with a power-of-two slot count, so the probe sequence wraps
//! with a mask. Deletion is tombstone-free: the records displaced past a
//! vacated slot are shifted backward so every surviving key stays
//! reachable from its home bucket.
//!
//! The storage block is obtained from the global allocator with an
//! explicit [`Layout`], zeroed so that every occupied flag starts false
//! and every padding byte is initialized. A grow-resize allocates a
//! fresh block of double the slot count, re-inserts each occupied record
//! by its recomputed home bucket, and only then swaps the block in and
//! frees the old one; an allocation failure therefore leaves the table
//! exactly as it was.
//!
//! It's critical for soundness that the occupied flags accurately track
//! which key and value byte ranges hold live objects. The flag is set
//! only after both copies complete, cleared before (during remove) or
//! after (during backward shift) the bytes move, and consulted before
//! every read and every finalizer call. Callers of the `unsafe` methods
//! must pass pointers to properly initialized key/value objects matching
//! the construction-time layout; everything else is enforced here.
//!
//! Nothing in this module synchronizes: the table assumes one thread, or
//! mutual exclusion imposed by the embedding.

use std::alloc;
use std::ptr::{self, NonNull};
use std::slice;

use crate::err::Error;
use crate::fingerprint::fingerprint;
use crate::layout::RecordLayout;

/// Numerator of the maximum load factor (4/5)
const MAX_LOAD_NUM: usize = 4;
/// Denominator of the maximum load factor (4/5)
const MAX_LOAD_DEN: usize = 5;

/// Most entries a table with `n_slots` slots may hold,
/// `floor(n_slots * 4/5)`, computed without intermediate overflow.
#[inline]
fn max_entries(n_slots: usize) -> usize {
    (n_slots / MAX_LOAD_DEN) * MAX_LOAD_NUM + (n_slots % MAX_LOAD_DEN) * MAX_LOAD_NUM / MAX_LOAD_DEN
}

/// Optional type-erased callbacks configured at construction
///
/// Each callback receives pointers into table storage (or caller-supplied
/// key pointers) that reference initialized objects of the construction
/// layout's key or value type. Absent callbacks fall back to the default
/// behavior: fingerprinting the raw key bytes and comparing keys
/// byte-wise, with no finalization.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawTableFns {
    /// Hash a key, replacing the default fingerprint over its raw bytes
    pub key_hash: Option<unsafe fn(*const u8) -> u64>,
    /// Compare two keys, replacing byte-wise equality
    pub key_eq: Option<unsafe fn(*const u8, *const u8) -> bool>,
    /// Finalize a key removed from the table
    pub key_drop: Option<unsafe fn(*mut u8)>,
    /// Finalize a value removed from the table
    pub value_drop: Option<unsafe fn(*mut u8)>,
}

/// Pointer to the record at `slot` within a storage block.
///
/// # Safety
///
/// `slot` must be in range for the block behind `base`, which must have
/// been allocated for `layout`.
#[inline(always)]
unsafe fn record_at(base: NonNull<u8>, layout: &RecordLayout, slot: usize) -> *mut u8 {
    // SAFETY: the caller guarantees the offset stays inside the block.
    unsafe { base.as_ptr().add(slot * layout.stride()) }
}

/// Pointer to the occupied flag of the record at `slot`.
///
/// # Safety
///
/// Same contract as [`record_at`].
#[inline(always)]
unsafe fn flag_at(base: NonNull<u8>, layout: &RecordLayout, slot: usize) -> *mut bool {
    // SAFETY: the flag starts the record; storage is zero-initialized, so
    //         the bool is always one of its two valid bit patterns.
    unsafe { record_at(base, layout, slot).cast::<bool>() }
}

/// Pointer to the key bytes of the record at `slot`.
///
/// # Safety
///
/// Same contract as [`record_at`].
#[inline(always)]
unsafe fn key_at(base: NonNull<u8>, layout: &RecordLayout, slot: usize) -> *mut u8 {
    // SAFETY: key_offset is in range for the record by construction.
    unsafe { record_at(base, layout, slot).add(layout.key_offset()) }
}

/// Pointer to the value bytes of the record at `slot`.
///
/// # Safety
///
/// Same contract as [`record_at`].
#[inline(always)]
unsafe fn value_at(base: NonNull<u8>, layout: &RecordLayout, slot: usize) -> *mut u8 {
    // SAFETY: value_offset is in range for the record by construction.
    unsafe { record_at(base, layout, slot).add(layout.value_offset()) }
}

/// Allocate a zeroed storage block for the given layout.
fn alloc_storage(layout: alloc::Layout) -> Result<NonNull<u8>, Error> {
    // SAFETY: the layout has nonzero size, since even a record of
    //         zero-sized key and value contains the occupied flag.
    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    NonNull::new(ptr).ok_or(Error::Alloc(layout.size()))
}

/// Type-erased open-addressing hash table
///
/// The safe, typed way to use this crate is [`Table`](crate::Table);
/// `RawTable` is the underlying core for embeddings that only know key
/// and value shapes at runtime.
#[derive(Debug)]
pub struct RawTable {
    /// Record layout fixed at construction
    layout: RecordLayout,
    /// Configured callbacks
    fns: RawTableFns,
    /// Number of slots, always a nonzero power of two
    n_slots: usize,
    /// Number of occupied slots, at most `max_entries(n_slots)`
    n_entries: usize,
    /// The single storage allocation, `n_slots * stride` bytes
    storage: NonNull<u8>,
}

impl RawTable {
    /// Create a table with the given record layout, callbacks, and
    /// initial slot count.
    ///
    /// The slot count must be a nonzero power of two. Fails with
    /// [`Error::Alloc`] only if the storage allocation fails.
    pub fn new(
        layout: RecordLayout,
        fns: RawTableFns,
        initial_slots: usize,
    ) -> Result<Self, Error> {
        if initial_slots == 0 || !initial_slots.is_power_of_two() {
            return Err(Error::SlotCount);
        }
        let storage = alloc_storage(layout.storage(initial_slots)?)?;
        Ok(Self {
            layout,
            fns,
            n_slots: initial_slots,
            n_entries: 0,
            storage,
        })
    }

    /// Number of occupied slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.n_entries
    }

    /// Whether the table holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_entries == 0
    }

    /// Current number of slots.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.n_slots
    }

    /// The record layout this table was constructed with.
    #[inline]
    pub fn record_layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Hash a key through the configured callback or the default
    /// fingerprint over its raw bytes.
    ///
    /// # Safety
    ///
    /// `key` must point to an initialized key object of the layout's key
    /// size, valid for the configured `key_hash` callback.
    #[inline]
    unsafe fn hash_key(&self, key: *const u8) -> u64 {
        match self.fns.key_hash {
            // SAFETY: forwarded caller contract.
            Some(hash) => unsafe { hash(key) },
            // SAFETY: `key` references at least key_size readable bytes.
            None => fingerprint(unsafe { slice::from_raw_parts(key, self.layout.key_size()) }),
        }
    }

    /// Compare two keys through the configured callback or byte-wise.
    ///
    /// # Safety
    ///
    /// Both pointers must reference initialized key objects.
    #[inline]
    unsafe fn keys_equal(&self, a: *const u8, b: *const u8) -> bool {
        match self.fns.key_eq {
            // SAFETY: forwarded caller contract.
            Some(eq) => unsafe { eq(a, b) },
            // SAFETY: both reference at least key_size readable bytes.
            None => unsafe {
                slice::from_raw_parts(a, self.layout.key_size())
                    == slice::from_raw_parts(b, self.layout.key_size())
            },
        }
    }

    /// Whether the slot holds a live record.
    ///
    /// # Safety
    ///
    /// `slot` must be less than `self.n_slots`.
    #[inline(always)]
    unsafe fn occupied(&self, slot: usize) -> bool {
        // SAFETY: in-range slot within our own storage.
        unsafe { *flag_at(self.storage, &self.layout, slot) }
    }

    /// Home bucket of a key within the current slot count.
    ///
    /// # Safety
    ///
    /// Same contract as [`Self::hash_key`].
    #[inline]
    unsafe fn home_bucket(&self, key: *const u8) -> usize {
        let mask = (self.n_slots - 1) as u64;
        // SAFETY: forwarded caller contract.
        (unsafe { self.hash_key(key) } & mask) as usize
    }

    /// Probe for the slot holding an equal key.
    ///
    /// Returns `None` upon reaching an empty slot first. Terminates
    /// because the load factor bound keeps at least one slot empty.
    ///
    /// # Safety
    ///
    /// `key` must point to an initialized key object.
    unsafe fn find(&self, key: *const u8) -> Option<usize> {
        let mask = self.n_slots - 1;
        // SAFETY: forwarded caller contract; probed slots are in range.
        unsafe {
            let mut slot = self.home_bucket(key);
            loop {
                if !self.occupied(slot) {
                    return None;
                }
                if self.keys_equal(key, key_at(self.storage, &self.layout, slot)) {
                    return Some(slot);
                }
                slot = (slot + 1) & mask;
            }
        }
    }

    /// Insert a key/value pair, copying both byte-for-byte into storage.
    ///
    /// Grows the table first whenever the insert would push the entry
    /// count past `floor(slot_count * 4/5)`. Returns
    /// [`Error::AlreadyPresent`], mutating nothing, if an equal key
    /// occupies a slot; returns [`Error::Alloc`], mutating nothing, if a
    /// grow-resize cannot allocate.
    ///
    /// On success the stored bytes are the live copy: callers moving
    /// resource-owning objects in must forget their originals.
    ///
    /// # Safety
    ///
    /// `key` and `value` must point to initialized objects of the
    /// construction layout's key and value types, valid for the
    /// configured callbacks.
    pub unsafe fn insert(&mut self, key: *const u8, value: *const u8) -> Result<(), Error> {
        if self.n_entries >= max_entries(self.n_slots) {
            self.grow()?;
        }
        let mask = self.n_slots - 1;
        // SAFETY: forwarded caller contract; probed slots are in range,
        //         and the load factor bound guarantees an empty slot.
        unsafe {
            let mut slot = self.home_bucket(key);
            loop {
                if !self.occupied(slot) {
                    ptr::copy_nonoverlapping(
                        key,
                        key_at(self.storage, &self.layout, slot),
                        self.layout.key_size(),
                    );
                    ptr::copy_nonoverlapping(
                        value,
                        value_at(self.storage, &self.layout, slot),
                        self.layout.value_size(),
                    );
                    // Mark occupied only once both copies are in place.
                    *flag_at(self.storage, &self.layout, slot) = true;
                    self.n_entries += 1;
                    return Ok(());
                }
                if self.keys_equal(key, key_at(self.storage, &self.layout, slot)) {
                    return Err(Error::AlreadyPresent);
                }
                slot = (slot + 1) & mask;
            }
        }
    }

    /// Double the slot count, migrating every occupied record.
    ///
    /// The new block is fully populated before the table is touched, so
    /// an allocation failure leaves no visible change.
    fn grow(&mut self) -> Result<(), Error> {
        let old_slots = self.n_slots;
        let old_layout = self.layout.storage(old_slots)?;
        let new_slots = old_slots.checked_mul(2).ok_or(Error::SlotCount)?;
        let new_storage = alloc_storage(self.layout.storage(new_slots)?)?;
        let new_mask = new_slots - 1;

        // SAFETY: source slots are in range of the old block, destination
        //         slots in range of the new one. Records are moved, never
        //         duplicated: the old block is freed without finalizers.
        unsafe {
            for slot in 0..old_slots {
                if !self.occupied(slot) {
                    continue;
                }
                let key = key_at(self.storage, &self.layout, slot);
                let mut dst = (self.hash_key(key) & new_mask as u64) as usize;
                // Source keys are already unique, so the first empty slot
                // wins without any equality checks.
                while *flag_at(new_storage, &self.layout, dst) {
                    dst = (dst + 1) & new_mask;
                }
                ptr::copy_nonoverlapping(
                    key,
                    key_at(new_storage, &self.layout, dst),
                    self.layout.key_size(),
                );
                ptr::copy_nonoverlapping(
                    value_at(self.storage, &self.layout, slot),
                    value_at(new_storage, &self.layout, dst),
                    self.layout.value_size(),
                );
                *flag_at(new_storage, &self.layout, dst) = true;
            }
            // SAFETY: the old block was allocated with exactly old_layout.
            alloc::dealloc(self.storage.as_ptr(), old_layout);
        }
        self.storage = new_storage;
        self.n_slots = new_slots;
        Ok(())
    }

    /// Look up the stored value bytes for a key.
    ///
    /// The pointer is valid until the next insert, remove, or drop of the
    /// table.
    ///
    /// # Safety
    ///
    /// `key` must point to an initialized key object.
    pub unsafe fn get(&self, key: *const u8) -> Option<*const u8> {
        // SAFETY: forwarded caller contract; found slots are in range.
        unsafe {
            self.find(key)
                .map(|slot| value_at(self.storage, &self.layout, slot).cast_const())
        }
    }

    /// Look up the stored value bytes for a key, mutably.
    ///
    /// # Safety
    ///
    /// `key` must point to an initialized key object.
    pub unsafe fn get_mut(&mut self, key: *const u8) -> Option<*mut u8> {
        // SAFETY: forwarded caller contract; found slots are in range.
        unsafe {
            self.find(key)
                .map(|slot| value_at(self.storage, &self.layout, slot))
        }
    }

    /// Remove a key, running the configured finalizers on the stored key
    /// and value. A no-op when the key is absent.
    ///
    /// # Safety
    ///
    /// `key` must point to an initialized key object.
    pub unsafe fn remove(&mut self, key: *const u8) {
        // SAFETY: forwarded caller contract throughout; `slot` is the
        //         in-range result of the probe.
        unsafe {
            let Some(slot) = self.find(key) else {
                return;
            };
            if let Some(drop_key) = self.fns.key_drop {
                drop_key(key_at(self.storage, &self.layout, slot));
            }
            if let Some(drop_value) = self.fns.value_drop {
                drop_value(value_at(self.storage, &self.layout, slot));
            }
            *flag_at(self.storage, &self.layout, slot) = false;
            self.n_entries -= 1;
            self.backshift(slot);
        }
    }

    /// Close the gap left by a removal without tombstones.
    ///
    /// Scans forward from the vacated slot. A record at `cur` with home
    /// bucket `home` is shifted into the gap exactly when the gap lies on
    /// its probe path, i.e. when the circular distance from `home` to
    /// `cur` is at least the distance from the gap to `cur`. A record
    /// sitting in its own home bucket never moves. The scan stops at the
    /// first empty slot, which the load factor bound guarantees exists.
    ///
    /// # Safety
    ///
    /// `gap` must be an in-range, freshly vacated slot.
    unsafe fn backshift(&mut self, mut gap: usize) {
        let mask = self.n_slots - 1;
        // SAFETY: every probed slot is masked into range; records are
        //         copied between a live slot and the vacant gap, and the
        //         flags are updated so exactly one copy stays live.
        unsafe {
            let mut cur = (gap + 1) & mask;
            while self.occupied(cur) {
                let home = self.home_bucket(key_at(self.storage, &self.layout, cur));
                if (cur.wrapping_sub(home) & mask) >= (cur.wrapping_sub(gap) & mask) {
                    // Whole-record copy carries the set flag into the gap.
                    ptr::copy_nonoverlapping(
                        record_at(self.storage, &self.layout, cur),
                        record_at(self.storage, &self.layout, gap),
                        self.layout.stride(),
                    );
                    *flag_at(self.storage, &self.layout, cur) = false;
                    gap = cur;
                }
                cur = (cur + 1) & mask;
            }
        }
    }

    /// Iterate the occupied records in physical slot order.
    ///
    /// Yields exactly [`Self::len`] items. The borrow prevents any
    /// concurrent mutation of the table for the iterator's lifetime.
    pub fn iter(&self) -> RawIter<'_> {
        RawIter {
            table: self,
            slot: 0,
            yielded: 0,
        }
    }
}

impl Drop for RawTable {
    fn drop(&mut self) {
        // Finalize every still-occupied record before freeing storage.
        if self.fns.key_drop.is_some() || self.fns.value_drop.is_some() {
            for slot in 0..self.n_slots {
                // SAFETY: in-range slots; finalizers run once per live
                //         record, which the occupied flag tracks.
                unsafe {
                    if !self.occupied(slot) {
                        continue;
                    }
                    if let Some(drop_key) = self.fns.key_drop {
                        drop_key(key_at(self.storage, &self.layout, slot));
                    }
                    if let Some(drop_value) = self.fns.value_drop {
                        drop_value(value_at(self.storage, &self.layout, slot));
                    }
                }
            }
        }
        if let Ok(layout) = self.layout.storage(self.n_slots) {
            // SAFETY: the block was allocated with exactly this layout.
            // The Ok branch always runs: the same computation succeeded
            // when the block was allocated.
            unsafe { alloc::dealloc(self.storage.as_ptr(), layout) };
        }
    }
}

/// Iterator over the occupied records of a [`RawTable`]
///
/// Yields `(key, value)` pointers into table storage in physical slot
/// order, scanning slots `0..slot_count` once.
#[derive(Debug)]
pub struct RawIter<'a> {
    /// The borrowed table
    table: &'a RawTable,
    /// Next slot to examine
    slot: usize,
    /// Records yielded so far
    yielded: usize,
}

impl<'a> Iterator for RawIter<'a> {
    type Item = (*const u8, *const u8);

    fn next(&mut self) -> Option<Self::Item> {
        while self.slot < self.table.n_slots {
            let slot = self.slot;
            self.slot += 1;
            // SAFETY: `slot` is in range and the borrow of the table
            //         keeps the storage and flags unchanged.
            unsafe {
                if self.table.occupied(slot) {
                    self.yielded += 1;
                    return Some((
                        key_at(self.table.storage, &self.table.layout, slot).cast_const(),
                        value_at(self.table.storage, &self.table.layout, slot).cast_const(),
                    ));
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.table.n_entries - self.yielded;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RawIter<'_> {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn u64_table(slots: usize) -> RawTable {
        let layout = RecordLayout::of::<u64, u64>().unwrap();
        RawTable::new(layout, RawTableFns::default(), slots).unwrap()
    }

    fn insert_u64(table: &mut RawTable, key: u64, value: u64) -> Result<(), Error> {
        // SAFETY: pointers reference initialized u64s matching the layout.
        unsafe {
            table.insert(
                (&key as *const u64).cast::<u8>(),
                (&value as *const u64).cast::<u8>(),
            )
        }
    }

    fn get_u64(table: &RawTable, key: u64) -> Option<u64> {
        // SAFETY: the key pointer references an initialized u64, and a
        //         returned value pointer references a stored u64.
        unsafe {
            table
                .get((&key as *const u64).cast::<u8>())
                .map(|p| p.cast::<u64>().read())
        }
    }

    #[test]
    fn slot_count_must_be_a_power_of_two() {
        let layout = RecordLayout::of::<u64, u64>().unwrap();
        for slots in [0, 3, 6, 100] {
            assert!(matches!(
                RawTable::new(layout, RawTableFns::default(), slots),
                Err(Error::SlotCount)
            ));
        }
        assert!(RawTable::new(layout, RawTableFns::default(), 1).is_ok());
    }

    #[test]
    fn erased_round_trip() {
        let mut table = u64_table(4);
        insert_u64(&mut table, 20, 200).unwrap();
        assert_eq!(get_u64(&table, 20), Some(200));
        assert_eq!(get_u64(&table, 21), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn load_factor_bound_holds_across_growth() {
        let mut table = u64_table(4);
        for key in 0..1000_u64 {
            insert_u64(&mut table, key, key * 2).unwrap();
            assert!(table.len() <= max_entries(table.slot_count()));
        }
        assert_eq!(table.len(), 1000);
        for key in 0..1000_u64 {
            assert_eq!(get_u64(&table, key), Some(key * 2));
        }
    }

    #[test]
    fn max_entries_is_floor_of_four_fifths() {
        assert_eq!(max_entries(1), 0);
        assert_eq!(max_entries(2), 1);
        assert_eq!(max_entries(4), 3);
        assert_eq!(max_entries(1024), 819);
    }

    #[test]
    fn mixed_alignment_records_survive_probing() {
        // A 3-byte key before an 8-byte value exercises the padding in
        // the record layout.
        let layout = RecordLayout::of::<[u8; 3], u64>().unwrap();
        let mut table = RawTable::new(layout, RawTableFns::default(), 8).unwrap();
        for i in 0..100_u8 {
            let key = [i, i.wrapping_mul(7), 3];
            let value = u64::from(i) << 32;
            // SAFETY: pointers reference initialized objects of the
            //         layout's key and value types.
            unsafe {
                table
                    .insert(
                        (&key as *const [u8; 3]).cast::<u8>(),
                        (&value as *const u64).cast::<u8>(),
                    )
                    .unwrap();
                let found = table.get((&key as *const [u8; 3]).cast::<u8>()).unwrap();
                assert_eq!(found.cast::<u64>().read(), value);
            }
        }
        assert_eq!(table.len(), 100);
    }

    #[test]
    fn raw_iter_visits_each_entry_once() {
        let mut table = u64_table(16);
        for key in 0..10_u64 {
            insert_u64(&mut table, key, key + 100).unwrap();
        }
        let mut seen = std::collections::HashSet::new();
        let mut iter = table.iter();
        assert_eq!(iter.len(), 10);
        // SAFETY: yielded pointers reference stored u64s.
        for (key, value) in &mut iter {
            let (key, value) = unsafe { (key.cast::<u64>().read(), value.cast::<u64>().read()) };
            assert_eq!(value, key + 100);
            assert!(seen.insert(key));
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(iter.len(), 0);
    }
}
