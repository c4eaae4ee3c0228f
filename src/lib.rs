#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(noop_method_call)]
#![warn(unreachable_pub)]
#![warn(clippy::all)]
#![deny(clippy::cast_lossless)]
#![deny(clippy::checked_conversions)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::semicolon_if_nothing_returned)]
#![deny(clippy::unwrap_used)]

mod err;
mod fingerprint;
mod key;
mod layout;
mod raw;

use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};
use std::ptr;

pub use err::Error;
pub use fingerprint::fingerprint;
pub use key::{byte_fingerprint, byte_matches, Key};
pub use layout::RecordLayout;
pub use raw::{RawIter, RawTable, RawTableFns};

/// Hash a stored key through its typed [`Key`] implementation.
///
/// # Safety
///
/// `key` must point to an initialized `K`.
unsafe fn hash_shim<K: Key>(key: *const u8) -> u64 {
    // SAFETY: the raw core only passes pointers to initialized keys.
    unsafe { (*key.cast::<K>()).fingerprint() }
}

/// Compare two stored keys through their typed [`Key`] implementation.
///
/// # Safety
///
/// Both pointers must point to initialized `K`s.
unsafe fn eq_shim<K: Key>(a: *const u8, b: *const u8) -> bool {
    // SAFETY: the raw core only passes pointers to initialized keys.
    unsafe { (*a.cast::<K>()).matches(&*b.cast::<K>()) }
}

/// Run a stored object's destructor in place.
///
/// # Safety
///
/// `obj` must point to an initialized `T` that is never read again.
unsafe fn drop_shim<T>(obj: *mut u8) {
    // SAFETY: the raw core calls finalizers exactly once per live record.
    unsafe { ptr::drop_in_place(obj.cast::<T>()) }
}

/// An open-addressing hash table over concrete key and value types
///
/// `Table` is the safe facade over [`RawTable`]: the record layout comes
/// from the compiler, hashing and equality from the key's [`Key`]
/// implementation, and destructors are wired automatically whenever `K`
/// or `V` needs dropping. Inserted keys and values are moved into table
/// storage; they are dropped on [`remove`](Self::remove) and when the
/// table itself drops.
///
/// Duplicate keys are rejected rather than overwritten: see
/// [`insert`](Self::insert).
#[derive(Debug)]
pub struct Table<K: Key, V> {
    /// The type-erased core
    raw: RawTable,
    /// The key/value types the raw layout and callbacks were built from
    marker: PhantomData<(K, V)>,
}

impl<K: Key, V> Table<K, V> {
    /// Initial slot count used by [`Table::new`]
    pub const DEFAULT_SLOT_COUNT: usize = 1024;

    /// Create a table with [`Self::DEFAULT_SLOT_COUNT`] initial slots.
    pub fn new() -> Result<Self, Error> {
        Self::with_slots(Self::DEFAULT_SLOT_COUNT)
    }

    /// Create a table with the given initial slot count, which must be a
    /// nonzero power of two.
    ///
    /// Fails with [`Error::SlotCount`] on an invalid slot count and
    /// [`Error::Alloc`] if the storage allocation fails.
    pub fn with_slots(initial_slots: usize) -> Result<Self, Error> {
        let fns = RawTableFns {
            key_hash: Some(hash_shim::<K> as unsafe fn(*const u8) -> u64),
            key_eq: Some(eq_shim::<K> as unsafe fn(*const u8, *const u8) -> bool),
            key_drop: mem::needs_drop::<K>().then_some(drop_shim::<K> as unsafe fn(*mut u8)),
            value_drop: mem::needs_drop::<V>().then_some(drop_shim::<V> as unsafe fn(*mut u8)),
        };
        Ok(Self {
            raw: RawTable::new(RecordLayout::of::<K, V>()?, fns, initial_slots)?,
            marker: PhantomData,
        })
    }

    /// Insert a key/value pair, taking ownership of both.
    ///
    /// If an equal key is already present, nothing is mutated, the stored
    /// value stays intact, and the rejected pair is dropped here; the
    /// call reports [`Error::AlreadyPresent`] so the caller can apply
    /// their own update-or-reject policy. [`Error::Alloc`] likewise
    /// leaves the table untouched and drops the pair.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), Error> {
        let key = ManuallyDrop::new(key);
        let value = ManuallyDrop::new(value);
        // SAFETY: both pointers reference initialized objects of exactly
        //         the types the layout and callbacks were built from.
        let result = unsafe {
            self.raw.insert(
                (&*key as *const K).cast::<u8>(),
                (&*value as *const V).cast::<u8>(),
            )
        };
        match result {
            // The bytes in table storage are now the one live copy.
            Ok(()) => Ok(()),
            Err(e) => {
                // Not stored: ownership returns here so the pair drops.
                drop(ManuallyDrop::into_inner(key));
                drop(ManuallyDrop::into_inner(value));
                Err(e)
            }
        }
    }

    /// Look up the value stored for a key.
    pub fn get(&self, key: &K) -> Option<&V> {
        // SAFETY: the key reference is an initialized K; a returned
        //         pointer is an aligned, initialized V borrowed from
        //         storage for as long as `self` is borrowed.
        unsafe {
            self.raw
                .get((key as *const K).cast::<u8>())
                .map(|value| &*value.cast::<V>())
        }
    }

    /// Look up the value stored for a key, mutably.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        // SAFETY: as for `get`; the exclusive borrow of `self` makes the
        //         exclusive reference sound.
        unsafe {
            self.raw
                .get_mut((key as *const K).cast::<u8>())
                .map(|value| &mut *value.cast::<V>())
        }
    }

    /// Remove a key, dropping the stored key and value. A no-op when the
    /// key is absent.
    pub fn remove(&mut self, key: &K) {
        // SAFETY: the key reference is an initialized K.
        unsafe { self.raw.remove((key as *const K).cast::<u8>()) }
    }

    /// Number of entries in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Whether the table holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Current number of slots. Grows by doubling as entries are added.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.raw.slot_count()
    }

    /// Iterate the entries in physical slot order.
    ///
    /// Yields exactly [`len`](Self::len) items. The borrow keeps the
    /// table immutable for the iterator's lifetime.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            raw: self.raw.iter(),
            marker: PhantomData,
        }
    }
}

/// Iterator over the entries of a [`Table`]
#[derive(Debug)]
pub struct Iter<'a, K, V> {
    /// Iterator over the erased records
    raw: RawIter<'a>,
    /// The types the records hold
    marker: PhantomData<(&'a K, &'a V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: yielded pointers reference initialized K/V objects in
        //         table storage, which the borrow keeps alive and frozen.
        self.raw
            .next()
            .map(|(key, value)| unsafe { (&*key.cast::<K>(), &*value.cast::<V>()) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<'a, K: Key, V> IntoIterator for &'a Table<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
