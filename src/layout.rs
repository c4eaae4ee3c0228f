//! Record layout computation
//!
//! Every slot of a table stores one fixed-size record: an occupied flag,
//! the key bytes, and the value bytes, packed with whatever padding the
//! key and value alignments demand. The layout is computed once at
//! construction with [`std::alloc::Layout`]'s extend/pad rules, so the
//! per-slot addresses are a single multiply-add away and no alignment
//! arithmetic is ever repeated on the access paths.

use std::alloc::Layout;

use crate::err::Error;

/// Packed layout of one table record
///
/// The record begins with the occupied flag at offset zero, followed by
/// the key at `key_offset` and the value at `value_offset`. The record
/// size is padded to the record's own alignment (the maximum of the flag,
/// key, and value alignments), so records laid out back to back in one
/// allocation all stay correctly aligned.
#[derive(Clone, Copy, Debug)]
pub struct RecordLayout {
    /// Layout of a whole record; its size is the slot stride
    record: Layout,
    /// Byte offset of the key within a record
    key_offset: usize,
    /// Byte offset of the value within a record
    value_offset: usize,
    /// Size of the key bytes
    key_size: usize,
    /// Size of the value bytes
    value_size: usize,
}

impl RecordLayout {
    /// Compute the record layout for opaque key and value types given by
    /// size and alignment.
    ///
    /// Fails with [`Error::Layout`] if the sizes are not representable or
    /// the alignments are not powers of two.
    pub fn from_parts(
        key_size: usize,
        key_align: usize,
        value_size: usize,
        value_align: usize,
    ) -> Result<Self, Error> {
        let key = Layout::from_size_align(key_size, key_align)?;
        let value = Layout::from_size_align(value_size, value_align)?;
        Self::new(key, value)
    }

    /// Compute the record layout for concrete key and value types.
    pub fn of<K, V>() -> Result<Self, Error> {
        Self::new(Layout::new::<K>(), Layout::new::<V>())
    }

    /// Compute the record layout from key and value [`Layout`]s.
    pub fn new(key: Layout, value: Layout) -> Result<Self, Error> {
        let flag = Layout::new::<bool>();
        let (record, key_offset) = flag.extend(key)?;
        let (record, value_offset) = record.extend(value)?;
        let record = record.pad_to_align();
        Ok(Self {
            record,
            key_offset,
            value_offset,
            key_size: key.size(),
            value_size: value.size(),
        })
    }

    /// Distance in bytes between consecutive records.
    #[inline(always)]
    pub fn stride(&self) -> usize {
        self.record.size()
    }

    /// Byte offset of the key within a record.
    #[inline(always)]
    pub fn key_offset(&self) -> usize {
        self.key_offset
    }

    /// Byte offset of the value within a record.
    #[inline(always)]
    pub fn value_offset(&self) -> usize {
        self.value_offset
    }

    /// Size of the key bytes.
    #[inline(always)]
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Size of the value bytes.
    #[inline(always)]
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Layout of a storage block holding `n_slots` records.
    ///
    /// The record size is already a multiple of the record alignment, so
    /// a plain multiplied size describes a valid array of records.
    pub fn storage(&self, n_slots: usize) -> Result<Layout, Error> {
        let size = self
            .record
            .size()
            .checked_mul(n_slots)
            .ok_or(Error::Alloc(usize::MAX))?;
        Ok(Layout::from_size_align(size, self.record.align())?)
    }
}
