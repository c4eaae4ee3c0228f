//! Typed key seam
//!
//! [`Table`](crate::Table) needs two facts about a key type: how to
//! fingerprint it and how to compare two of them. The [`Key`] trait
//! carries both, and the table turns its methods into the type-erased
//! callbacks the raw core runs during probing.
//!
//! Padding-free types get the byte-wise defaults for free through
//! [`byte_fingerprint`] and [`byte_matches`]; the primitive integers and
//! byte arrays are implemented here. Types with padding, interior
//! pointers, or domain-specific equality implement [`Key`] by hand.

use bytemuck::NoUninit;

use crate::fingerprint::fingerprint;

/// Key behavior required by a typed table
///
/// Implementations must be consistent: `a.matches(b)` implies
/// `a.fingerprint() == b.fingerprint()`, or equal keys land in different
/// home buckets and the uniqueness invariant breaks.
pub trait Key {
    /// Fingerprint this key as a 64-bit value.
    fn fingerprint(&self) -> u64;

    /// Compare two keys for equality.
    fn matches(&self, other: &Self) -> bool;
}

/// Fingerprint any padding-free value by its raw bytes.
///
/// This is the default hashing behavior of the table. Note the contract
/// this implies for hand-written [`Key`] impls on buffer-like types: every
/// byte participates, so trailing garbage in an otherwise-equal buffer
/// makes two keys distinct. `NoUninit` rules out padding bytes, which is
/// what makes the byte view sound in the first place.
#[inline]
pub fn byte_fingerprint<T: NoUninit>(value: &T) -> u64 {
    fingerprint(bytemuck::bytes_of(value))
}

/// Compare any two padding-free values by their raw bytes.
#[inline]
pub fn byte_matches<T: NoUninit>(a: &T, b: &T) -> bool {
    bytemuck::bytes_of(a) == bytemuck::bytes_of(b)
}

/// Implement [`Key`] byte-wise for a list of `NoUninit` types.
macro_rules! byte_keys {
    ($($t:ty),* $(,)?) => {
        $(
            impl Key for $t {
                #[inline]
                fn fingerprint(&self) -> u64 {
                    byte_fingerprint(self)
                }

                #[inline]
                fn matches(&self, other: &Self) -> bool {
                    byte_matches(self, other)
                }
            }
        )*
    };
}

byte_keys!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl<const N: usize> Key for [u8; N] {
    #[inline]
    fn fingerprint(&self) -> u64 {
        byte_fingerprint(self)
    }

    #[inline]
    fn matches(&self, other: &Self) -> bool {
        byte_matches(self, other)
    }
}
