//! The handle integer types and the typed pointer wrapper built on top of
//! them (spec component G).
//!
//! A [`Handle16`]/[`Handle32`] is a small unsigned integer standing in for a
//! pointer inside a slab-backed container; `0` always means null. The raw
//! integer is partitioned into tag bits (decoded by [`crate::config`]) and a
//! payload. This module only deals with the integer itself and the typed,
//! dereference-free wrapper around it; address translation lives in
//! [`crate::config`], since translating requires the ambient arena/stack/
//! container context.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// An unsigned integer usable as the payload of a handle.
///
/// Implemented for `u16` and `u32`, the two widths the crate's data model
/// allows (spec §3). Sealed: the bit-layout constants below only make sense
/// for these two widths.
pub trait HandleInt:
    Copy + Clone + Eq + PartialEq + Ord + Hash + fmt::Debug + fmt::Display + Default + sealed::Sealed
{
    /// Width of the handle in bits.
    const BITS: u32;
    /// The null handle.
    const ZERO: Self;
    /// Top bit: stack-handle tag (both simple and universal encoding).
    const ONSTACK: Self;
    /// Second-from-top bit: container-body tag (universal encoding only).
    const CONTAINER: Self;
    /// Mask of everything except [`Self::ONSTACK`] and [`Self::CONTAINER`].
    const PAYLOAD_MASK: Self;

    fn from_usize(v: usize) -> Self;
    fn to_usize(self) -> usize;
    fn bitor(self, other: Self) -> Self;
    fn bitand(self, other: Self) -> Self;
    fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
}

macro_rules! impl_handle_int {
    ($ty:ty) => {
        impl HandleInt for $ty {
            const BITS: u32 = <$ty>::BITS;
            const ZERO: Self = 0;
            const ONSTACK: Self = 1 << (<$ty>::BITS - 1);
            const CONTAINER: Self = 1 << (<$ty>::BITS - 2);
            const PAYLOAD_MASK: Self = !(Self::ONSTACK | Self::CONTAINER);

            fn from_usize(v: usize) -> Self {
                v as Self
            }

            fn to_usize(self) -> usize {
                self as usize
            }

            fn bitor(self, other: Self) -> Self {
                self | other
            }

            fn bitand(self, other: Self) -> Self {
                self & other
            }
        }
    };
}
impl_handle_int!(u16);
impl_handle_int!(u32);

/// 16-bit handle payload.
pub type Handle16 = u16;
/// 32-bit handle payload.
pub type Handle32 = u32;

/// A typed, nullable reference made of a raw [`HandleInt`] instead of a
/// machine pointer.
///
/// `TypedHandle` carries no behaviour of its own beyond null-checking,
/// equality, raw-integer access and up/down casts to the erased
/// `TypedHandle<(), H>` ("void handle"); dereferencing goes through
/// [`crate::config::ArenaConfig::to_address`], since that requires the
/// ambient context this type intentionally does not carry. No pointer
/// arithmetic, no indexing — those don't make sense for a slot handle.
#[repr(transparent)]
pub struct TypedHandle<T, H: HandleInt> {
    raw: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T, H: HandleInt> TypedHandle<T, H> {
    /// The null handle.
    pub const NULL: Self = Self {
        raw: H::ZERO,
        _marker: PhantomData,
    };

    /// Wrap a raw handle value as-is (no validation against any arena).
    pub const fn from_raw(raw: H) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Access the underlying integer, e.g. for atomic update inside an
    /// intrusive container's own linkage fields.
    pub const fn as_raw(self) -> H {
        self.raw
    }

    pub fn is_null(self) -> bool {
        self.raw.is_zero()
    }

    /// Erase the element type, widening to a "void handle".
    pub const fn erase(self) -> TypedHandle<(), H> {
        TypedHandle::from_raw(self.raw)
    }

    /// Narrow a void handle back to a concrete element type.
    ///
    /// This is the explicit-narrowing half of spec component G; the caller
    /// is responsible for the cast being sound (the handle must actually
    /// have been produced for a `T`-typed slot).
    pub const fn cast<U>(self) -> TypedHandle<U, H> {
        TypedHandle::from_raw(self.raw)
    }
}

impl<T, H: HandleInt> Clone for TypedHandle<T, H> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T, H: HandleInt> Copy for TypedHandle<T, H> {}

impl<T, H: HandleInt> PartialEq for TypedHandle<T, H> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl<T, H: HandleInt> Eq for TypedHandle<T, H> {}

impl<T, H: HandleInt> PartialOrd for TypedHandle<T, H> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T, H: HandleInt> Ord for TypedHandle<T, H> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T, H: HandleInt> Hash for TypedHandle<T, H> {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.raw.hash(state);
    }
}

impl<T, H: HandleInt> Default for TypedHandle<T, H> {
    fn default() -> Self {
        Self::NULL
    }
}

impl<T, H: HandleInt> fmt::Debug for TypedHandle<T, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedHandle").field(&self.raw).finish()
    }
}
