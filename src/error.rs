//! Error types returned by the arena and its configuration layer.
//!
//! Precondition violations (size mismatch, out-of-range handles, misaligned
//! addresses, overfull stack encodings) are *not* represented here: per the
//! crate's design, those are programming bugs, checked only under
//! `debug_assertions` and otherwise undefined behaviour. Only the handful of
//! genuinely recoverable runtime failures get an [`ArenaError`] variant.

use core::fmt;

/// A runtime or configuration failure from the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum ArenaError {
    /// [`crate::arena::st::SlabArena::set_capacity`] (or the MT equivalent)
    /// was asked for a capacity that does not fit in the handle's payload
    /// bits for the configured encoding.
    #[cfg_attr(feature = "std", error("requested capacity does not fit in the handle width"))]
    CapacityTooLarge,
    /// `set_capacity` was called after the arena's buffer has already been
    /// acquired (i.e. after the first `allocate`).
    #[cfg_attr(feature = "std", error("capacity cannot change after the first allocation"))]
    AllocationInProgress,
    /// The arena's slot capacity is exhausted and the free list is empty, or
    /// the backing buffer source failed to acquire its region.
    #[cfg_attr(feature = "std", error("arena capacity exhausted or buffer source failed"))]
    OutOfMemory,
}

#[cfg(not(feature = "std"))]
impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::CapacityTooLarge => "requested capacity does not fit in the handle width",
            Self::AllocationInProgress => "capacity cannot change after the first allocation",
            Self::OutOfMemory => "arena capacity exhausted or buffer source failed",
        };
        f.write_str(msg)
    }
}
