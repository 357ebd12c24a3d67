//! Thread-safe slab arena with a lock-free tagged-CAS free list (spec
//! component C).
//!
//! Shares [`crate::arena::st::SlabArena`]'s external contract, but
//! `allocate`/`deallocate` take `&self` and are safe to call from any
//! thread in any interleaving once the buffer is acquired. Only the first
//! allocation of the program blocks, briefly, while the buffer source is
//! acquired under a [`spin::Mutex`] critical section; a sticky
//! "acquisition failed" latch makes every later caller fail fast instead of
//! retrying the buffer source. `set_capacity`/`reset`/`free_memory` are
//! **not** safe to call concurrently with `allocate`/`deallocate` — callers
//! must ensure external quiescence, exactly as spec §4.C requires; this
//! crate encodes that by requiring `&mut self` for them.
//!
//! # Tagged CAS free list
//! The free-list head is one `AtomicU64` split into a 32-bit monotonic
//! stamp and the top-of-list handle (using a 64-bit word for both 16- and
//! 32-bit handles, wider than spec's "matching the handle width is
//! sufficient" floor — see `DESIGN.md`). Every successful push or pop bumps
//! the stamp, so a CAS racing against an intervening pop-push-pop of the
//! same slot always observes a stamp mismatch and retries instead of
//! corrupting the list (the ABA class spec §4.C describes).
//!
//! # No read barrier on lookups
//! `get_element`/`pointer_to` read the published buffer base with
//! `Acquire` (paired with the `Release` store in the one-shot acquisition),
//! and otherwise trust that a handle is never used on a thread before that
//! thread observed it through the container's own publication — spec's
//! documented assumption for avoiding a fence on every dereference.

use super::{read_free_link, write_free_link, Arena};
use crate::buffer::BufferSource;
use crate::error::ArenaError;
use crate::handle::HandleInt;

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

const UNINIT: u8 = 0;
const READY: u8 = 1;
const FAILED: u8 = 2;

/// A fixed-capacity slab arena safe to allocate from and deallocate to
/// concurrently.
pub struct SlabArenaMt<H: HandleInt, B: BufferSource + Send> {
    source: UnsafeCell<B>,
    acquire_lock: spin::Mutex<()>,
    state: AtomicU8,
    base: AtomicUsize,
    capacity: usize,
    element_size: AtomicUsize,
    used_capacity: AtomicUsize,
    allocated_count: AtomicUsize,
    /// High 32 bits: monotonic stamp. Low 32 bits: top-of-free-list handle.
    free_head: AtomicU64,
    delete_enabled: bool,
    _handle: PhantomData<H>,
}

// SAFETY: all mutable state is either behind atomics or behind
// `acquire_lock`, which serializes the only place `source` (an
// `UnsafeCell`) is mutated while `state == UNINIT`.
unsafe impl<H: HandleInt, B: BufferSource + Send> Sync for SlabArenaMt<H, B> {}

impl<H: HandleInt, B: BufferSource + Send> SlabArenaMt<H, B> {
    /// Create a new thread-safe arena with the given slot capacity.
    ///
    /// # Errors
    /// [`ArenaError::CapacityTooLarge`] under the same bound as
    /// [`crate::arena::st::SlabArena::new`].
    pub fn new(capacity: usize, delete_enabled: bool, source: B) -> Result<Self, ArenaError> {
        if capacity >= H::ONSTACK.to_usize() {
            return Err(ArenaError::CapacityTooLarge);
        }
        Ok(Self {
            source: UnsafeCell::new(source),
            acquire_lock: spin::Mutex::new(()),
            state: AtomicU8::new(UNINIT),
            base: AtomicUsize::new(0),
            capacity,
            element_size: AtomicUsize::new(0),
            used_capacity: AtomicUsize::new(0),
            allocated_count: AtomicUsize::new(0),
            free_head: AtomicU64::new(0),
            delete_enabled,
            _handle: PhantomData,
        })
    }

    /// Number of slots currently live. Exact only when no `allocate`/
    /// `deallocate` is concurrently in flight; otherwise a momentary
    /// snapshot.
    pub fn allocated_count(&self) -> usize {
        self.allocated_count.load(Ordering::Relaxed)
    }

    fn pack(stamp: u32, handle: u32) -> u64 {
        (u64::from(stamp) << 32) | u64::from(handle)
    }

    fn unpack(word: u64) -> (u32, u32) {
        ((word >> 32) as u32, word as u32)
    }

    fn push(&self, h: H) {
        let handle_bits = h.to_usize() as u32;
        loop {
            let cur = self.free_head.load(Ordering::Acquire);
            let (stamp, head) = Self::unpack(cur);
            let next = H::from_usize(head as usize);

            // SAFETY: `h` is exclusively owned by the caller at this point
            // (it was just handed back via `deallocate` and hasn't been
            // published to any other thread); writing its free-list link is
            // the same embedding `pop`'s read relies on.
            unsafe { write_free_link::<H>(self.get_element(h), next) };

            let new = Self::pack(stamp.wrapping_add(1), handle_bits);
            if self
                .free_head
                .compare_exchange_weak(cur, new, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    fn pop(&self) -> H {
        loop {
            let cur = self.free_head.load(Ordering::Acquire);
            let (stamp, head) = Self::unpack(cur);
            if head == 0 {
                return H::ZERO;
            }
            let handle = H::from_usize(head as usize);

            // SAFETY: `handle` is currently on the free list, so its first
            // bytes hold a valid link written by the `push` that put it
            // there.
            let next = unsafe { read_free_link::<H>(self.get_element(handle)) };
            let new = Self::pack(stamp.wrapping_add(1), next.to_usize() as u32);
            if self
                .free_head
                .compare_exchange_weak(cur, new, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return handle;
            }
        }
    }

    fn ensure_buffer(&self, size: usize) -> Result<(), ArenaError> {
        match self.state.load(Ordering::Acquire) {
            READY => return Ok(()),
            FAILED => return Err(ArenaError::OutOfMemory),
            _ => {}
        }

        let _guard = self.acquire_lock.lock();
        match self.state.load(Ordering::Acquire) {
            READY => return Ok(()),
            FAILED => return Err(ArenaError::OutOfMemory),
            _ => {}
        }

        self.element_size.store(size, Ordering::Relaxed);
        // SAFETY: `acquire_lock` is held and `state == UNINIT`, so no other
        // thread can be concurrently accessing `source`.
        let source = unsafe { &mut *self.source.get() };
        match source.acquire(self.capacity * size) {
            Ok(()) => {
                let base = source.base().map_or(0, |p| p as usize);
                self.base.store(base, Ordering::Relaxed);
                self.state.store(READY, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                self.state.store(FAILED, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Allocate one slot of `size` bytes.
    ///
    /// Safe to call from any thread. See [`crate::arena::st::SlabArena::allocate`]
    /// for the size/alignment preconditions, which apply identically here.
    pub fn allocate(&self, size: usize) -> Result<H, ArenaError> {
        self.ensure_buffer(size)?;

        let popped = self.pop();
        let handle = if !popped.is_zero() {
            popped
        } else {
            let mut cur = self.used_capacity.fetch_add(1, Ordering::AcqRel);
            cur += 1;
            if cur > self.capacity {
                self.used_capacity.fetch_sub(1, Ordering::AcqRel);
                return Err(ArenaError::OutOfMemory);
            }
            H::from_usize(cur)
        };

        self.allocated_count.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    /// Return a slot to the arena. Safe to call from any thread. The MT
    /// arena deliberately does **not** auto-reset when the live count hits
    /// zero (unlike [`crate::arena::st::SlabArena`]) — see spec's open
    /// question about that asymmetry, resolved in `DESIGN.md`.
    pub fn deallocate(&self, h: H, size: usize) {
        debug_assert_eq!(
            size,
            self.element_size.load(Ordering::Relaxed),
            "element size mismatch on deallocate"
        );
        debug_assert!(!h.is_zero(), "deallocating the null handle");

        self.allocated_count.fetch_sub(1, Ordering::Relaxed);
        if self.delete_enabled {
            self.push(h);
        }
    }

    /// Clear the free list and rewind the high-water mark, keeping the
    /// buffer. Requires external quiescence (`&mut self`).
    pub fn reset(&mut self) {
        *self.free_head.get_mut() = 0;
        *self.used_capacity.get_mut() = 0;
        *self.allocated_count.get_mut() = 0;
    }

    /// Reset, then release the buffer and forget the locked element size.
    /// Requires external quiescence (`&mut self`).
    pub fn free_memory(&mut self) {
        self.reset();
        // SAFETY: `&mut self` guarantees no concurrent accessor of `source`.
        unsafe { &mut *self.source.get() }.release();
        *self.base.get_mut() = 0;
        *self.element_size.get_mut() = 0;
        self.state = AtomicU8::new(UNINIT);
    }

    /// Resize the arena's slot capacity. Requires external quiescence.
    ///
    /// # Errors
    /// Same as [`crate::arena::st::SlabArena::set_capacity`].
    pub fn set_capacity(&mut self, n: usize) -> Result<(), ArenaError> {
        if *self.state.get_mut() != UNINIT {
            return Err(ArenaError::AllocationInProgress);
        }
        if n >= H::ONSTACK.to_usize() {
            return Err(ArenaError::CapacityTooLarge);
        }
        self.capacity = n;
        Ok(())
    }
}

impl<H: HandleInt, B: BufferSource + Send> Arena<H> for SlabArenaMt<H, B> {
    fn begin(&self) -> Option<usize> {
        (self.state.load(Ordering::Acquire) == READY).then(|| self.base.load(Ordering::Acquire))
    }

    fn end(&self) -> Option<usize> {
        self.begin()
            .map(|b| b + self.capacity * self.element_size.load(Ordering::Relaxed))
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn used_capacity(&self) -> usize {
        self.used_capacity.load(Ordering::Acquire)
    }

    fn element_size(&self) -> usize {
        self.element_size.load(Ordering::Relaxed)
    }

    fn delete_is_enabled(&self) -> bool {
        self.delete_enabled
    }

    fn pointer_to(&self, addr: usize) -> H {
        let base = self.base.load(Ordering::Acquire);
        let size = self.element_size.load(Ordering::Relaxed);
        debug_assert!((addr - base) % size == 0, "address is not slot-aligned");
        H::from_usize((addr - base) / size + 1)
    }

    fn get_element(&self, h: H) -> *mut u8 {
        let base = self.base.load(Ordering::Acquire);
        let size = self.element_size.load(Ordering::Relaxed);
        let idx = h.to_usize();
        debug_assert!(idx >= 1, "handle out of range");
        (base + (idx - 1) * size) as *mut u8
    }
}
