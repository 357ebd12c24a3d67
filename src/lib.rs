//! Fixed-capacity slab arena that hands out small integer handles instead
//! of pointers, for node-based containers that want to shrink their own
//! per-node overhead (e.g. a 32-bit handle instead of an 8-byte pointer on
//! a 64-bit target) or want their nodes to survive a `memcpy`/relocation of
//! the whole container.
//!
//! # Usage
//! Pick a handle width, pick a buffer source, build an arena and a
//! [`config::ArenaConfig`] bound to it, and use
//! [`alloc_adapter::HandleAllocator`] to hand your container single-slot
//! allocations addressed by [`handle::TypedHandle`] instead of `*mut T`:
//! ```no_run
//! use idxalloc::arena::st::SlabArena;
//! use idxalloc::buffer::HeapBuffer;
//! use idxalloc::alloc_adapter::HandleAllocator;
//! use core::cell::RefCell;
//!
//! let arena = RefCell::new(SlabArena::<u32, HeapBuffer>::new(1024, true, HeapBuffer::new()).unwrap());
//! let nodes = HandleAllocator::<[u8; 16], u32, _>::new(&arena);
//! let handle = nodes.allocate().unwrap();
//! nodes.deallocate(handle);
//! ```
//!
//! # Handles vs. pointers
//! A handle is an opaque `u16`/`u32` that the arena's
//! [`arena::Arena::get_element`] turns back into an address; nothing in
//! this crate ever hands a host container a raw pointer to keep around.
//! Where a host also needs to address a value living on the stack or
//! embedded inside a container's own body (e.g. a sentinel node), the
//! upper one or two bits of the handle are reserved as a tag — see
//! [`config`] for the full encoding.
//!
//! # Single- vs. multi-threaded
//! [`arena::st::SlabArena`] is the plain, fast, single-threaded arena.
//! [`arena::mt::SlabArenaMt`] is its lock-free, `Sync` sibling, built for
//! host containers shared across threads; the two differ in one
//! observable way documented on [`arena::mt::SlabArenaMt`] (no automatic
//! reset when the last live slot is freed).
//!
//! # Features
//! - `std` (off by default): enables `log`-based diagnostics in the `mmap`
//!   buffer source, `thiserror`-based [`error::ArenaError`] messages,
//!   [`stack_probe`], and [`config::ThreadLocalConfig`].
//! - `mmap` (implies `std`): enables [`buffer::MmapBuffer`], an
//!   anonymous-shared-memory buffer source.
//! - `portable_atomic`: forwarded to `spin`'s identically-named feature,
//!   for targets without native atomics.
#![no_std]
#![warn(missing_docs)]
#![allow(clippy::missing_safety_doc)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod alloc_adapter;
pub mod arena;
pub mod buffer;
pub mod config;
pub mod error;
pub mod handle;
#[cfg(feature = "std")]
pub mod stack_probe;

pub use alloc_adapter::{ContainerSink, HandleAllocator, HeapBucketAllocator};
pub use config::{ArenaConfig, Encoding, StaticConfig};
pub use error::ArenaError;
pub use handle::{Handle16, Handle32, HandleInt, TypedHandle};

#[cfg(feature = "std")]
pub use config::ThreadLocalConfig;
