//! Presents a slab arena (plus its bound [`crate::config::ArenaConfig`]) as
//! a one-slot-at-a-time allocator for node-based host containers (spec
//! component E).
//!
//! # Rebind-by-type (bucket fallback)
//! Spec asks that allocator requests for a hash-table's internal bucket
//! array rebind to a plain heap allocator instead of the handle allocator,
//! since bucket arrays are resized wholesale and don't fit the
//! single-slot-per-request model. This crate gives `HandleAllocator` and
//! [`HeapBucketAllocator`] two separate, unrelated types instead of one
//! type that dispatches between them: a host container that needs a
//! bucket array simply asks for [`HeapBucketAllocator`] through its own,
//! distinct allocation path rather than through `HandleAllocator` at all
//! (the redesign spec §9 itself suggests — "host container exposes a
//! separate bucket-allocator slot"). There is no marker trait or other
//! type-level dispatch mechanism connecting the two; a container that
//! needs both simply holds one of each.
//!
//! # Container-base publication
//! When constructed via [`HandleAllocator::new_assigning_container`], the
//! allocator publishes its own address into a bound [`ContainerSink`]
//! (typically a [`crate::config::StaticConfig`] or
//! [`crate::config::ThreadLocalConfig`]) as the config's `containerBase`,
//! and does so again on every [`Clone`] — spec §4.E's
//! `assignContainerFollowingAllocator` policy. This is meant for
//! node-based ordered containers that embed their sentinel node inside
//! their own body, of which the allocator is typically itself a field, so
//! the allocator's address is a usable stand-in for the container's base.
//! Intrusive containers that hold their list head directly must instead
//! register their own base with [`Self::new`] and a plain `set_container`
//! call before constructing the allocator (spec's own documented split).

use crate::error::ArenaError;
use crate::handle::{HandleInt, TypedHandle};

use core::alloc::Layout;
use core::cell::RefCell;
use core::marker::PhantomData;
use core::mem;
use core::ptr::NonNull;

/// Something a [`HandleAllocator`] can publish its own address to, as the
/// `containerBase` a bound [`crate::config::ArenaConfig`] later decodes
/// container-body handles against (spec §4.E, §4.D).
///
/// Implemented for the two config storage variants that expose
/// `set_container` through a shared reference — [`crate::config::StaticConfig`]
/// and [`crate::config::ThreadLocalConfig`] — since publication must be
/// possible from `HandleAllocator::allocate`'s own `&self` call sites.
pub trait ContainerSink {
    /// Record `base` as the container's body address.
    fn set_container_base(&self, base: usize);
}

impl<H, A> ContainerSink for crate::config::StaticConfig<H, A>
where
    H: HandleInt,
    A: crate::arena::Arena<H> + Sync + 'static,
{
    fn set_container_base(&self, base: usize) {
        self.set_container(base);
    }
}

#[cfg(feature = "std")]
impl<H, A> ContainerSink for crate::config::ThreadLocalConfig<H, A>
where
    H: HandleInt + 'static,
    A: crate::arena::Arena<H> + 'static,
{
    fn set_container_base(&self, base: usize) {
        self.set_container(base);
    }
}

/// A source of single-slot allocations keyed by size, implemented by both
/// arena variants (the MT arena directly, the ST arena through interior
/// mutability — see the blanket impl on `RefCell<SlabArena<..>>`).
pub trait SlotSource<H: HandleInt> {
    fn alloc_slot(&self, size: usize) -> Result<H, ArenaError>;
    fn dealloc_slot(&self, h: H, size: usize);
    /// Identity used for allocator equality: two allocators over the same
    /// arena instance compare equal.
    fn identity(&self) -> *const ();
}

impl<H: HandleInt, B: crate::buffer::BufferSource> SlotSource<H>
    for RefCell<crate::arena::st::SlabArena<H, B>>
{
    fn alloc_slot(&self, size: usize) -> Result<H, ArenaError> {
        self.borrow_mut().allocate(size)
    }

    fn dealloc_slot(&self, h: H, size: usize) {
        self.borrow_mut().deallocate(h, size);
    }

    fn identity(&self) -> *const () {
        self.as_ptr().cast()
    }
}

impl<H: HandleInt, B: crate::buffer::BufferSource + Send> SlotSource<H>
    for crate::arena::mt::SlabArenaMt<H, B>
{
    fn alloc_slot(&self, size: usize) -> Result<H, ArenaError> {
        self.allocate(size)
    }

    fn dealloc_slot(&self, h: H, size: usize) {
        self.deallocate(h, size);
    }

    fn identity(&self) -> *const () {
        (self as *const Self).cast()
    }
}

/// A node allocator whose pointer type is [`TypedHandle<T, H>`] instead of
/// a machine pointer.
///
/// `allocate`/`deallocate` only ever handle exactly one element; any other
/// count is a host-container bug (spec §4.E: "any n != 1 is a usage
/// error"), so this type doesn't even take a count parameter.
pub struct HandleAllocator<'a, T, H: HandleInt, S: SlotSource<H>> {
    source: &'a S,
    /// Config to publish this allocator's own address into as
    /// `containerBase`, when the `assignContainerFollowingAllocator`
    /// policy is in effect. `None` for allocators constructed via
    /// [`Self::new`] (intrusive containers, which publish their base
    /// themselves).
    container_sink: Option<&'a dyn ContainerSink>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T, H: HandleInt, S: SlotSource<H>> HandleAllocator<'a, T, H, S> {
    /// Construct an allocator that never touches any config's
    /// `containerBase` on its own. Use this for intrusive containers,
    /// which register their own base before constructing their allocator.
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            container_sink: None,
            _marker: PhantomData,
        }
    }

    /// Construct an allocator under the `assignContainerFollowingAllocator`
    /// policy: its own address is published into `sink` as `containerBase`
    /// immediately, and again every time it is [`Clone`]d.
    ///
    /// This is the right constructor for node-based ordered containers
    /// that store this allocator as a field of their own body alongside
    /// their embedded sentinel node: the allocator's address is then a
    /// valid stand-in for the container's base, for as long as the
    /// container itself doesn't move after this call. If the container
    /// does move afterward, it must call [`Self::publish_container_base`]
    /// again once settled — this crate cannot hook a move the way a C++
    /// move constructor could, since a Rust move is a plain `memcpy` with
    /// no code to run.
    pub fn new_assigning_container(source: &'a S, sink: &'a dyn ContainerSink) -> Self {
        let this = Self {
            source,
            container_sink: Some(sink),
            _marker: PhantomData,
        };
        this.publish_container_base();
        this
    }

    /// Re-publish this allocator's current address as the bound config's
    /// `containerBase`, if the `assignContainerFollowingAllocator` policy
    /// is in effect. A no-op for allocators constructed via [`Self::new`].
    pub fn publish_container_base(&self) {
        if let Some(sink) = self.container_sink {
            sink.set_container_base(self as *const Self as usize);
        }
    }

    pub fn allocate(&self) -> Result<TypedHandle<T, H>, ArenaError> {
        self.source
            .alloc_slot(mem::size_of::<T>())
            .map(TypedHandle::from_raw)
    }

    pub fn deallocate(&self, handle: TypedHandle<T, H>) {
        self.source.dealloc_slot(handle.as_raw(), mem::size_of::<T>());
    }

    /// Rebind to a node allocator over a different element type, same
    /// arena. This is the ordinary rebind a container performs when it
    /// needs to allocate a differently-typed node from the same backing
    /// store (e.g. a map's internal node wrapper around the user's
    /// key/value pair); it is *not* the bucket-array path, which uses
    /// [`HeapBucketAllocator`] instead. The container-base publication
    /// policy carries over unchanged; rebinding doesn't itself republish,
    /// since the rebound value isn't necessarily at its final address yet.
    pub fn rebind<U>(&self) -> HandleAllocator<'a, U, H, S> {
        HandleAllocator {
            source: self.source,
            container_sink: self.container_sink,
            _marker: PhantomData,
        }
    }
}

impl<T, H: HandleInt, S: SlotSource<H>> Clone for HandleAllocator<'_, T, H, S> {
    fn clone(&self) -> Self {
        let cloned = Self {
            source: self.source,
            container_sink: self.container_sink,
            _marker: PhantomData,
        };
        cloned.publish_container_base();
        cloned
    }
}

impl<T, H: HandleInt, S: SlotSource<H>> PartialEq for HandleAllocator<'_, T, H, S> {
    fn eq(&self, other: &Self) -> bool {
        self.source.identity() == other.source.identity()
    }
}
impl<T, H: HandleInt, S: SlotSource<H>> Eq for HandleAllocator<'_, T, H, S> {}

/// Heap-backed allocator for a host container's bucket array: the fallback
/// spec §4.E requires, since bucket arrays are resized wholesale and aren't
/// single-slot allocations the arena can serve.
pub struct HeapBucketAllocator;

impl HeapBucketAllocator {
    /// # Safety
    /// `layout` must have non-zero size.
    pub unsafe fn alloc(&self, layout: Layout) -> Result<NonNull<u8>, ArenaError> {
        let ptr = alloc::alloc::alloc(layout);
        NonNull::new(ptr).ok_or(ArenaError::OutOfMemory)
    }

    /// # Safety
    /// `ptr`/`layout` must describe a live allocation previously returned
    /// by [`Self::alloc`] with the same layout.
    pub unsafe fn dealloc(&self, ptr: NonNull<u8>, layout: Layout) {
        alloc::alloc::dealloc(ptr.as_ptr(), layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::st::SlabArena;
    use crate::buffer::HeapBuffer;
    use crate::config::StaticConfig;

    #[test]
    fn assigning_container_publishes_on_construction_and_explicit_call() {
        static CFG: StaticConfig<u32, SlabArena<u32, HeapBuffer>> = StaticConfig::universal(0);

        let arena = RefCell::new(SlabArena::<u32, HeapBuffer>::new(4, true, HeapBuffer::new()).unwrap());
        let nodes = HandleAllocator::<u64, u32, _>::new_assigning_container(&arena, &CFG);

        // construction already published some address for the allocator.
        assert!(CFG.get_container().is_some());

        // once `nodes` is settled at its final location, an explicit
        // republish reflects that address exactly.
        nodes.publish_container_base();
        assert_eq!(CFG.get_container(), Some(&nodes as *const _ as usize));
    }

    #[test]
    fn assigning_container_republishes_on_clone() {
        static CFG: StaticConfig<u32, SlabArena<u32, HeapBuffer>> = StaticConfig::universal(0);

        let arena = RefCell::new(SlabArena::<u32, HeapBuffer>::new(4, true, HeapBuffer::new()).unwrap());
        let nodes = HandleAllocator::<u64, u32, _>::new_assigning_container(&arena, &CFG);
        let cloned = nodes.clone();
        cloned.publish_container_base();

        assert_eq!(CFG.get_container(), Some(&cloned as *const _ as usize));
    }

    #[test]
    fn new_without_policy_never_touches_any_config() {
        static CFG: StaticConfig<u32, SlabArena<u32, HeapBuffer>> = StaticConfig::universal(0);

        let arena = RefCell::new(SlabArena::<u32, HeapBuffer>::new(4, true, HeapBuffer::new()).unwrap());
        let nodes = HandleAllocator::<u64, u32, _>::new(&arena);
        nodes.publish_container_base();

        assert!(CFG.get_container().is_none());
    }

    #[test]
    fn allocate_and_deallocate_round_trip() {
        let arena = RefCell::new(SlabArena::<u32, HeapBuffer>::new(4, true, HeapBuffer::new()).unwrap());
        let alloc = HandleAllocator::<u64, u32, _>::new(&arena);

        let h = alloc.allocate().unwrap();
        assert!(!h.is_null());
        alloc.deallocate(h);
    }

    #[test]
    fn equality_is_by_arena_identity() {
        let arena_a = RefCell::new(SlabArena::<u32, HeapBuffer>::new(4, true, HeapBuffer::new()).unwrap());
        let arena_b = RefCell::new(SlabArena::<u32, HeapBuffer>::new(4, true, HeapBuffer::new()).unwrap());

        let a1 = HandleAllocator::<u64, u32, _>::new(&arena_a);
        let a2 = a1.clone();
        let b = HandleAllocator::<u64, u32, _>::new(&arena_b);

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
    }

    #[test]
    fn rebind_shares_the_same_arena() {
        let arena = RefCell::new(SlabArena::<u32, HeapBuffer>::new(4, true, HeapBuffer::new()).unwrap());
        let nodes = HandleAllocator::<u8, u32, _>::new(&arena);
        let rebound = nodes.rebind::<u64>();
        assert_eq!(rebound.source.identity(), nodes.source.identity());
    }

    #[test]
    fn bucket_allocator_is_independent_of_the_arena() {
        let bucket_alloc = HeapBucketAllocator;
        let layout = Layout::array::<u32>(500).unwrap();
        unsafe {
            let ptr = bucket_alloc.alloc(layout).unwrap();
            bucket_alloc.dealloc(ptr, layout);
        }
    }
}
