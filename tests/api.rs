//! End-to-end usage across the public surface: arena + config +
//! handle-allocator, without reaching into any crate-internal module.

use core::cell::RefCell;

use idxalloc::alloc_adapter::HandleAllocator;
use idxalloc::arena::st::SlabArena;
use idxalloc::arena::Arena;
use idxalloc::buffer::{CallerBuffer, HeapBuffer};
use idxalloc::config::ArenaConfig;
use idxalloc::handle::{Handle32, TypedHandle};
use idxalloc::ArenaError;

#[test]
fn slot_addresses_round_trip_through_config() {
    let mut arena = SlabArena::<Handle32, HeapBuffer>::new(10, true, HeapBuffer::new()).unwrap();
    let h = arena.allocate(8).unwrap();
    let addr = arena.get_element(h) as usize;

    // `arena` is done being mutated; `cfg` only ever needs a shared
    // reference to it from here on.
    let mut cfg = ArenaConfig::<Handle32, SlabArena<Handle32, HeapBuffer>>::simple();
    cfg.set_arena(&arena).unwrap();

    assert_eq!(cfg.to_handle(addr), h);
    assert_eq!(cfg.to_address(h), addr);
}

#[test]
fn handle_allocator_round_trips_typed_handles() {
    let arena = RefCell::new(SlabArena::<Handle32, HeapBuffer>::new(4, true, HeapBuffer::new()).unwrap());
    let nodes: HandleAllocator<u64, Handle32, _> = HandleAllocator::new(&arena);

    let a = nodes.allocate().unwrap();
    let b = nodes.allocate().unwrap();
    assert_ne!(a, b);

    nodes.deallocate(a);
    let c = nodes.allocate().unwrap();
    assert_eq!(a, c, "freed slot should be recycled onto the same handle");
}

#[test]
fn caller_buffer_rejects_undersized_storage() {
    let mut storage = [core::mem::MaybeUninit::<u8>::uninit(); 16];
    let arena =
        SlabArena::<Handle32, CallerBuffer<'_>>::new(100, true, CallerBuffer::new(&mut storage))
            .unwrap();
    let mut arena = arena;
    assert_eq!(arena.allocate(8), Err(ArenaError::OutOfMemory));
}

#[test]
fn typed_handle_null_is_distinguishable_from_any_live_handle() {
    let arena = RefCell::new(SlabArena::<Handle32, HeapBuffer>::new(4, true, HeapBuffer::new()).unwrap());
    let nodes: HandleAllocator<u64, Handle32, _> = HandleAllocator::new(&arena);

    let h = nodes.allocate().unwrap();
    assert_ne!(h, TypedHandle::NULL);
    assert!(TypedHandle::<u64, Handle32>::NULL.is_null());
}
