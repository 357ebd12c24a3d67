//! Two threads hammering one MT arena: the end-to-end scenario the
//! allocator's whole lock-free design exists to satisfy.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

use idxalloc::arena::mt::SlabArenaMt;
use idxalloc::arena::Arena;
use idxalloc::buffer::HeapBuffer;
use idxalloc::handle::Handle32;

#[test]
fn two_threads_100k_cycles_each_no_lost_or_duplicated_handles() {
    const CAPACITY: usize = 1_000_000;
    const CYCLES: usize = 100_000;

    let arena: Arc<SlabArenaMt<Handle32, HeapBuffer>> =
        Arc::new(SlabArenaMt::new(CAPACITY, true, HeapBuffer::new()).unwrap());

    // warm the buffer up-front so both worker threads see the arena READY.
    let warm = arena.allocate(4).unwrap();
    arena.deallocate(warm, 4);

    let seen_duplicates = Arc::new(Mutex::new(Vec::new()));

    let workers: Vec<_> = (0..2)
        .map(|_| {
            let arena = Arc::clone(&arena);
            let seen_duplicates = Arc::clone(&seen_duplicates);
            thread::spawn(move || {
                let mut outstanding = HashSet::new();
                for _ in 0..CYCLES {
                    let h = arena.allocate(4).unwrap();
                    if !outstanding.insert(h) {
                        seen_duplicates.lock().unwrap().push(h);
                    }
                    outstanding.remove(&h);
                    arena.deallocate(h, 4);
                }
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }

    assert!(
        seen_duplicates.lock().unwrap().is_empty(),
        "a handle was observed live in the same thread more than once concurrently"
    );
    assert_eq!(arena.allocated_count(), 0);
    assert!(arena.used_capacity() <= CAPACITY);
}
