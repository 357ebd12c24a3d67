#![feature(test)]
extern crate test;
use test::Bencher;

use idxalloc::arena::st::SlabArena;
use idxalloc::buffer::HeapBuffer;
use idxalloc::handle::Handle32;

mod repeated_allocation_deallocation {
    use super::*;

    /// Run a benchmark that repeatedly allocates and deallocates the same
    /// slot, after pre-allocating `preallocated` other slots so the free
    /// list and high-water mark aren't trivially empty. Adapted from
    /// emballoc's byte-allocation benchmark to slot allocation.
    fn benchmark_with_preallocation(b: &mut Bencher, preallocated: usize) {
        let mut arena = SlabArena::<Handle32, HeapBuffer>::new(2048, true, HeapBuffer::new())
            .expect("capacity fits in a 32-bit handle");
        for _ in 0..preallocated {
            arena.allocate(8).unwrap();
        }

        let h = arena.allocate(8).unwrap();
        arena.deallocate(h, 8);

        b.iter(|| {
            let h = arena.allocate(8).unwrap();
            let h = test::black_box(h);
            arena.deallocate(h, 8);
        });
    }

    #[bench]
    fn no_preallocation(b: &mut Bencher) {
        benchmark_with_preallocation(b, 0);
    }

    #[bench]
    fn low_preallocation(b: &mut Bencher) {
        benchmark_with_preallocation(b, 8);
    }

    #[bench]
    fn medium_preallocation(b: &mut Bencher) {
        benchmark_with_preallocation(b, 1020);
    }

    #[bench]
    fn high_preallocation(b: &mut Bencher) {
        benchmark_with_preallocation(b, 2040);
    }
}
