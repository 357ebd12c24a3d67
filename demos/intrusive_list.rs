//! A minimal intrusive singly-linked list built directly on the slab
//! arena, showing the pattern a real node-based container follows: nodes
//! are slots in one arena, the link field is a handle instead of a
//! pointer, and the list itself only ever stores a head handle.
//!
//! Run with `cargo run --example intrusive_list`.

use core::cell::RefCell;

use idxalloc::alloc_adapter::HandleAllocator;
use idxalloc::arena::st::SlabArena;
use idxalloc::arena::Arena;
use idxalloc::buffer::HeapBuffer;
use idxalloc::handle::{Handle32, TypedHandle};

struct Node<T> {
    value: T,
    next: TypedHandle<Node<T>, Handle32>,
}

struct List<'a, T> {
    nodes: HandleAllocator<'a, Node<T>, Handle32, RefCell<SlabArena<Handle32, HeapBuffer>>>,
    arena: &'a RefCell<SlabArena<Handle32, HeapBuffer>>,
    head: TypedHandle<Node<T>, Handle32>,
}

impl<'a, T> List<'a, T> {
    fn new(arena: &'a RefCell<SlabArena<Handle32, HeapBuffer>>) -> Self {
        Self {
            nodes: HandleAllocator::new(arena),
            arena,
            head: TypedHandle::NULL,
        }
    }

    fn push_front(&mut self, value: T) {
        let h = self.nodes.allocate().expect("arena capacity exhausted");
        // SAFETY: `h` was just allocated for a `Node<T>`-sized slot, and no
        // other handle aliases it yet.
        unsafe {
            let slot = self.arena.borrow().get_element(h.as_raw()) as *mut Node<T>;
            slot.write(Node {
                value,
                next: self.head,
            });
        }
        self.head = h;
    }

    fn pop_front(&mut self) -> Option<T> {
        if self.head.is_null() {
            return None;
        }
        let h = self.head;
        // SAFETY: `h` addresses a live `Node<T>` this list wrote in
        // `push_front` and hasn't freed yet.
        let node = unsafe {
            let slot = self.arena.borrow().get_element(h.as_raw()) as *mut Node<T>;
            slot.read()
        };
        self.head = node.next;
        self.nodes.deallocate(h);
        Some(node.value)
    }
}

fn main() {
    let arena = RefCell::new(SlabArena::<Handle32, HeapBuffer>::new(16, true, HeapBuffer::new()).unwrap());
    let mut list = List::new(&arena);

    list.push_front(3);
    list.push_front(2);
    list.push_front(1);

    assert_eq!(list.pop_front(), Some(1));
    assert_eq!(list.pop_front(), Some(2));
    assert_eq!(list.pop_front(), Some(3));
    assert_eq!(list.pop_front(), None);

    println!("intrusive_list demo: all nodes round-tripped through their arena slots");
}
