//! Handle ↔ address translation and the per-context arena/stack/container
//! state that makes it possible (spec component D).
//!
//! A handle's top one or two bits select which of three regions it
//! addresses — an arena slot, a spot on the owning thread's stack, or a
//! byte offset into a registered container object's body — and the rest of
//! this crate only ever talks to an arena through this translation, never
//! by storing raw addresses.

use crate::arena::Arena;
use crate::handle::HandleInt;

use core::marker::PhantomData;

/// Which tag-bit scheme a config uses.
///
/// This, not whether a container base happens to be registered, is what
/// determines the capacity bound a bound arena must respect: universal
/// encoding always reserves two tag bits (even if container tagging is
/// never exercised at a given moment), so its arena must fit under
/// `2^(W-2)`; simple encoding only reserves one, so `2^(W-1)` suffices
/// (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// One tag bit: `0` = arena, `1` = stack. No container-body handles.
    Simple,
    /// Two tag bits: `00` = arena, `10` = stack, `01` = container body.
    Universal,
}

/// Heuristic cap used for container-body offsets when the embedded
/// object's size isn't known to the config (spec §4.D step 3, "unknown
/// object size"). Spec flags this heuristic as unverified and asks that it
/// be made explicit rather than left as a silent magic number — see
/// `DESIGN.md` Open Question (a).
pub const UNKNOWN_OBJECT_SIZE_CAP: usize = 256;

/// Maximum distance below the recorded stack top that still encodes as a
/// stack handle.
pub const MAX_STACK_SPAN: usize = 2 * 1024 * 1024;

/// Per-context handle/address translator bound to one arena.
///
/// Holds the three pieces of state spec §4.D calls for: the bound arena,
/// the owning thread's stack top, and (universal encoding only) the
/// address of a container object whose body may embed sentinel nodes.
/// Mutating any of these while live handles computed under the old value
/// still exist is **not checked** — it is documented here as the caller's
/// responsibility, exactly as spec requires, since verifying it would mean
/// tracking every live handle, defeating the point of using handles at
/// all.
pub struct ArenaConfig<'a, H: HandleInt, A: Arena<H>> {
    encoding: Encoding,
    node_alignment: usize,
    /// `0` means "universal encoding without embedded-node support": the
    /// container-body branch still runs (so sentinel nodes registered via
    /// [`Self::set_container`] are still decodable) but falls back to the
    /// [`UNKNOWN_OBJECT_SIZE_CAP`] heuristic instead of an exact bound.
    object_size: usize,
    arena: Option<&'a A>,
    stack_top: Option<usize>,
    container_base: Option<usize>,
    _handle: PhantomData<H>,
}

impl<'a, H: HandleInt, A: Arena<H>> ArenaConfig<'a, H, A> {
    /// A config using the single-tag-bit simple encoding (no container-body
    /// handles).
    pub const fn simple() -> Self {
        Self::new(Encoding::Simple, core::mem::size_of::<H>(), 0)
    }

    /// A config using the two-tag-bit universal encoding.
    ///
    /// `object_size` is the byte size of the embedded-node region inside a
    /// registered container's body; pass `0` if that size isn't known
    /// ahead of time (container-body handles then use
    /// [`UNKNOWN_OBJECT_SIZE_CAP`] as a heuristic bound instead).
    pub const fn universal(object_size: usize) -> Self {
        Self::new(Encoding::Universal, core::mem::size_of::<H>(), object_size)
    }

    const fn new(encoding: Encoding, node_alignment: usize, object_size: usize) -> Self {
        Self {
            encoding,
            node_alignment,
            object_size,
            arena: None,
            stack_top: None,
            container_base: None,
            _handle: PhantomData,
        }
    }

    /// Override the node alignment quantum used for stack-offset encoding.
    /// Defaults to `size_of::<H>()`; must match the host container's actual
    /// node alignment.
    pub fn with_node_alignment(mut self, alignment: usize) -> Self {
        self.node_alignment = alignment;
        self
    }

    /// Bind the arena this config translates against.
    ///
    /// # Errors
    /// [`crate::error::ArenaError::CapacityTooLarge`] if the arena's
    /// capacity does not fit under the bound this config's encoding
    /// requires (spec §3: `< 2^(W-1)` simple, `< 2^(W-2)` universal). Note
    /// [`crate::arena::st::SlabArena::new`] only enforces the looser,
    /// encoding-agnostic `2^(W-1)` bound, since the arena itself doesn't
    /// know which encoding will end up bound to it — this is the stricter
    /// check the spec places at "config time".
    pub fn set_arena(&mut self, arena: &'a A) -> Result<(), crate::error::ArenaError> {
        let bound = match self.encoding {
            Encoding::Simple => H::ONSTACK.to_usize(),
            Encoding::Universal => H::CONTAINER.to_usize(),
        };
        if arena.capacity() >= bound {
            return Err(crate::error::ArenaError::CapacityTooLarge);
        }
        self.arena = Some(arena);
        Ok(())
    }

    pub fn get_arena(&self) -> Option<&'a A> {
        self.arena
    }

    /// Record the highest address of the calling thread's stack. Must be
    /// called (via [`crate::stack_probe`] or equivalent) before that
    /// thread's first handle operation.
    pub fn set_stack_top(&mut self, top: usize) {
        self.stack_top = Some(top);
    }

    pub fn get_stack_top(&self) -> Option<usize> {
        self.stack_top
    }

    /// Register the address of the container object whose body may embed
    /// sentinel nodes. Universal encoding only; ignored by `to_handle`
    /// under simple encoding.
    pub fn set_container(&mut self, base: usize) {
        self.container_base = Some(base);
    }

    pub fn get_container(&self) -> Option<usize> {
        self.container_base
    }

    fn embedded_node_support_known(&self) -> bool {
        matches!(self.encoding, Encoding::Universal) && self.object_size > 0
    }

    /// Translate a live address into a handle.
    ///
    /// Tests, in order (spec §4.D): arena range (skipped first when
    /// embedded-node support is active with a known object size — see
    /// below), stack range, container body, then an unconditional arena
    /// fallback for universal encoding. Reaching the end without a match
    /// under simple encoding means `addr` belongs to none of the
    /// registered regions, a caller bug flagged only under
    /// `debug_assertions`.
    ///
    /// # Debug assertions
    /// Stack-offset alignment and payload-fits-in-bits-available checks
    /// run only under `debug_assertions`; violating either is undefined
    /// behaviour in release builds, per spec §7.
    pub fn to_handle(&self, addr: usize) -> H {
        // Step 1: when container-body tagging isn't in active use (simple
        // encoding, or universal without a known object size), the arena
        // range is checked first, since that's the overwhelmingly common
        // case. When embedded-node support *is* active with a known
        // object size, spec defers this check to step 4 so that an
        // address inside the registered container's body is never
        // mistaken for an arena slot that happens to alias it.
        if !self.embedded_node_support_known() {
            if let Some(arena) = self.arena {
                if let (Some(begin), Some(end)) = (arena.begin(), arena.end()) {
                    if addr >= begin && addr < end {
                        return arena.pointer_to(addr);
                    }
                }
            }
        }

        // Step 2: stack range.
        if let Some(stack_top) = self.stack_top {
            if addr <= stack_top {
                let d = stack_top - addr;
                if d < MAX_STACK_SPAN {
                    debug_assert!(
                        d % self.node_alignment == 0,
                        "stack address is not node-aligned"
                    );
                    let quantum = d / self.node_alignment;
                    debug_assert!(
                        quantum < H::ONSTACK.to_usize(),
                        "stack offset does not fit in the handle's payload bits"
                    );
                    return H::ONSTACK.bitor(H::from_usize(quantum));
                }
            }
        }

        // Step 3: container body (universal encoding only).
        if matches!(self.encoding, Encoding::Universal) {
            if let Some(container_base) = self.container_base {
                if addr >= container_base {
                    let c = addr - container_base;
                    let cap = if self.object_size > 0 {
                        self.object_size
                    } else {
                        UNKNOWN_OBJECT_SIZE_CAP
                    };
                    if c < cap {
                        return H::CONTAINER.bitor(H::from_usize(c));
                    }
                }
            }
        }

        // Step 4: fall through to the arena (universal only per spec;
        // reaching this point under simple encoding means `addr` is not in
        // any registered region, a usage bug).
        let arena = self.arena.expect("to_handle: no arena bound");
        debug_assert!(
            matches!(self.encoding, Encoding::Universal),
            "address outside all registered regions under simple encoding"
        );
        arena.pointer_to(addr)
    }

    /// Translate a handle back into a live address.
    ///
    /// Branches on the top two bits: the stack tag takes priority over the
    /// container tag (matching [`crate::handle::HandleInt::ONSTACK`] being
    /// the topmost bit), and neither set means an arena slot.
    pub fn to_address(&self, h: H) -> usize {
        if !h.bitand(H::ONSTACK).is_zero() {
            let stack_top = self.stack_top.expect("to_address: no stack top recorded");
            let quantum = h.bitand(H::PAYLOAD_MASK).to_usize();
            stack_top - self.node_alignment * quantum
        } else if !h.bitand(H::CONTAINER).is_zero() {
            let base = self.container_base.expect("to_address: no container registered");
            base + h.bitand(H::PAYLOAD_MASK).to_usize()
        } else {
            let arena = self.arena.expect("to_address: no arena bound");
            arena.get_element(h) as usize
        }
    }
}

/// Process-wide storage for an [`ArenaConfig`], for host programs that bind
/// one arena for their whole lifetime and share it across all threads
/// (spec §4.D "static" variant).
///
/// Requires `A: Sync` because a `static StaticConfig<..>` must itself be
/// `Sync`, which in turn requires the `&'static A` it may hold to be `Send`.
pub struct StaticConfig<H: HandleInt, A: Arena<H> + Sync + 'static> {
    inner: spin::Mutex<ArenaConfig<'static, H, A>>,
}

impl<H: HandleInt, A: Arena<H> + Sync + 'static> StaticConfig<H, A> {
    pub const fn simple() -> Self {
        Self {
            inner: spin::Mutex::new(ArenaConfig::simple()),
        }
    }

    pub const fn universal(object_size: usize) -> Self {
        Self {
            inner: spin::Mutex::new(ArenaConfig::universal(object_size)),
        }
    }

    pub fn set_arena(&self, arena: &'static A) -> Result<(), crate::error::ArenaError> {
        self.inner.lock().set_arena(arena)
    }

    pub fn set_stack_top(&self, top: usize) {
        self.inner.lock().set_stack_top(top);
    }

    pub fn set_container(&self, base: usize) {
        self.inner.lock().set_container(base);
    }

    pub fn get_container(&self) -> Option<usize> {
        self.inner.lock().get_container()
    }

    pub fn to_handle(&self, addr: usize) -> H {
        self.inner.lock().to_handle(addr)
    }

    pub fn to_address(&self, h: H) -> usize {
        self.inner.lock().to_address(h)
    }
}

/// Per-thread storage for an [`ArenaConfig`] (spec §4.D "per-thread"
/// variant), for host programs where each thread records its own stack top
/// against a config it otherwise shares the arena binding with.
///
/// The backing [`std::thread::LocalKey`] is declared by the host with the
/// ordinary `std::thread_local!` macro — this type just wraps a `'static`
/// reference to it with the same setter surface as [`StaticConfig`], since
/// `thread_local!` cannot itself be invoked generically over `H`/`A` chosen
/// by a library.
#[cfg(feature = "std")]
pub struct ThreadLocalConfig<H: HandleInt + 'static, A: Arena<H> + 'static> {
    key: &'static std::thread::LocalKey<core::cell::RefCell<ArenaConfig<'static, H, A>>>,
}

#[cfg(feature = "std")]
impl<H: HandleInt + 'static, A: Arena<H> + 'static> ThreadLocalConfig<H, A> {
    pub const fn new(
        key: &'static std::thread::LocalKey<core::cell::RefCell<ArenaConfig<'static, H, A>>>,
    ) -> Self {
        Self { key }
    }

    pub fn set_arena(&self, arena: &'static A) -> Result<(), crate::error::ArenaError> {
        self.key.with(|c| c.borrow_mut().set_arena(arena))
    }

    pub fn set_stack_top(&self, top: usize) {
        self.key.with(|c| c.borrow_mut().set_stack_top(top));
    }

    pub fn set_container(&self, base: usize) {
        self.key.with(|c| c.borrow_mut().set_container(base));
    }

    pub fn get_container(&self) -> Option<usize> {
        self.key.with(|c| c.borrow().get_container())
    }

    pub fn to_handle(&self, addr: usize) -> H {
        self.key.with(|c| c.borrow().to_handle(addr))
    }

    pub fn to_address(&self, h: H) -> usize {
        self.key.with(|c| c.borrow().to_address(h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::st::SlabArena;
    use crate::buffer::HeapBuffer;

    #[test]
    fn arena_handles_round_trip() {
        let mut arena = SlabArena::<u32, HeapBuffer>::new(10, true, HeapBuffer::new()).unwrap();
        let h = arena.allocate(4).unwrap();
        let addr = arena.get_element(h) as usize;

        let mut cfg = ArenaConfig::<u32, SlabArena<u32, HeapBuffer>>::simple();
        cfg.set_arena(&arena).unwrap();

        assert_eq!(cfg.to_handle(addr), h);
        assert_eq!(cfg.to_address(h), addr);
    }

    #[test]
    fn stack_encoding_matches_spec_example() {
        // 16-bit universal config, node alignment 2, from spec's literal
        // worked example (§8 scenario 4): a local 8 bytes below the
        // recorded stack top encodes to `(8/2) | 0x8000`.
        let arena = SlabArena::<u16, HeapBuffer>::new(4, true, HeapBuffer::new()).unwrap();
        let mut cfg = ArenaConfig::<u16, SlabArena<u16, HeapBuffer>>::universal(0)
            .with_node_alignment(2);
        cfg.set_arena(&arena).unwrap();
        cfg.set_stack_top(0x7fff_ff00);

        let addr = 0x7fff_fefe_usize;
        let h = cfg.to_handle(addr);
        assert_eq!(h, 0x8004);
        assert_eq!(cfg.to_address(h), addr);
    }

    #[test]
    fn container_body_handle_with_known_object_size() {
        let arena = SlabArena::<u32, HeapBuffer>::new(4, true, HeapBuffer::new()).unwrap();
        let mut cfg = ArenaConfig::<u32, SlabArena<u32, HeapBuffer>>::universal(64);
        cfg.set_arena(&arena).unwrap();
        cfg.set_container(0x1000);

        let h = cfg.to_handle(0x1010);
        assert_eq!(h, u32::CONTAINER | 0x10);
        assert_eq!(cfg.to_address(h), 0x1010);
    }

    #[test]
    fn container_body_handle_unknown_size_uses_heuristic_cap() {
        let arena = SlabArena::<u32, HeapBuffer>::new(4, true, HeapBuffer::new()).unwrap();
        let mut cfg = ArenaConfig::<u32, SlabArena<u32, HeapBuffer>>::universal(0);
        cfg.set_arena(&arena).unwrap();
        cfg.set_container(0x2000);

        let h = cfg.to_handle(0x2000 + UNKNOWN_OBJECT_SIZE_CAP - 1);
        assert_eq!(h, u32::CONTAINER | (UNKNOWN_OBJECT_SIZE_CAP as u32 - 1));
    }

    #[test]
    fn universal_encoding_requires_tighter_capacity_bound() {
        let arena =
            SlabArena::<u32, HeapBuffer>::new(u32::CONTAINER as usize, true, HeapBuffer::new())
                .unwrap();
        let mut cfg = ArenaConfig::<u32, SlabArena<u32, HeapBuffer>>::universal(8);
        assert_eq!(
            cfg.set_arena(&arena).unwrap_err(),
            crate::error::ArenaError::CapacityTooLarge
        );
    }

    #[test]
    fn static_config_shares_one_binding_across_accesses() {
        static CFG: StaticConfig<u32, SlabArena<u32, HeapBuffer>> = StaticConfig::simple();

        let mut arena = SlabArena::<u32, HeapBuffer>::new(4, true, HeapBuffer::new()).unwrap();
        let h = arena.allocate(4).unwrap();
        let addr = arena.get_element(h) as usize;
        let arena: &'static SlabArena<u32, HeapBuffer> =
            alloc::boxed::Box::leak(alloc::boxed::Box::new(arena));

        CFG.set_arena(arena).unwrap();

        assert_eq!(CFG.to_handle(addr), h);
        assert_eq!(CFG.to_address(h), addr);
    }

    #[cfg(feature = "std")]
    #[test]
    fn thread_local_config_keeps_a_separate_stack_top_per_thread() {
        std::thread_local! {
            static CFG: core::cell::RefCell<ArenaConfig<'static, u32, SlabArena<u32, HeapBuffer>>> =
                core::cell::RefCell::new(ArenaConfig::simple());
        }
        let cfg = ThreadLocalConfig::new(&CFG);
        cfg.set_stack_top(0x1000);
        assert_eq!(cfg.to_address(u32::ONSTACK), 0x1000);

        std::thread::spawn(|| {
            let cfg = ThreadLocalConfig::new(&CFG);
            cfg.set_stack_top(0x2000);
            assert_eq!(cfg.to_address(u32::ONSTACK), 0x2000);
        })
        .join()
        .unwrap();

        assert_eq!(cfg.to_address(u32::ONSTACK), 0x1000);
    }
}
