//! One memory tier: a slot table of arenas, each carrying an address-ordered
//! free list of [`BlockHeader`]s.
//!
//! Allocation is first fit across arenas in slot order; a block is split when
//! what is left over can hold another header and at least one paragraph.
//! Freed blocks are put back in address order and merged with the free blocks
//! directly after and before them, so no two neighbors are ever both free.

use crate::{
    AllocError, Allocation, Tier,
    backing::{Arena, Backing},
    header::{
        AllocFlags, BLOCK_ALIGN, BlockHeader, BlockKind, HEADER_SIZE, NO_LINK, Sentinel, header_of,
        payload_of,
    },
};
use core::ptr::{self, NonNull};
use log::{debug, error, trace, warn};
use pktdrv_addresses::PhysicalAddress;
use pktdrv_platform::PhysMapper;
use pktdrv_sync::IrqGuard;

/// Arena slots per pool.
pub const MAX_ARENAS: usize = 16;

/// Counters of one pool. Byte figures include headers.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct PoolStats {
    /// Bytes held in arenas.
    pub total_bytes: u32,
    pub used_bytes: u32,
    pub peak_bytes: u32,
    pub free_blocks: u32,
    /// Allocated blocks not yet freed.
    pub live_blocks: u32,
    /// Successful allocations since init.
    pub allocations: u32,
    pub failures: u32,
    pub arenas: u8,
}

/// Blocks still allocated when a pool was torn down.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct LeakReport {
    pub blocks: u32,
    /// Payload bytes.
    pub bytes: u32,
}

impl LeakReport {
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.blocks == 0
    }

    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            blocks: self.blocks + other.blocks,
            bytes: self.bytes + other.bytes,
        }
    }
}

#[derive(Debug)]
struct ArenaState {
    arena: Arena,
    /// CPU view of `arena.base`.
    ptr: NonNull<u8>,
    /// Offset of the lowest free header.
    free_head: u32,
    free_blocks: u32,
    blocks: u32,
}

impl ArenaState {
    #[inline]
    fn header(&self, offset: u32) -> *mut BlockHeader {
        self.ptr.as_ptr().wrapping_add(offset as usize).cast()
    }

    /// Offset of the header in front of `payload`, if it lies in this arena.
    fn offset_of(&self, payload: *mut u8) -> Option<u32> {
        let header = header_of(payload).addr();
        let offset = header.checked_sub(self.ptr.as_ptr().addr())?;
        let offset = u32::try_from(offset).ok()?;
        (offset < self.arena.len).then_some(offset)
    }

    const fn is_empty(&self) -> bool {
        self.blocks == 1 && self.free_blocks == 1
    }

    /// # Safety
    /// `offset` must be the offset of a free header on this arena's list.
    unsafe fn unlink(&mut self, offset: u32) {
        let h = self.header(offset);
        let (prev, next) = unsafe { ((*h).prev, (*h).next) };
        if prev == NO_LINK {
            self.free_head = next;
        } else {
            unsafe { (*self.header(prev)).next = next };
        }
        if next != NO_LINK {
            unsafe { (*self.header(next)).prev = prev };
        }
        unsafe {
            (*h).next = NO_LINK;
            (*h).prev = NO_LINK;
        }
        self.free_blocks -= 1;
    }

    /// Marks the block at `offset` free, links it in address order and merges
    /// it with adjacent free neighbors.
    ///
    /// # Safety
    /// `offset` must be the offset of a valid header not on the free list.
    unsafe fn insert_free(&mut self, offset: u32) {
        let mut prev = NO_LINK;
        let mut next = self.free_head;
        while next != NO_LINK && next < offset {
            prev = next;
            next = unsafe { (*self.header(next)).next };
        }

        let h = self.header(offset);
        unsafe {
            (*h).sentinel = Sentinel::Free.as_raw();
            (*h).flags = AllocFlags::new();
            (*h).kind = BlockKind::General as u8;
            (*h).prev = prev;
            (*h).next = next;
        }
        if prev == NO_LINK {
            self.free_head = offset;
        } else {
            unsafe { (*self.header(prev)).next = offset };
        }
        if next != NO_LINK {
            unsafe { (*self.header(next)).prev = offset };
        }
        self.free_blocks += 1;

        // Merge with the following block.
        if next != NO_LINK && offset + unsafe { (*h).span() } == next {
            unsafe { self.absorb(offset, next) };
        }
        // Merge into the preceding block.
        if prev != NO_LINK && prev + unsafe { (*self.header(prev)).span() } == offset {
            unsafe { self.absorb(prev, offset) };
        }
    }

    /// Folds the free block at `victim` into the free block at `into`, which
    /// ends where `victim` starts.
    unsafe fn absorb(&mut self, into: u32, victim: u32) {
        unsafe {
            self.unlink(victim);
            let span = (*self.header(victim)).span();
            (*self.header(into)).size += span;
            ptr::write_bytes(self.header(victim), 0, 1);
        }
        self.blocks -= 1;
    }

    /// First free block with at least `size` payload bytes, split if worth it.
    /// Returns the header offset.
    ///
    /// # Safety
    /// The arena's list must be intact.
    unsafe fn take_first_fit(&mut self, size: u32) -> Option<u32> {
        let mut offset = self.free_head;
        while offset != NO_LINK {
            let h = self.header(offset);
            let available = unsafe { (*h).size };
            if available >= size {
                unsafe { self.unlink(offset) };
                let remainder = available - size;
                if remainder > HEADER_SIZE {
                    let tail = offset + HEADER_SIZE + size;
                    let arena = unsafe { (*h).arena };
                    unsafe {
                        (*h).size = size;
                        ptr::write(self.header(tail), BlockHeader::free(remainder - HEADER_SIZE, arena));
                    }
                    self.blocks += 1;
                    unsafe { self.insert_free(tail) };
                }
                return Some(offset);
            }
            offset = unsafe { (*h).next };
        }
        None
    }
}

/// Memory pool of one tier.
pub struct Pool<B, M> {
    backing: B,
    mapper: M,
    arenas: [Option<ArenaState>; MAX_ARENAS],
    stats: PoolStats,
}

impl<B: Backing, M: PhysMapper> Pool<B, M> {
    #[must_use]
    pub const fn new(backing: B, mapper: M) -> Self {
        Self {
            backing,
            mapper,
            arenas: [const { None }; MAX_ARENAS],
            stats: PoolStats {
                total_bytes: 0,
                used_bytes: 0,
                peak_bytes: 0,
                free_blocks: 0,
                live_blocks: 0,
                allocations: 0,
                failures: 0,
                arenas: 0,
            },
        }
    }

    #[must_use]
    pub const fn tier(&self) -> Tier {
        B::TIER
    }

    #[must_use]
    pub const fn backing(&self) -> &B {
        &self.backing
    }

    pub const fn backing_mut(&mut self) -> &mut B {
        &mut self.backing
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let mut stats = self.stats;
        stats.free_blocks = self.arenas.iter().flatten().map(|a| a.free_blocks).sum();
        stats
    }

    /// Whether `ptr` points into one of this pool's arenas.
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.arena_of(ptr.cast_mut()).is_some()
    }

    fn arena_of(&self, payload: *mut u8) -> Option<(usize, u32)> {
        self.arenas
            .iter()
            .enumerate()
            .find_map(|(slot, a)| a.as_ref().and_then(|a| a.offset_of(payload)).map(|o| (slot, o)))
    }

    /// Allocates `size` payload bytes.
    ///
    /// # Errors
    /// [`AllocError::InvalidArgument`] for a zero size,
    /// [`AllocError::ServiceUnavailable`] when the pool is empty and its service
    /// is not installed, [`AllocError::OutOfMemory`] otherwise.
    pub fn allocate(
        &mut self,
        size: u32,
        kind: BlockKind,
        flags: AllocFlags,
    ) -> Result<Allocation, AllocError> {
        if size == 0 {
            return Err(AllocError::InvalidArgument("zero-sized allocation"));
        }
        let result = size
            .checked_next_multiple_of(BLOCK_ALIGN)
            .ok_or(AllocError::OutOfMemory)
            .and_then(|size| self.allocate_rounded(size, kind, flags));
        if result.is_err() {
            self.stats.failures += 1;
        }
        result
    }

    fn allocate_rounded(
        &mut self,
        size: u32,
        kind: BlockKind,
        flags: AllocFlags,
    ) -> Result<Allocation, AllocError> {
        if let Some(found) = self.take(size) {
            return self.finish(found, kind, flags);
        }
        let slot = self.grow(size)?;
        let found = {
            let _irq = IrqGuard::new();
            let arena = self.arenas[slot].as_mut().ok_or(AllocError::OutOfMemory)?;
            // SAFETY: the arena was just initialized.
            unsafe { arena.take_first_fit(size) }.map(|offset| (slot, offset))
        };
        let found = found.ok_or(AllocError::OutOfMemory)?;
        self.finish(found, kind, flags)
    }

    fn take(&mut self, size: u32) -> Option<(usize, u32)> {
        let _irq = IrqGuard::new();
        self.arenas.iter_mut().enumerate().find_map(|(slot, arena)| {
            let arena = arena.as_mut()?;
            // SAFETY: list invariants hold outside of this guarded section.
            unsafe { arena.take_first_fit(size) }.map(|offset| (slot, offset))
        })
    }

    /// Claims the block taken from `slot` at `offset` and updates counters.
    fn finish(
        &mut self,
        (slot, offset): (usize, u32),
        kind: BlockKind,
        flags: AllocFlags,
    ) -> Result<Allocation, AllocError> {
        let arena = self.arenas[slot].as_ref().ok_or(AllocError::OutOfMemory)?;
        let h = arena.header(offset);
        // SAFETY: the block was just unlinked and belongs to us.
        let size = unsafe {
            (*h).claim(kind, flags);
            (*h).size
        };
        let payload = payload_of(h);
        if flags.zeroed() {
            // SAFETY: the payload lies inside the arena.
            unsafe { ptr::write_bytes(payload, 0, size as usize) };
        }

        let linear = arena.arena.base + offset + HEADER_SIZE;
        self.stats.used_bytes += HEADER_SIZE + size;
        self.stats.peak_bytes = self.stats.peak_bytes.max(self.stats.used_bytes);
        self.stats.live_blocks += 1;
        self.stats.allocations += 1;
        trace!("{} pool: {size} bytes at {linear}", B::TIER);

        Ok(Allocation {
            // SAFETY: inside a non-null arena mapping.
            ptr: unsafe { NonNull::new_unchecked(payload) },
            linear,
            size,
            tier: B::TIER,
        })
    }

    /// Obtains a new arena that can hold `size` payload bytes and returns its slot.
    fn grow(&mut self, size: u32) -> Result<usize, AllocError> {
        let Some(slot) = self.arenas.iter().position(Option::is_none) else {
            debug!("{} pool: all {MAX_ARENAS} arena slots in use", B::TIER);
            return Err(AllocError::OutOfMemory);
        };
        if !self.backing.is_available() {
            return Err(AllocError::ServiceUnavailable(B::TIER));
        }

        let exact = size.checked_add(HEADER_SIZE).ok_or(AllocError::OutOfMemory)?;
        let arena = match self.backing.obtain(exact.max(B::CHUNK)) {
            Err(AllocError::OutOfMemory) if exact < B::CHUNK => {
                debug!("{} pool: no full chunk, asking for {exact} bytes", B::TIER);
                self.backing.obtain(exact)?
            }
            other => other?,
        };

        let ptr = NonNull::new(self.mapper.linear_to_ptr(arena.base)).ok_or(AllocError::OutOfMemory)?;
        #[allow(clippy::cast_possible_truncation)]
        let index = slot as u8;
        // SAFETY: the service handed us `arena` exclusively; its base is aligned.
        unsafe {
            ptr.as_ptr()
                .cast::<BlockHeader>()
                .write(BlockHeader::free(arena.len - HEADER_SIZE, index));
        }

        {
            let _irq = IrqGuard::new();
            self.arenas[slot] = Some(ArenaState {
                arena,
                ptr,
                free_head: 0,
                free_blocks: 1,
                blocks: 1,
            });
        }
        self.stats.total_bytes += arena.len;
        self.stats.arenas += 1;
        debug!("{} pool: arena {slot} at {}, {} bytes", B::TIER, arena.base, arena.len);
        Ok(slot)
    }

    /// Returns the block at `ptr` to its arena.
    ///
    /// # Errors
    /// [`AllocError::InvalidArgument`] for null or foreign pointers and
    /// [`AllocError::Corruption`] when the header does not carry the allocated
    /// sentinel. Nothing is modified in either case.
    pub fn free(&mut self, ptr: *mut u8) -> Result<(), AllocError> {
        if ptr.is_null() {
            return Err(AllocError::InvalidArgument("null pointer"));
        }
        let (slot, offset) = self
            .arena_of(ptr)
            .ok_or(AllocError::InvalidArgument("pointer not owned by this pool"))?;

        let irq = IrqGuard::new();
        let Some(arena) = self.arenas[slot].as_mut() else {
            return Err(AllocError::InvalidArgument("pointer not owned by this pool"));
        };
        let addr = arena.arena.base + offset;
        if offset % BLOCK_ALIGN != 0
            || u64::from(offset) + u64::from(HEADER_SIZE) > u64::from(arena.arena.len)
        {
            drop(irq);
            warn!("{} pool: {} is not a block start", B::TIER, addr + HEADER_SIZE);
            return Err(AllocError::InvalidArgument("pointer is not a block start"));
        }
        let h = arena.header(offset);
        // SAFETY: `offset` is block aligned and a whole header fits before the
        // arena end; its contents may be garbage, which is what is checked here.
        let header = unsafe { h.read() };
        let in_bounds =
            u64::from(offset) + u64::from(header.span()) <= u64::from(arena.arena.len);
        if !header.is_allocated() || usize::from(header.arena) != slot || !in_bounds {
            drop(irq);
            error!(
                "{} pool: corrupted header at {addr}, sentinel {:#010x}",
                B::TIER,
                header.sentinel
            );
            return Err(AllocError::Corruption {
                addr,
                found: header.sentinel,
            });
        }

        // SAFETY: the header was validated as an allocated block of this arena.
        unsafe { arena.insert_free(offset) };
        drop(irq);

        self.stats.used_bytes -= header.span();
        self.stats.live_blocks -= 1;
        trace!("{} pool: freed {} bytes at {}", B::TIER, header.size, addr + HEADER_SIZE);
        Ok(())
    }

    /// Walks every arena and checks the header invariants: valid sentinels,
    /// blocks tiling the arena exactly, no two adjacent free blocks, and a
    /// free list that is address ordered, doubly linked and complete.
    ///
    /// # Errors
    /// [`AllocError::Corruption`] naming the first offending header.
    pub fn verify(&self) -> Result<(), AllocError> {
        let _irq = IrqGuard::new();
        for arena in self.arenas.iter().flatten() {
            // SAFETY: headers are only read; offsets stay inside the arena.
            unsafe { Self::verify_arena(arena)? };
        }
        Ok(())
    }

    unsafe fn verify_arena(arena: &ArenaState) -> Result<(), AllocError> {
        let corrupt = |offset: u32, found: u32| AllocError::Corruption {
            addr: arena.arena.base + offset,
            found,
        };

        let mut offset = 0;
        let mut blocks = 0;
        let mut free = 0;
        let mut previous_free = false;
        while offset < arena.arena.len {
            let h = unsafe { arena.header(offset).read() };
            let Some(sentinel) = h.sentinel() else {
                return Err(corrupt(offset, h.sentinel));
            };
            let end = u64::from(offset) + u64::from(h.span());
            if h.size % BLOCK_ALIGN != 0 || end > u64::from(arena.arena.len) {
                return Err(corrupt(offset, h.sentinel));
            }
            let is_free = sentinel == Sentinel::Free;
            if is_free && previous_free {
                return Err(corrupt(offset, h.sentinel));
            }
            previous_free = is_free;
            free += u32::from(is_free);
            blocks += 1;
            offset += h.span();
        }
        if blocks != arena.blocks || free != arena.free_blocks {
            return Err(corrupt(0, 0));
        }

        let mut prev = NO_LINK;
        let mut node = arena.free_head;
        let mut linked = 0;
        while node != NO_LINK {
            let h = unsafe { arena.header(node).read() };
            if !h.is_free() || h.prev != prev || (prev != NO_LINK && node <= prev) {
                return Err(corrupt(node, h.sentinel));
            }
            linked += 1;
            if linked > free {
                return Err(corrupt(node, h.sentinel));
            }
            prev = node;
            node = h.next;
        }
        if linked != free {
            return Err(corrupt(0, 0));
        }
        Ok(())
    }

    /// Gives fully free arenas back to the service; returns the bytes released.
    pub fn trim(&mut self) -> u32 {
        let mut released = 0;
        for slot in 0..MAX_ARENAS {
            let empty = self.arenas[slot].as_ref().is_some_and(ArenaState::is_empty);
            if !empty {
                continue;
            }
            let Some(state) = self.take_slot(slot) else {
                continue;
            };
            released += state.arena.len;
            self.release(slot, &state.arena);
        }
        if released > 0 {
            debug!("{} pool: trimmed {released} bytes", B::TIER);
        }
        released
    }

    /// Releases every arena. Blocks still allocated are logged and counted.
    pub fn teardown(&mut self) -> LeakReport {
        let mut report = LeakReport::default();
        for slot in 0..MAX_ARENAS {
            let Some(state) = self.take_slot(slot) else {
                continue;
            };
            let mut offset = 0;
            while offset < state.arena.len {
                // SAFETY: the walk follows sizes validated by allocate/free.
                let h = unsafe { state.header(offset).read() };
                if h.sentinel().is_none() {
                    error!("{} pool: corrupted header at {}", B::TIER, state.arena.base + offset);
                    break;
                }
                if h.is_allocated() {
                    warn!(
                        "{} pool: leaked {} bytes at {}",
                        B::TIER,
                        h.size,
                        state.arena.base + offset + HEADER_SIZE
                    );
                    report.blocks += 1;
                    report.bytes += h.size;
                }
                offset += h.span();
            }
            self.release(slot, &state.arena);
        }
        self.stats = PoolStats {
            failures: self.stats.failures,
            allocations: self.stats.allocations,
            peak_bytes: self.stats.peak_bytes,
            ..PoolStats::default()
        };
        report
    }

    fn take_slot(&mut self, slot: usize) -> Option<ArenaState> {
        let state = {
            let _irq = IrqGuard::new();
            self.arenas[slot].take()?
        };
        self.stats.total_bytes -= state.arena.len;
        self.stats.arenas -= 1;
        Some(state)
    }

    fn release(&mut self, slot: usize, arena: &Arena) {
        if let Err(e) = self.backing.release(arena) {
            warn!("{} pool: releasing arena {slot} at {} failed: {e}", B::TIER, arena.base);
        }
    }

    /// Linear address of a payload pointer owned by this pool.
    #[must_use]
    pub fn linear_of(&self, ptr: *const u8) -> Option<PhysicalAddress> {
        let (slot, offset) = self.arena_of(ptr.cast_mut())?;
        let arena = self.arenas[slot].as_ref()?;
        Some(arena.arena.base + offset + HEADER_SIZE)
    }
}
