//! Block header preceding every payload.
//!
//! ```text
//! +-----------------------------+------------------------------+
//! | BlockHeader (32 bytes)      |      payload (size bytes)    |
//! +-----------------------------+------------------------------+
//! ^ header, 16-byte aligned     ^ payload_of(header)
//! ```
//!
//! Free-list links are byte offsets of other headers inside the same arena,
//! so a header stays meaningful whatever address the arena is mapped at.
//! [`header_of`] and [`payload_of`] are the only places that know the header
//! sits directly in front of the payload.

use bitfield_struct::bitfield;

/// Bytes occupied by a [`BlockHeader`].
pub const HEADER_SIZE: u32 = 32;

/// Granularity of payload sizes and arena lengths.
pub const BLOCK_ALIGN: u32 = 16;

/// Link value for "no neighbor".
pub const NO_LINK: u32 = u32::MAX;

/// Marks which list a block belongs to. Anything else means the header was
/// overwritten.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u32)]
pub enum Sentinel {
    Allocated = 0xABCD_EF00,
    Free = 0xDEAD_BEEF,
}

impl Sentinel {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0xABCD_EF00 => Some(Self::Allocated),
            0xDEAD_BEEF => Some(Self::Free),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
#[repr(u8)]
pub enum BlockKind {
    #[default]
    General = 0,
    PacketBuffer = 1,
    DmaBuffer = 2,
}

impl BlockKind {
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::General),
            1 => Some(Self::PacketBuffer),
            2 => Some(Self::DmaBuffer),
            _ => None,
        }
    }
}

/// Per-allocation request flags, stored in the header.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct AllocFlags {
    /// The block is meant to be handed to a bus master.
    pub dma_capable: bool,
    /// The payload is over-allocated so an aligned window can be carved out.
    pub alignment_padded: bool,
    /// Payload is zero-filled before it is returned.
    pub zeroed: bool,
    #[bits(5)]
    _reserved: u8,
}

#[derive(Debug, Copy, Clone)]
#[repr(C, align(16))]
pub struct BlockHeader {
    /// Payload bytes following the header, a multiple of [`BLOCK_ALIGN`].
    pub size: u32,
    /// Raw [`Sentinel`] value.
    pub sentinel: u32,
    /// Arena offset of the next free header (free blocks only).
    pub next: u32,
    /// Arena offset of the previous free header (free blocks only).
    pub prev: u32,
    pub flags: AllocFlags,
    /// Raw [`BlockKind`] value.
    pub kind: u8,
    /// Slot of the owning arena in its pool.
    pub arena: u8,
    _reserved: [u8; 13],
}

const _: () = assert!(size_of::<BlockHeader>() == HEADER_SIZE as usize);
const _: () = assert!(align_of::<BlockHeader>() == BLOCK_ALIGN as usize);

impl BlockHeader {
    /// Unlinked free block of `size` payload bytes in arena slot `arena`.
    #[must_use]
    pub const fn free(size: u32, arena: u8) -> Self {
        Self {
            size,
            sentinel: Sentinel::Free.as_raw(),
            next: NO_LINK,
            prev: NO_LINK,
            flags: AllocFlags::new(),
            kind: BlockKind::General as u8,
            arena,
            _reserved: [0; 13],
        }
    }

    #[must_use]
    pub const fn sentinel(&self) -> Option<Sentinel> {
        Sentinel::from_raw(self.sentinel)
    }

    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.sentinel == Sentinel::Free.as_raw()
    }

    #[must_use]
    pub const fn is_allocated(&self) -> bool {
        self.sentinel == Sentinel::Allocated.as_raw()
    }

    #[must_use]
    pub const fn kind(&self) -> Option<BlockKind> {
        BlockKind::from_raw(self.kind)
    }

    /// Header plus payload.
    #[must_use]
    pub const fn span(&self) -> u32 {
        HEADER_SIZE + self.size
    }

    /// Turns the block into an allocated one and drops its list links.
    pub const fn claim(&mut self, kind: BlockKind, flags: AllocFlags) {
        self.sentinel = Sentinel::Allocated.as_raw();
        self.next = NO_LINK;
        self.prev = NO_LINK;
        self.flags = flags;
        self.kind = kind as u8;
    }
}

/// Header of the block whose payload starts at `payload`.
///
/// Computing the pointer is safe; reading through it requires that `payload`
/// came from [`payload_of`] on a live arena.
#[inline]
#[must_use]
pub const fn header_of(payload: *mut u8) -> *mut BlockHeader {
    payload.wrapping_sub(HEADER_SIZE as usize).cast()
}

/// Payload following `header`.
#[inline]
#[must_use]
pub const fn payload_of(header: *mut BlockHeader) -> *mut u8 {
    header.cast::<u8>().wrapping_add(HEADER_SIZE as usize)
}
