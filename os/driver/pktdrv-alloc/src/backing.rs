//! Arena sources: one per tier, each wrapping a memory service.
//!
//! A pool grows by asking its [`Backing`] for an [`Arena`], a contiguous and
//! CPU-addressable range, and gives it back on trim or teardown. Extended
//! memory stays locked for the arena's whole life, since the free list lives
//! inside it.

use crate::{AllocError, Tier, header::BLOCK_ALIGN};
use log::{debug, warn};
use pktdrv_addresses::{
    CONVENTIONAL_LIMIT, HIGH_MEMORY_START, PhysicalAddress, SegmentAddress, UPPER_MEMORY_SEGMENT,
    kib_for, paragraphs_for,
};
use pktdrv_platform::{ConventionalMemory, ExtendedMemory, ServiceError, UpperMemory, XmsHandle};

/// What the service needs to take an arena back.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ArenaToken {
    Xms(XmsHandle),
    Segment(SegmentAddress),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Arena {
    /// Linear address of the first byte, 16-byte aligned.
    pub base: PhysicalAddress,
    /// Usable bytes, a multiple of 16.
    pub len: u32,
    pub token: ArenaToken,
}

impl Arena {
    #[must_use]
    pub const fn contains(&self, linear: PhysicalAddress) -> bool {
        match linear.offset_from(self.base) {
            Some(offset) => offset < self.len,
            None => false,
        }
    }
}

pub trait Backing {
    const TIER: Tier;

    /// Preferred arena size when a pool grows.
    const CHUNK: u32;

    fn is_available(&self) -> bool;

    /// Obtains an arena of at least `min_bytes`.
    ///
    /// # Errors
    /// [`AllocError::ServiceUnavailable`] when the service is not installed,
    /// [`AllocError::OutOfMemory`] for every other refusal, including memory
    /// returned outside the tier's address range.
    fn obtain(&mut self, min_bytes: u32) -> Result<Arena, AllocError>;

    /// Returns an arena to its service.
    ///
    /// # Errors
    /// Whatever the service reports; the arena is unusable either way.
    fn release(&mut self, arena: &Arena) -> Result<(), ServiceError>;
}

const fn service_error(tier: Tier, e: ServiceError) -> AllocError {
    match e {
        ServiceError::NotInstalled => AllocError::ServiceUnavailable(tier),
        _ => AllocError::OutOfMemory,
    }
}

/// Extended memory from an XMS driver, one locked handle per arena.
#[derive(Debug)]
pub struct ExtendedBacking<X> {
    xms: X,
}

impl<X: ExtendedMemory> ExtendedBacking<X> {
    #[must_use]
    pub const fn new(xms: X) -> Self {
        Self { xms }
    }

    #[must_use]
    pub const fn service(&self) -> &X {
        &self.xms
    }

    pub const fn service_mut(&mut self) -> &mut X {
        &mut self.xms
    }
}

/// Allocated (and possibly locked) handle that is given back unless kept.
struct Reservation<'a, X: ExtendedMemory> {
    xms: &'a mut X,
    handle: XmsHandle,
    locked: bool,
}

impl<X: ExtendedMemory> Reservation<'_, X> {
    fn lock(&mut self) -> Result<PhysicalAddress, ServiceError> {
        let base = self.xms.lock(self.handle)?;
        self.locked = true;
        Ok(base)
    }

    fn keep(self) -> XmsHandle {
        let handle = self.handle;
        core::mem::forget(self);
        handle
    }
}

impl<X: ExtendedMemory> Drop for Reservation<'_, X> {
    fn drop(&mut self) {
        if self.locked
            && let Err(e) = self.xms.unlock(self.handle)
        {
            warn!("XMS unlock of handle {} failed: {e}", self.handle.0);
        }
        if let Err(e) = self.xms.free(self.handle) {
            warn!("XMS free of handle {} failed: {e}", self.handle.0);
        }
    }
}

impl<X: ExtendedMemory> Backing for ExtendedBacking<X> {
    const TIER: Tier = Tier::Extended;
    const CHUNK: u32 = 0x1_0000;

    fn is_available(&self) -> bool {
        self.xms.is_available()
    }

    fn obtain(&mut self, min_bytes: u32) -> Result<Arena, AllocError> {
        // room to align the base
        let wanted = min_bytes.saturating_add(BLOCK_ALIGN - 1) as usize;
        let kb = kib_for(wanted).ok_or(AllocError::OutOfMemory)?;
        let handle = self
            .xms
            .allocate(kb)
            .map_err(|e| service_error(Tier::Extended, e))?;

        let mut reservation = Reservation {
            xms: &mut self.xms,
            handle,
            locked: false,
        };
        let raw = reservation
            .lock()
            .map_err(|e| service_error(Tier::Extended, e))?;
        if raw.as_u32() < HIGH_MEMORY_START.as_u32() {
            warn!("XMS handle {} locked below 1 MiB at {raw}", handle.0);
            return Err(AllocError::OutOfMemory);
        }
        let base = raw.align_up(BLOCK_ALIGN).ok_or(AllocError::OutOfMemory)?;
        let skew = base.as_u32() - raw.as_u32();
        let len = (u32::from(kb) * 1024 - skew) & !(BLOCK_ALIGN - 1);

        let handle = reservation.keep();
        debug!("XMS arena: handle {} at {base}, {len} bytes", handle.0);
        Ok(Arena {
            base,
            len,
            token: ArenaToken::Xms(handle),
        })
    }

    fn release(&mut self, arena: &Arena) -> Result<(), ServiceError> {
        let ArenaToken::Xms(handle) = arena.token else {
            return Err(ServiceError::InvalidHandle);
        };
        self.xms.unlock(handle)?;
        self.xms.free(handle)
    }
}

/// Upper memory blocks.
#[derive(Debug)]
pub struct UpperBacking<U> {
    umb: U,
}

impl<U: UpperMemory> UpperBacking<U> {
    #[must_use]
    pub const fn new(umb: U) -> Self {
        Self { umb }
    }

    #[must_use]
    pub const fn service(&self) -> &U {
        &self.umb
    }

    pub const fn service_mut(&mut self) -> &mut U {
        &mut self.umb
    }
}

impl<U: UpperMemory> Backing for UpperBacking<U> {
    const TIER: Tier = Tier::Upper;
    const CHUNK: u32 = 0x4000;

    fn is_available(&self) -> bool {
        self.umb.is_available()
    }

    fn obtain(&mut self, min_bytes: u32) -> Result<Arena, AllocError> {
        let paragraphs = paragraphs_for(min_bytes as usize).ok_or(AllocError::OutOfMemory)?;
        let segment = self
            .umb
            .allocate(paragraphs)
            .map_err(|e| service_error(Tier::Upper, e))?;
        let base = segment.linear();
        let len = u32::from(paragraphs) * BLOCK_ALIGN;

        let end = base.as_u32() + len;
        if segment.segment < UPPER_MEMORY_SEGMENT || end > HIGH_MEMORY_START.as_u32() {
            warn!("UMB at {segment} lies outside upper memory, returning it");
            if let Err(e) = self.umb.free(segment) {
                warn!("UMB free of {segment} failed: {e}");
            }
            return Err(AllocError::OutOfMemory);
        }

        debug!("UMB arena at {segment}, {len} bytes");
        Ok(Arena {
            base,
            len,
            token: ArenaToken::Segment(segment),
        })
    }

    fn release(&mut self, arena: &Arena) -> Result<(), ServiceError> {
        let ArenaToken::Segment(segment) = arena.token else {
            return Err(ServiceError::InvalidHandle);
        };
        self.umb.free(segment)
    }
}

/// DOS conventional memory below 640 KiB.
#[derive(Debug)]
pub struct ConventionalBacking<C> {
    dos: C,
}

impl<C: ConventionalMemory> ConventionalBacking<C> {
    #[must_use]
    pub const fn new(dos: C) -> Self {
        Self { dos }
    }

    #[must_use]
    pub const fn service(&self) -> &C {
        &self.dos
    }

    pub const fn service_mut(&mut self) -> &mut C {
        &mut self.dos
    }
}

impl<C: ConventionalMemory> Backing for ConventionalBacking<C> {
    const TIER: Tier = Tier::Conventional;
    const CHUNK: u32 = 0x1000;

    fn is_available(&self) -> bool {
        true
    }

    fn obtain(&mut self, min_bytes: u32) -> Result<Arena, AllocError> {
        let paragraphs = paragraphs_for(min_bytes as usize).ok_or(AllocError::OutOfMemory)?;
        let segment = self
            .dos
            .allocate(paragraphs)
            .map_err(|e| service_error(Tier::Conventional, e))?;
        let base = segment.linear();
        let len = u32::from(paragraphs) * BLOCK_ALIGN;

        if base.as_u32() + len > CONVENTIONAL_LIMIT.as_u32() {
            warn!("DOS block at {segment} ends above 640 KiB, returning it");
            if let Err(e) = self.dos.free(segment) {
                warn!("DOS free of {segment} failed: {e}");
            }
            return Err(AllocError::OutOfMemory);
        }

        debug!("DOS arena at {segment}, {len} bytes");
        Ok(Arena {
            base,
            len,
            token: ArenaToken::Segment(segment),
        })
    }

    fn release(&mut self, arena: &Arena) -> Result<(), ServiceError> {
        let ArenaToken::Segment(segment) = arena.token else {
            return Err(ServiceError::InvalidHandle);
        };
        self.dos.free(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pktdrv_testkit::{SimConventional, SimUmb, SimXms};

    #[test]
    fn extended_arena_stays_locked() {
        let mut backing = ExtendedBacking::new(SimXms::straddling_16m());
        let arena = backing.obtain(0x1_0000).unwrap();
        assert_eq!(arena.base, PhysicalAddress::new(0x00F0_0000));
        assert!(arena.len >= 0x1_0000);
        assert_eq!(backing.service().outstanding_locks(), 1);

        backing.release(&arena).unwrap();
        assert_eq!(backing.service().outstanding_locks(), 0);
        assert_eq!(backing.service().live_handles(), 0);
    }

    #[test]
    fn extended_errors_map_to_tier_failures() {
        let mut absent = ExtendedBacking::new(SimXms::absent());
        assert_eq!(
            absent.obtain(16),
            Err(AllocError::ServiceUnavailable(Tier::Extended))
        );
        let mut exhausted = ExtendedBacking::new(SimXms::exhausted());
        assert_eq!(exhausted.obtain(16), Err(AllocError::OutOfMemory));
    }

    #[test]
    fn extended_below_one_mib_is_returned() {
        let mut backing = ExtendedBacking::new(SimXms::new(PhysicalAddress::new(0x8_0000), 64));
        assert_eq!(backing.obtain(0x400), Err(AllocError::OutOfMemory));
        assert_eq!(backing.service().live_handles(), 0);
        assert_eq!(backing.service().outstanding_locks(), 0);
    }

    #[test]
    fn umb_below_a000_is_rejected() {
        let mut umb = SimUmb::d000_64k();
        umb.misplace_next = Some(0x9000);
        let mut backing = UpperBacking::new(umb);
        assert_eq!(backing.obtain(0x4000), Err(AllocError::OutOfMemory));

        let arena = backing.obtain(0x4000).unwrap();
        assert_eq!(arena.token, ArenaToken::Segment(SegmentAddress::from_segment(0xD000)));
        assert_eq!(arena.len, 0x4000);
        backing.release(&arena).unwrap();
        assert_eq!(backing.service().live_blocks(), 0);
    }

    #[test]
    fn conventional_must_end_below_640k() {
        let mut backing = ConventionalBacking::new(SimConventional::new(0x9F00, 0xB000));
        assert_eq!(backing.obtain(0x4000), Err(AllocError::OutOfMemory));
        assert_eq!(backing.service().live_blocks(), 0);

        let arena = backing.obtain(0x800).unwrap();
        assert_eq!(arena.base, PhysicalAddress::new(0x9_F000));
        assert!(arena.contains(PhysicalAddress::new(0x9_F7FF)));
        assert!(!arena.contains(PhysicalAddress::new(0x9_F800)));
    }
}
