//! Buffers a bus master or the ISA DMA controller can be pointed at.
//!
//! A request is served by over-allocating a raw block from a
//! [`BlockAllocator`] and carving an aligned window out of it:
//!
//! ```text
//!  raw ─┬───────────────┬────────── size ──────────┬──────────┐
//!       │ slack         │ aligned window           │ slack    │
//!       └───────────────┴──────────────────────────┴──────────┘
//!                       ^ aligned, never across a 64 KiB line (legacy)
//! ```
//!
//! Legacy (ISA) requests reserve an extra 64 KiB so the window can always be
//! slid past a 64 KiB boundary; a window that still crosses one, or ends above
//! 16 MiB, is rejected and the next attempt draws fresh memory. Rejected raw
//! blocks are held until the tier's attempts are used up; then the next tier
//! in the allocator's order gets its turn.
//!
//! When a mediated DMA service is passed in, the window is locked through it
//! and every check applies to the physical address it reports.

use crate::{
    AllocError, Allocation, BlockAllocator, Tier,
    header::{AllocFlags, BlockKind},
};
use core::fmt;
use core::ptr::NonNull;
use log::{debug, info, warn};
use pktdrv_addresses::{LEGACY_DMA_CEILING, PhysicalAddress, Size64K};
use pktdrv_platform::{MediatedDma, PhysicalDescriptor};

/// Upper bound on attempts per request.
pub const MAX_DMA_RETRIES: u8 = 10;

/// Live DMA buffers tracked at once.
pub const MAX_DMA_RECORDS: usize = 32;

/// Extra bytes reserved for legacy requests.
pub const LEGACY_MARGIN: u32 = 0x1_0000;

/// Largest legacy transfer: one 64 KiB DMA page.
pub const LEGACY_MAX_SIZE: u32 = 0x1_0000;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DmaRequest {
    pub size: u32,
    /// Power of two.
    pub alignment: u32,
    /// ISA DMA: below 16 MiB and never across a 64 KiB boundary.
    pub legacy: bool,
    /// Capped at [`MAX_DMA_RETRIES`].
    pub max_retries: u8,
}

impl DmaRequest {
    pub const DEFAULT_RETRIES: u8 = 5;

    #[must_use]
    pub const fn new(size: u32, alignment: u32) -> Self {
        Self {
            size,
            alignment,
            legacy: false,
            max_retries: Self::DEFAULT_RETRIES,
        }
    }

    #[must_use]
    pub const fn legacy(mut self) -> Self {
        self.legacy = true;
        self
    }

    #[must_use]
    pub const fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Checks the request before any memory is touched.
    ///
    /// # Errors
    /// [`AllocError::InvalidArgument`] for a zero size, an alignment that is
    /// not a power of two, or a legacy request above 64 KiB.
    pub const fn validate(&self) -> Result<(), AllocError> {
        if self.size == 0 {
            return Err(AllocError::InvalidArgument("zero-sized DMA buffer"));
        }
        if !self.alignment.is_power_of_two() {
            return Err(AllocError::InvalidArgument("alignment is not a power of two"));
        }
        if self.legacy && self.size > LEGACY_MAX_SIZE {
            return Err(AllocError::InvalidArgument("legacy DMA buffer above 64 KiB"));
        }
        Ok(())
    }

    /// Attempts this request may make, between 1 and [`MAX_DMA_RETRIES`].
    #[must_use]
    pub const fn attempts(&self) -> u8 {
        match self.max_retries {
            0 => 1,
            n if n > MAX_DMA_RETRIES => MAX_DMA_RETRIES,
            n => n,
        }
    }

    /// Bytes to take from the pool for one attempt.
    #[must_use]
    pub const fn raw_size(&self) -> Option<u32> {
        let Some(padded) = self.size.checked_add(self.alignment.saturating_sub(1)) else {
            return None;
        };
        if self.legacy {
            padded.checked_add(LEGACY_MARGIN)
        } else {
            Some(padded)
        }
    }
}

/// A constrained buffer ready for a transfer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DmaBuffer {
    /// CPU pointer to the aligned window.
    pub ptr: NonNull<u8>,
    pub linear: PhysicalAddress,
    /// Address to program into the device.
    pub physical: PhysicalAddress,
    pub size: u32,
    pub tier: Tier,
}

/// Bookkeeping for a live [`DmaBuffer`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DmaAllocationRecord {
    pub raw: NonNull<u8>,
    pub aligned: NonNull<u8>,
    pub raw_size: u32,
    pub usable_size: u32,
    pub physical: PhysicalAddress,
    /// Lock held on the window when a mediated service was used.
    pub descriptor: Option<PhysicalDescriptor>,
}

/// Why a candidate window was thrown away.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Rejection {
    NoRoom,
    Misaligned(PhysicalAddress),
    Crosses64K(PhysicalAddress),
    AboveCeiling(PhysicalAddress),
    LockFailed,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRoom => f.write_str("no aligned window fits"),
            Self::Misaligned(pa) => write!(f, "physical {pa} is misaligned"),
            Self::Crosses64K(pa) => write!(f, "window at {pa} crosses a 64K boundary"),
            Self::AboveCeiling(pa) => write!(f, "window at {pa} ends above 16 MiB"),
            Self::LockFailed => f.write_str("mediated lock failed"),
        }
    }
}

struct Placement {
    offset: u32,
    physical: PhysicalAddress,
    descriptor: Option<PhysicalDescriptor>,
}

/// Chooses the window inside `raw` and checks it.
fn place(
    raw: &Allocation,
    req: &DmaRequest,
    vds: Option<&mut dyn MediatedDma>,
) -> Result<Placement, Rejection> {
    let mut start = raw.linear.align_up(req.alignment).ok_or(Rejection::NoRoom)?;
    if req.legacy && start.crosses::<Size64K>(req.size) {
        start = start
            .next_boundary::<Size64K>()
            .and_then(|b| b.align_up(req.alignment))
            .ok_or(Rejection::NoRoom)?;
    }
    let offset = start.offset_from(raw.linear).ok_or(Rejection::NoRoom)?;
    if u64::from(offset) + u64::from(req.size) > u64::from(raw.size) {
        return Err(Rejection::NoRoom);
    }

    let (physical, descriptor, vds) = match vds {
        Some(vds) if vds.is_available() => {
            let d = vds.lock_region(start, req.size).map_err(|e| {
                warn!("DMA lock of {start} failed: {e}");
                Rejection::LockFailed
            })?;
            (d.physical, Some(d), Some(vds))
        }
        _ => (start, None, None),
    };

    let rejection = if !physical.is_aligned(req.alignment) {
        Some(Rejection::Misaligned(physical))
    } else if req.legacy && physical.crosses::<Size64K>(req.size) {
        Some(Rejection::Crosses64K(physical))
    } else if req.legacy && !physical.fits_below(LEGACY_DMA_CEILING, req.size) {
        Some(Rejection::AboveCeiling(physical))
    } else {
        None
    };
    if let Some(rejection) = rejection {
        if let (Some(vds), Some(d)) = (vds, descriptor.as_ref())
            && let Err(e) = vds.unlock_region(d)
        {
            warn!("DMA unlock of rejected window {start} failed: {e}");
        }
        return Err(rejection);
    }

    Ok(Placement {
        offset,
        physical,
        descriptor,
    })
}

/// Hands out and takes back constrained buffers; owns the record table.
#[derive(Debug)]
pub struct DmaAllocator {
    records: [Option<DmaAllocationRecord>; MAX_DMA_RECORDS],
}

impl Default for DmaAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: [None; MAX_DMA_RECORDS],
        }
    }

    /// Live buffers.
    #[must_use]
    pub fn live(&self) -> usize {
        self.records.iter().flatten().count()
    }

    #[must_use]
    pub fn record(&self, aligned: *const u8) -> Option<&DmaAllocationRecord> {
        self.records
            .iter()
            .flatten()
            .find(|r| core::ptr::eq(r.aligned.as_ptr(), aligned))
    }

    /// Allocates a buffer satisfying `req`.
    ///
    /// Tiers are tried in the allocator's order. Within a tier up to
    /// [`DmaRequest::attempts`] raw blocks are drawn; when every one of them
    /// is rejected, or the tier runs dry, the next tier is tried.
    ///
    /// # Errors
    /// - [`AllocError::InvalidArgument`] when the request fails validation;
    ///   nothing is allocated in that case.
    /// - [`AllocError::ConstraintUnsatisfiable`] when no tier served it and at
    ///   least one window had to be rejected; `attempts` counts them all.
    /// - [`AllocError::OutOfMemory`] when every tier ran dry before any window
    ///   was tried, or when the record table is full.
    pub fn allocate<A: BlockAllocator + ?Sized>(
        &mut self,
        alloc: &mut A,
        req: DmaRequest,
        mut vds: Option<&mut dyn MediatedDma>,
    ) -> Result<DmaBuffer, AllocError> {
        req.validate()?;
        let raw_size = req
            .raw_size()
            .ok_or(AllocError::InvalidArgument("DMA buffer too large"))?;
        let Some(slot) = self.records.iter().position(Option::is_none) else {
            warn!("all {MAX_DMA_RECORDS} DMA records in use");
            return Err(AllocError::OutOfMemory);
        };

        let flags = AllocFlags::new()
            .with_dma_capable(true)
            .with_alignment_padded(true);
        let attempts = req.attempts();
        let order = alloc.tiers();
        let mut rejections: u8 = 0;
        let mut found = None;

        for tier in order.iter() {
            let mut rejected: [Option<NonNull<u8>>; MAX_DMA_RETRIES as usize] =
                [None; MAX_DMA_RETRIES as usize];
            let mut held: u8 = 0;
            let mut fatal = None;

            for attempt in 1..=attempts {
                let raw = match alloc.allocate_in(tier, raw_size, BlockKind::DmaBuffer, flags) {
                    Ok(raw) => raw,
                    Err(e) if e.is_recoverable() => {
                        debug!("DMA attempt {attempt}/{attempts}: no {tier} block ({e})");
                        break;
                    }
                    Err(e) => {
                        fatal = Some(e);
                        break;
                    }
                };
                let vds = vds.as_mut().map(|v| &mut **v as &mut dyn MediatedDma);
                match place(&raw, &req, vds) {
                    Ok(placement) => {
                        found = Some((raw, placement));
                        break;
                    }
                    Err(why) => {
                        warn!("DMA attempt {attempt}/{attempts} in {tier} memory: {why}");
                        rejected[usize::from(held)] = Some(raw.ptr);
                        held += 1;
                    }
                }
            }

            for ptr in rejected.iter().flatten() {
                if let Err(e) = alloc.free(ptr.as_ptr()) {
                    warn!("returning rejected DMA block failed: {e}");
                }
            }
            rejections = rejections.saturating_add(held);

            if let Some(e) = fatal {
                return Err(e);
            }
            if found.is_some() {
                break;
            }
            if held > 0 {
                info!(
                    "{tier} memory cannot place a {} byte DMA buffer, trying next tier",
                    req.size
                );
            }
        }

        let Some((raw, placement)) = found else {
            if rejections > 0 {
                warn!("DMA buffer of {} bytes: gave up after {rejections} attempts", req.size);
                return Err(AllocError::ConstraintUnsatisfiable {
                    attempts: rejections,
                });
            }
            warn!("no tier of {order} has room for a {} byte DMA buffer", req.size);
            return Err(AllocError::OutOfMemory);
        };

        // SAFETY: `offset + size` lies inside the raw block.
        let aligned = unsafe { raw.ptr.add(placement.offset as usize) };
        let linear = raw.linear + placement.offset;
        self.records[slot] = Some(DmaAllocationRecord {
            raw: raw.ptr,
            aligned,
            raw_size: raw.size,
            usable_size: req.size,
            physical: placement.physical,
            descriptor: placement.descriptor,
        });

        if req.legacy {
            info!(
                "DMA buffer {} bytes at {} (ISA: below 16 MiB, no 64K crossing)",
                req.size, placement.physical
            );
        } else {
            debug!("DMA buffer {} bytes at {}", req.size, placement.physical);
        }

        Ok(DmaBuffer {
            ptr: aligned,
            linear,
            physical: placement.physical,
            size: req.size,
            tier: raw.tier,
        })
    }

    /// Frees the buffer whose aligned pointer is `aligned`: unlocks it if it
    /// was locked and returns the raw block. The record is only dropped once
    /// the raw block is back in its pool.
    ///
    /// # Errors
    /// [`AllocError::InvalidArgument`] for pointers this allocator did not
    /// hand out; otherwise whatever freeing the raw block reports.
    pub fn free<A: BlockAllocator + ?Sized>(
        &mut self,
        alloc: &mut A,
        aligned: *mut u8,
        vds: Option<&mut dyn MediatedDma>,
    ) -> Result<(), AllocError> {
        let slot = self
            .records
            .iter()
            .position(|r| r.is_some_and(|r| core::ptr::eq(r.aligned.as_ptr(), aligned)))
            .ok_or(AllocError::InvalidArgument("not a live DMA buffer"))?;
        let Some(record) = self.records[slot].as_mut() else {
            return Err(AllocError::InvalidArgument("not a live DMA buffer"));
        };
        Self::release(alloc, record, vds)?;
        self.records[slot] = None;
        Ok(())
    }

    /// Frees every live buffer. Returns how many there were.
    pub fn release_all<A: BlockAllocator + ?Sized>(
        &mut self,
        alloc: &mut A,
        mut vds: Option<&mut dyn MediatedDma>,
    ) -> usize {
        let mut released = 0;
        for slot in &mut self.records {
            let Some(mut record) = slot.take() else {
                continue;
            };
            let vds = vds.as_mut().map(|v| &mut **v as &mut dyn MediatedDma);
            if let Err(e) = Self::release(alloc, &mut record, vds) {
                warn!("releasing DMA buffer at {} failed: {e}", record.physical);
            }
            released += 1;
        }
        released
    }

    /// Unlocks (once) and frees the raw block behind `record`.
    fn release<A: BlockAllocator + ?Sized>(
        alloc: &mut A,
        record: &mut DmaAllocationRecord,
        vds: Option<&mut dyn MediatedDma>,
    ) -> Result<(), AllocError> {
        if let Some(d) = record.descriptor {
            match vds {
                Some(vds) => match vds.unlock_region(&d) {
                    Ok(()) => record.descriptor = None,
                    Err(e) => warn!("DMA unlock at {} failed: {e}", d.physical),
                },
                None => warn!("DMA buffer at {} is locked but no VDS was given", d.physical),
            }
        }
        alloc.free(record.raw.as_ptr())
    }
}
