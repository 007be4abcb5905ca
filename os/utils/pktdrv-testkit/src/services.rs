use crate::ranges::Ranges;
use log::trace;
use pktdrv_addresses::{PhysicalAddress, SegmentAddress, Size64K};
use pktdrv_platform::{
    ConventionalMemory, ExtendedMemory, MediatedDma, PhysicalDescriptor, ServiceError,
    UpperMemory, VdsStatus, XmsHandle, XmsInfo,
};

#[derive(Debug, Clone, Copy)]
struct XmsBlock {
    handle: XmsHandle,
    base: u32,
    kb: u16,
    locks: u8,
}

/// XMS driver double. Blocks are KiB-granular and 1 KiB aligned.
#[derive(Debug, Clone)]
pub struct SimXms {
    available: bool,
    ranges: Ranges,
    blocks: Vec<XmsBlock>,
    next_handle: u16,
    /// Fail every `allocate` regardless of free space.
    pub refuse: bool,
    pub allocations: usize,
}

impl SimXms {
    /// Window of `kb` KiB at linear `base`.
    #[must_use]
    pub fn new(base: PhysicalAddress, kb: u32) -> Self {
        let start = base.as_u32();
        Self {
            available: true,
            ranges: Ranges::new(start, start + kb * 1024),
            blocks: Vec::new(),
            next_handle: 1,
            refuse: false,
            allocations: 0,
        }
    }

    /// 2 MiB at 15 MiB, so blocks can land on either side of 16 MiB.
    #[must_use]
    pub fn straddling_16m() -> Self {
        Self::new(PhysicalAddress::new(0x00F0_0000), 2048)
    }

    /// Driver present, but nothing left to hand out.
    #[must_use]
    pub fn exhausted() -> Self {
        Self::new(PhysicalAddress::new(0x0010_0000), 0)
    }

    #[must_use]
    pub fn absent() -> Self {
        Self {
            available: false,
            ..Self::exhausted()
        }
    }

    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn outstanding_locks(&self) -> u32 {
        self.blocks.iter().map(|b| u32::from(b.locks)).sum()
    }

    fn block(&mut self, handle: XmsHandle) -> Result<&mut XmsBlock, ServiceError> {
        self.blocks
            .iter_mut()
            .find(|b| b.handle == handle)
            .ok_or(ServiceError::InvalidHandle)
    }
}

impl ExtendedMemory for SimXms {
    fn is_available(&self) -> bool {
        self.available
    }

    fn allocate(&mut self, kb: u16) -> Result<XmsHandle, ServiceError> {
        if !self.available {
            return Err(ServiceError::NotInstalled);
        }
        if self.refuse || kb == 0 {
            return Err(ServiceError::OutOfMemory);
        }
        let base = self
            .ranges
            .allocate(u32::from(kb) * 1024, 1024)
            .ok_or(ServiceError::OutOfMemory)?;
        let handle = XmsHandle(self.next_handle);
        self.next_handle += 1;
        self.allocations += 1;
        self.blocks.push(XmsBlock {
            handle,
            base,
            kb,
            locks: 0,
        });
        trace!("sim XMS: {kb} KiB at {base:#x} as handle {}", handle.0);
        Ok(handle)
    }

    fn lock(&mut self, handle: XmsHandle) -> Result<PhysicalAddress, ServiceError> {
        let block = self.block(handle)?;
        block.locks = block.locks.checked_add(1).ok_or(ServiceError::Xms(0xAC))?;
        Ok(PhysicalAddress::new(block.base))
    }

    fn unlock(&mut self, handle: XmsHandle) -> Result<(), ServiceError> {
        let block = self.block(handle)?;
        block.locks = block.locks.checked_sub(1).ok_or(ServiceError::Xms(0xAA))?;
        Ok(())
    }

    fn free(&mut self, handle: XmsHandle) -> Result<(), ServiceError> {
        let block = *self.block(handle)?;
        if block.locks > 0 {
            return Err(ServiceError::Xms(0xAB));
        }
        self.ranges.release(block.base);
        self.blocks.retain(|b| b.handle != handle);
        Ok(())
    }

    fn query(&mut self) -> Result<XmsInfo, ServiceError> {
        if !self.available {
            return Err(ServiceError::NotInstalled);
        }
        let free_kb = self.ranges.free_total() / 1024;
        Ok(XmsInfo {
            total_kb: free_kb + self.blocks.iter().map(|b| u32::from(b.kb)).sum::<u32>(),
            free_kb,
            largest_block_kb: self.ranges.largest_free() / 1024,
        })
    }
}

/// UMB provider double.
#[derive(Debug, Clone)]
pub struct SimUmb {
    available: bool,
    ranges: Ranges,
    /// Hand out this segment (below `A000h`) instead of a real UMB, once.
    pub misplace_next: Option<u16>,
    pub allocations: usize,
}

impl SimUmb {
    /// UMBs in `start..end` (segments).
    #[must_use]
    pub const fn new(start: u16, end: u16) -> Self {
        Self {
            available: true,
            ranges: Ranges::new(start as u32, end as u32),
            misplace_next: None,
            allocations: 0,
        }
    }

    /// 64 KiB at `D000h`.
    #[must_use]
    pub const fn d000_64k() -> Self {
        Self::new(0xD000, 0xE000)
    }

    #[must_use]
    pub fn absent() -> Self {
        Self {
            available: false,
            ..Self::new(0xD000, 0xD000)
        }
    }

    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.ranges.live()
    }
}

impl UpperMemory for SimUmb {
    fn is_available(&self) -> bool {
        self.available
    }

    #[allow(clippy::cast_possible_truncation)]
    fn allocate(&mut self, paragraphs: u16) -> Result<SegmentAddress, ServiceError> {
        if !self.available {
            return Err(ServiceError::NotInstalled);
        }
        if let Some(segment) = self.misplace_next.take() {
            self.allocations += 1;
            return Ok(SegmentAddress::from_segment(segment));
        }
        let segment = self
            .ranges
            .allocate(u32::from(paragraphs), 1)
            .ok_or(ServiceError::OutOfMemory)?;
        self.allocations += 1;
        Ok(SegmentAddress::from_segment(segment as u16))
    }

    fn free(&mut self, segment: SegmentAddress) -> Result<(), ServiceError> {
        if segment.segment < 0xA000 {
            // the misplaced block; nothing was recorded for it
            return Ok(());
        }
        self.ranges
            .release(u32::from(segment.segment))
            .map(|_| ())
            .ok_or(ServiceError::InvalidHandle)
    }
}

/// DOS memory arena double.
#[derive(Debug, Clone)]
pub struct SimConventional {
    ranges: Ranges,
    pub allocations: usize,
}

impl SimConventional {
    /// Arena over segments `start..end`. `end` may lie past `A000h` to model
    /// a misbehaving arena.
    #[must_use]
    pub const fn new(start: u16, end: u32) -> Self {
        Self {
            ranges: Ranges::new(start as u32, end),
            allocations: 0,
        }
    }

    /// Segments `2000h..A000h`, 512 KiB.
    #[must_use]
    pub const fn below_640k() -> Self {
        Self::new(0x2000, 0xA000)
    }

    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.ranges.live()
    }
}

impl ConventionalMemory for SimConventional {
    #[allow(clippy::cast_possible_truncation)]
    fn allocate(&mut self, paragraphs: u16) -> Result<SegmentAddress, ServiceError> {
        let segment = self
            .ranges
            .allocate(u32::from(paragraphs), 1)
            .ok_or(ServiceError::OutOfMemory)?;
        self.allocations += 1;
        Ok(SegmentAddress::from_segment(segment as u16))
    }

    fn free(&mut self, segment: SegmentAddress) -> Result<(), ServiceError> {
        self.ranges
            .release(u32::from(segment.segment))
            .map(|_| ())
            .ok_or(ServiceError::InvalidHandle)
    }
}

/// VDS provider double: physical = linear + `remap`.
#[derive(Debug, Clone, Default)]
pub struct SimVds {
    available: bool,
    /// Added to every linear address (wrapping), as a paging manager would.
    pub remap: u32,
    /// Refuse regions that cross a 64 KiB boundary in physical memory.
    pub refuse_crossing: bool,
    locked: Vec<PhysicalDescriptor>,
    pub lock_calls: usize,
}

impl SimVds {
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn absent() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_remap(mut self, remap: u32) -> Self {
        self.remap = remap;
        self
    }

    #[must_use]
    pub fn outstanding_locks(&self) -> usize {
        self.locked.len()
    }
}

impl MediatedDma for SimVds {
    fn is_available(&self) -> bool {
        self.available
    }

    fn lock_region(
        &mut self,
        linear: PhysicalAddress,
        len: u32,
    ) -> Result<PhysicalDescriptor, ServiceError> {
        if !self.available {
            return Err(ServiceError::NotInstalled);
        }
        self.lock_calls += 1;
        let physical = PhysicalAddress::new(linear.as_u32().wrapping_add(self.remap));
        if self.refuse_crossing && physical.crosses::<Size64K>(len) {
            return Err(ServiceError::Vds(VdsStatus::CrossedBoundary));
        }
        let descriptor = PhysicalDescriptor {
            linear,
            physical,
            len,
            buffer_id: 0,
        };
        self.locked.push(descriptor);
        Ok(descriptor)
    }

    fn unlock_region(&mut self, descriptor: &PhysicalDescriptor) -> Result<(), ServiceError> {
        let index = self
            .locked
            .iter()
            .position(|d| d == descriptor)
            .ok_or(ServiceError::Vds(VdsStatus::InvalidRegion))?;
        self.locked.remove(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xms_tracks_locks() {
        let mut xms = SimXms::straddling_16m();
        let h = xms.allocate(64).unwrap();
        let base = xms.lock(h).unwrap();
        assert_eq!(base, PhysicalAddress::new(0x00F0_0000));
        assert_eq!(xms.free(h), Err(ServiceError::Xms(0xAB)));
        assert_eq!(xms.outstanding_locks(), 1);
        xms.unlock(h).unwrap();
        xms.free(h).unwrap();
        assert_eq!(xms.live_handles(), 0);
        assert_eq!(xms.query().unwrap().free_kb, 2048);
    }

    #[test]
    fn exhausted_and_absent_xms() {
        assert_eq!(SimXms::exhausted().allocate(1), Err(ServiceError::OutOfMemory));
        let mut absent = SimXms::absent();
        assert!(!absent.is_available());
        assert_eq!(absent.allocate(1), Err(ServiceError::NotInstalled));
    }

    #[test]
    fn umb_can_misplace() {
        let mut umb = SimUmb::d000_64k();
        umb.misplace_next = Some(0x9000);
        assert_eq!(umb.allocate(16).unwrap().segment, 0x9000);
        assert_eq!(umb.allocate(16).unwrap().segment, 0xD000);
        // a full 64 KiB no longer fits
        assert_eq!(umb.allocate(0x1000), Err(ServiceError::OutOfMemory));
    }

    #[test]
    fn vds_remaps_and_balances() {
        let mut vds = SimVds::new().with_remap(0x0010_0000);
        let d = vds.lock_region(PhysicalAddress::new(0x2_0000), 0x100).unwrap();
        assert_eq!(d.physical, PhysicalAddress::new(0x12_0000));
        vds.unlock_region(&d).unwrap();
        assert_eq!(vds.outstanding_locks(), 0);
        assert!(vds.unlock_region(&d).is_err());
    }
}
