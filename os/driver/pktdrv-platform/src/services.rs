//! Contracts of the memory services the allocator draws from.
//!
//! Each pool tier talks to exactly one of these traits. Real implementations
//! live in [`crate::xms`], [`crate::dos`] and [`crate::vds`].

use pktdrv_addresses::{PhysicalAddress, SegmentAddress};

/// Extended memory block handle.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct XmsHandle(pub u16);

/// Result of an extended memory query, in KiB.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct XmsInfo {
    pub total_kb: u32,
    pub free_kb: u32,
    pub largest_block_kb: u32,
}

/// Device-visible description of a region locked through VDS.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PhysicalDescriptor {
    /// Linear address the region was locked at (what the CPU uses).
    pub linear: PhysicalAddress,
    /// Physical address the device must be programmed with.
    pub physical: PhysicalAddress,
    pub len: u32,
    /// VDS buffer ID; nonzero when the provider substituted a bounce buffer.
    pub buffer_id: u16,
}

impl PhysicalDescriptor {
    /// The provider handed out its own buffer instead of pinning ours.
    #[must_use]
    pub const fn is_remapped(&self) -> bool {
        self.buffer_id != 0
    }
}

/// VDS lock failure codes (`AX` with carry set).
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VdsStatus {
    #[error("region not contiguous")]
    NotContiguous,
    #[error("region crossed a 64K boundary")]
    CrossedBoundary,
    #[error("unable to lock pages")]
    CannotLock,
    #[error("no buffer available")]
    NoBuffer,
    #[error("region too large")]
    TooLarge,
    #[error("buffer in use")]
    BufferInUse,
    #[error("invalid region")]
    InvalidRegion,
    #[error("region not aligned")]
    NotAligned,
    #[error("unknown status {0:#06x}")]
    Other(u16),
}

impl VdsStatus {
    #[must_use]
    pub const fn from_code(ax: u16) -> Self {
        match ax {
            1 => Self::NotContiguous,
            2 => Self::CrossedBoundary,
            3 => Self::CannotLock,
            4 => Self::NoBuffer,
            5 => Self::TooLarge,
            6 => Self::BufferInUse,
            7 => Self::InvalidRegion,
            8 => Self::NotAligned,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("service not installed")]
    NotInstalled,
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid handle")]
    InvalidHandle,
    #[error("XMS error {0:#04x}")]
    Xms(u8),
    #[error("DOS error {0}")]
    Dos(u16),
    #[error("VDS: {0}")]
    Vds(VdsStatus),
    #[error("memory returned outside the service's range at {0}")]
    OutOfRange(PhysicalAddress),
}

/// Extended memory (XMS) service.
pub trait ExtendedMemory {
    fn is_available(&self) -> bool;

    /// # Errors
    /// [`ServiceError::OutOfMemory`] when no block of `kb` KiB is left.
    fn allocate(&mut self, kb: u16) -> Result<XmsHandle, ServiceError>;

    /// Pins the block and returns its linear base address.
    ///
    /// # Errors
    /// Fails for unknown handles or when the lock count overflows.
    fn lock(&mut self, handle: XmsHandle) -> Result<PhysicalAddress, ServiceError>;

    /// # Errors
    /// Fails for unknown or unlocked handles.
    fn unlock(&mut self, handle: XmsHandle) -> Result<(), ServiceError>;

    /// # Errors
    /// Fails for unknown or still locked handles.
    fn free(&mut self, handle: XmsHandle) -> Result<(), ServiceError>;

    /// # Errors
    /// Fails when the driver does not answer.
    fn query(&mut self) -> Result<XmsInfo, ServiceError>;
}

/// Upper memory block service.
pub trait UpperMemory {
    fn is_available(&self) -> bool;

    /// Returns the segment of a block of at least `paragraphs` paragraphs.
    ///
    /// A provider may answer with a segment below `A000h`; the caller treats
    /// that as a failure.
    ///
    /// # Errors
    /// [`ServiceError::OutOfMemory`] when no UMB of that size exists.
    fn allocate(&mut self, paragraphs: u16) -> Result<SegmentAddress, ServiceError>;

    /// # Errors
    /// Fails for segments that were not allocated here.
    fn free(&mut self, segment: SegmentAddress) -> Result<(), ServiceError>;
}

/// DOS conventional memory.
pub trait ConventionalMemory {
    /// # Errors
    /// [`ServiceError::OutOfMemory`] when the arena has no block that large.
    fn allocate(&mut self, paragraphs: u16) -> Result<SegmentAddress, ServiceError>;

    /// # Errors
    /// Fails for segments that were not allocated here.
    fn free(&mut self, segment: SegmentAddress) -> Result<(), ServiceError>;
}

/// Virtual DMA Services: pins a linear range and reports its physical address.
pub trait MediatedDma {
    fn is_available(&self) -> bool;

    /// # Errors
    /// [`ServiceError::Vds`] with the provider's status code.
    fn lock_region(
        &mut self,
        linear: PhysicalAddress,
        len: u32,
    ) -> Result<PhysicalDescriptor, ServiceError>;

    /// # Errors
    /// [`ServiceError::Vds`] with the provider's status code.
    fn unlock_region(&mut self, descriptor: &PhysicalDescriptor) -> Result<(), ServiceError>;
}

impl<T: ExtendedMemory + ?Sized> ExtendedMemory for &mut T {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }
    fn allocate(&mut self, kb: u16) -> Result<XmsHandle, ServiceError> {
        (**self).allocate(kb)
    }
    fn lock(&mut self, handle: XmsHandle) -> Result<PhysicalAddress, ServiceError> {
        (**self).lock(handle)
    }
    fn unlock(&mut self, handle: XmsHandle) -> Result<(), ServiceError> {
        (**self).unlock(handle)
    }
    fn free(&mut self, handle: XmsHandle) -> Result<(), ServiceError> {
        (**self).free(handle)
    }
    fn query(&mut self) -> Result<XmsInfo, ServiceError> {
        (**self).query()
    }
}

impl<T: UpperMemory + ?Sized> UpperMemory for &mut T {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }
    fn allocate(&mut self, paragraphs: u16) -> Result<SegmentAddress, ServiceError> {
        (**self).allocate(paragraphs)
    }
    fn free(&mut self, segment: SegmentAddress) -> Result<(), ServiceError> {
        (**self).free(segment)
    }
}

impl<T: ConventionalMemory + ?Sized> ConventionalMemory for &mut T {
    fn allocate(&mut self, paragraphs: u16) -> Result<SegmentAddress, ServiceError> {
        (**self).allocate(paragraphs)
    }
    fn free(&mut self, segment: SegmentAddress) -> Result<(), ServiceError> {
        (**self).free(segment)
    }
}

impl<T: MediatedDma + ?Sized> MediatedDma for &mut T {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }
    fn lock_region(
        &mut self,
        linear: PhysicalAddress,
        len: u32,
    ) -> Result<PhysicalDescriptor, ServiceError> {
        (**self).lock_region(linear, len)
    }
    fn unlock_region(&mut self, descriptor: &PhysicalDescriptor) -> Result<(), ServiceError> {
        (**self).unlock_region(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vds_codes() {
        assert_eq!(VdsStatus::from_code(2), VdsStatus::CrossedBoundary);
        assert_eq!(VdsStatus::from_code(0x10), VdsStatus::Other(0x10));
        assert_eq!(
            ServiceError::Vds(VdsStatus::NoBuffer).to_string(),
            "VDS: no buffer available"
        );
    }
}
