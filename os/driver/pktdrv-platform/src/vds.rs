//! Virtual DMA Services client (`INT 4Bh`).
//!
//! A VDS provider knows where the pages behind a linear address really are.
//! Locking a region pins it and returns the physical address the device must
//! be programmed with; unlocking releases the pin.
//!
//! Requests pass a DMA descriptor structure (DDS) by `ES:DI`, so the driver
//! needs a small scratch area the provider can address in real mode.

use crate::services::{MediatedDma, PhysicalDescriptor, ServiceError, VdsStatus};
use crate::{PhysMapper, RealModeServices, Regs, detect};
use log::{debug, warn};
use pktdrv_addresses::{PhysicalAddress, SegmentAddress};

const INT_VDS: u8 = 0x4B;
const FN_LOCK_REGION: u16 = 0x8103;
const FN_UNLOCK_REGION: u16 = 0x8104;

/// Lock flags (`DX`): never substitute a bounce buffer. The caller either gets
/// its own pages pinned or an error.
const LOCK_NO_BUFFER: u16 = 1 << 2;

/// DMA descriptor structure, as laid out in memory.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default)]
pub struct Dds {
    pub size: u32,
    pub offset: u32,
    pub segment: u16,
    pub buffer_id: u16,
    pub physical: u32,
}

/// Bytes of real-mode addressable scratch the driver needs.
pub const DDS_SIZE: usize = size_of::<Dds>();

pub struct VdsDriver<R, M> {
    rm: R,
    mapper: M,
    scratch: SegmentAddress,
    available: bool,
}

impl<R: RealModeServices, M: PhysMapper> VdsDriver<R, M> {
    /// Detects the provider and binds the driver to its DDS scratch area.
    ///
    /// # Safety
    /// `scratch` must point at [`DDS_SIZE`] bytes of conventional memory that
    /// nothing else uses for the lifetime of the driver, and `mapper` must map
    /// it.
    pub unsafe fn new(mut rm: R, mapper: M, scratch: SegmentAddress) -> Self {
        let available = detect::vds_present(&mut rm);
        Self {
            rm,
            mapper,
            scratch,
            available,
        }
    }

    fn dds_ptr(&self) -> *mut Dds {
        self.mapper.linear_to_ptr(self.scratch.linear()).cast::<Dds>()
    }

    fn call(&mut self, ax: u16, dds: Dds, flags: u16) -> Result<Dds, VdsStatus> {
        let ptr = self.dds_ptr();
        // SAFETY: the scratch area is exclusively ours (see `new`); Dds is
        // packed, so unaligned access is the only valid kind.
        unsafe { ptr.write_unaligned(dds) };

        let out = self
            .rm
            .int86(INT_VDS, Regs::with_ax(ax).dx(flags).es_di(self.scratch));

        // SAFETY: as above.
        let result = unsafe { ptr.read_unaligned() };
        if out.cflag {
            Err(VdsStatus::from_code(out.ax))
        } else {
            Ok(result)
        }
    }
}

impl<R: RealModeServices, M: PhysMapper> MediatedDma for VdsDriver<R, M> {
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

        let request = Dds {
            size: len,
            offset: linear.as_u32(),
            ..Dds::default()
        };
        let dds = self
            .call(FN_LOCK_REGION, request, LOCK_NO_BUFFER)
            .map_err(|status| {
                debug!("VDS lock {linear} +{len:#x} failed: {status}");
                ServiceError::Vds(status)
            })?;

        let descriptor = PhysicalDescriptor {
            linear,
            physical: PhysicalAddress::new(dds.physical),
            len,
            buffer_id: dds.buffer_id,
        };
        if dds.size < len {
            warn!("VDS locked only {:#x} of {len:#x} bytes", { dds.size });
            let _ = self.unlock_region(&descriptor);
            return Err(ServiceError::Vds(VdsStatus::NotContiguous));
        }
        Ok(descriptor)
    }

    fn unlock_region(&mut self, descriptor: &PhysicalDescriptor) -> Result<(), ServiceError> {
        if !self.available {
            return Err(ServiceError::NotInstalled);
        }

        let request = Dds {
            size: descriptor.len,
            offset: descriptor.linear.as_u32(),
            segment: 0,
            buffer_id: descriptor.buffer_id,
            physical: descriptor.physical.as_u32(),
        };
        self.call(FN_UNLOCK_REGION, request, 0)
            .map(|_| ())
            .map_err(ServiceError::Vds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOW_MEMORY: usize = 0x1000;
    const SCRATCH: SegmentAddress = SegmentAddress::new(0x0080, 0x0000);
    const REMAP: u32 = 0x0020_0000;

    #[derive(Copy, Clone)]
    struct LowMapper(*mut u8);

    impl PhysMapper for LowMapper {
        fn linear_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
            assert!(pa.as_usize() < LOW_MEMORY);
            self.0.wrapping_add(pa.as_usize())
        }
    }

    /// Provider that pins regions up to 64 KiB at `linear + REMAP`.
    struct Provider {
        memory: LowMapper,
        locked: u32,
        last_flags: u16,
    }

    impl Provider {
        fn dds(&self, regs: Regs) -> *mut Dds {
            let at = SegmentAddress::new(regs.es, regs.di);
            self.memory.linear_to_ptr(at.linear()).cast()
        }
    }

    impl RealModeServices for Provider {
        fn int86(&mut self, vector: u8, regs: Regs) -> Regs {
            assert_eq!(vector, INT_VDS);
            let fail = |code| Regs {
                cflag: true,
                ..Regs::with_ax(code)
            };
            match regs.ax {
                detect::VDS_GET_VERSION => Regs::with_ax(0x0100),
                FN_LOCK_REGION => {
                    self.last_flags = regs.dx;
                    let ptr = self.dds(regs);
                    let mut dds = unsafe { ptr.read_unaligned() };
                    if dds.size > 0x1_0000 {
                        return fail(5);
                    }
                    dds.physical = dds.offset + REMAP;
                    unsafe { ptr.write_unaligned(dds) };
                    self.locked += 1;
                    regs
                }
                FN_UNLOCK_REGION => {
                    let dds = unsafe { self.dds(regs).read_unaligned() };
                    if self.locked == 0 || dds.physical != dds.offset + REMAP {
                        return fail(7);
                    }
                    self.locked -= 1;
                    regs
                }
                _ => fail(0x0F),
            }
        }

        fn far_call(&mut self, _entry: SegmentAddress, regs: Regs) -> Regs {
            regs
        }

        fn vector(&mut self, vector: u8) -> SegmentAddress {
            assert_eq!(vector, INT_VDS);
            SegmentAddress::new(0xC000, 0x0100)
        }
    }

    fn driver() -> VdsDriver<Provider, LowMapper> {
        let memory = LowMapper(Box::leak(vec![0u8; LOW_MEMORY].into_boxed_slice()).as_mut_ptr());
        let provider = Provider {
            memory,
            locked: 0,
            last_flags: 0,
        };
        unsafe { VdsDriver::new(provider, memory, SCRATCH) }
    }

    #[test]
    fn dds_is_sixteen_bytes() {
        assert_eq!(DDS_SIZE, 16);
    }

    #[test]
    fn lock_reports_provider_address() {
        let mut vds = driver();
        assert!(vds.is_available());

        let linear = PhysicalAddress::new(0x0012_0000);
        let d = vds.lock_region(linear, 0x800).unwrap();
        assert_eq!(d.linear, linear);
        assert_eq!(d.physical, PhysicalAddress::new(0x0032_0000));
        assert_eq!(d.len, 0x800);
        assert!(!d.is_remapped());
        assert_eq!(vds.rm.last_flags, LOCK_NO_BUFFER);
        assert_eq!(vds.rm.locked, 1);

        vds.unlock_region(&d).unwrap();
        assert_eq!(vds.rm.locked, 0);
        assert_eq!(
            vds.unlock_region(&d),
            Err(ServiceError::Vds(VdsStatus::InvalidRegion))
        );
    }

    #[test]
    fn provider_status_is_mapped() {
        let mut vds = driver();
        assert_eq!(
            vds.lock_region(PhysicalAddress::new(0x0012_0000), 0x2_0000),
            Err(ServiceError::Vds(VdsStatus::TooLarge))
        );
        assert_eq!(vds.rm.locked, 0);
    }
}
