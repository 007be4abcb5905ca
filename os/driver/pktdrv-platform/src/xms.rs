//! XMS driver client: extended memory blocks and upper memory blocks.

use crate::services::{ExtendedMemory, ServiceError, UpperMemory, XmsHandle, XmsInfo};
use crate::{RealModeServices, Regs, detect};
use log::{debug, warn};
use pktdrv_addresses::{PhysicalAddress, SegmentAddress};

const FN_GET_VERSION: u8 = 0x00;
const FN_QUERY_FREE: u8 = 0x08;
const FN_ALLOCATE: u8 = 0x09;
const FN_FREE: u8 = 0x0A;
const FN_LOCK: u8 = 0x0C;
const FN_UNLOCK: u8 = 0x0D;
const FN_REQUEST_UMB: u8 = 0x10;
const FN_RELEASE_UMB: u8 = 0x11;

const ERR_NOT_IMPLEMENTED: u8 = 0x80;
const ERR_ALL_ALLOCATED: u8 = 0xA0;
const ERR_NO_HANDLES: u8 = 0xA1;
const ERR_INVALID_HANDLE: u8 = 0xA2;
const ERR_SMALLER_UMB: u8 = 0xB0;
const ERR_NO_UMB: u8 = 0xB1;

/// Maps an XMS error code (`BL`) onto the service taxonomy.
const fn map_error(bl: u8) -> ServiceError {
    match bl {
        ERR_NOT_IMPLEMENTED => ServiceError::NotInstalled,
        ERR_ALL_ALLOCATED | ERR_NO_HANDLES | ERR_SMALLER_UMB | ERR_NO_UMB => {
            ServiceError::OutOfMemory
        }
        ERR_INVALID_HANDLE => ServiceError::InvalidHandle,
        other => ServiceError::Xms(other),
    }
}

/// Client for the XMS driver entry point (HIMEM.SYS, EMM386, QEMM).
pub struct XmsDriver<R> {
    rm: R,
    entry: Option<SegmentAddress>,
    /// BCD, e.g. `0x0300`.
    version: u16,
    /// Cleared once the driver says it has no UMB support at all.
    umb_usable: bool,
}

impl<R: RealModeServices> XmsDriver<R> {
    /// Locates the driver. Versions below 2.00 are treated as absent.
    pub fn open(rm: R) -> Self {
        let mut driver = Self {
            rm,
            entry: None,
            version: 0,
            umb_usable: false,
        };
        let Some(entry) = detect::xms_entry(&mut driver.rm) else {
            debug!("no XMS driver");
            return driver;
        };

        let version = driver.rm.far_call(entry, Regs::with_ah(FN_GET_VERSION)).ax;
        if version < 0x0200 {
            warn!("XMS version {version:04X} too old, need 2.00");
            return driver;
        }

        debug!("XMS {}.{:02X} at {entry}", version >> 8, version & 0xFF);
        driver.entry = Some(entry);
        driver.version = version;
        driver.umb_usable = true;
        driver
    }

    #[must_use]
    pub const fn version(&self) -> u16 {
        self.version
    }

    /// Calls function `regs.ah`; `AX = 1` means success, `BL` carries errors.
    fn call(&mut self, regs: Regs) -> Result<Regs, ServiceError> {
        let entry = self.entry.ok_or(ServiceError::NotInstalled)?;
        let out = self.rm.far_call(entry, regs);
        if out.ax == 1 {
            Ok(out)
        } else {
            Err(map_error(out.bl()))
        }
    }
}

impl<R: RealModeServices> ExtendedMemory for XmsDriver<R> {
    fn is_available(&self) -> bool {
        self.entry.is_some()
    }

    fn allocate(&mut self, kb: u16) -> Result<XmsHandle, ServiceError> {
        let out = self.call(Regs::with_ah(FN_ALLOCATE).dx(kb))?;
        Ok(XmsHandle(out.dx))
    }

    fn lock(&mut self, handle: XmsHandle) -> Result<PhysicalAddress, ServiceError> {
        let out = self.call(Regs::with_ah(FN_LOCK).dx(handle.0))?;
        Ok(PhysicalAddress::new(out.dx_bx()))
    }

    fn unlock(&mut self, handle: XmsHandle) -> Result<(), ServiceError> {
        self.call(Regs::with_ah(FN_UNLOCK).dx(handle.0)).map(|_| ())
    }

    fn free(&mut self, handle: XmsHandle) -> Result<(), ServiceError> {
        self.call(Regs::with_ah(FN_FREE).dx(handle.0)).map(|_| ())
    }

    /// XMS 2 reports only free memory, so `total_kb` is the free total at the
    /// time of the query.
    fn query(&mut self) -> Result<XmsInfo, ServiceError> {
        let entry = self.entry.ok_or(ServiceError::NotInstalled)?;
        let out = self.rm.far_call(entry, Regs::with_ah(FN_QUERY_FREE));
        if out.ax == 0 && out.bl() != ERR_ALL_ALLOCATED && out.bl() != 0 {
            return Err(map_error(out.bl()));
        }
        Ok(XmsInfo {
            total_kb: u32::from(out.dx),
            free_kb: u32::from(out.dx),
            largest_block_kb: u32::from(out.ax),
        })
    }
}

impl<R: RealModeServices> UpperMemory for XmsDriver<R> {
    fn is_available(&self) -> bool {
        self.entry.is_some() && self.umb_usable
    }

    fn allocate(&mut self, paragraphs: u16) -> Result<SegmentAddress, ServiceError> {
        match self.call(Regs::with_ah(FN_REQUEST_UMB).dx(paragraphs)) {
            Ok(out) => Ok(SegmentAddress::from_segment(out.bx)),
            Err(ServiceError::NotInstalled) => {
                debug!("XMS driver has no UMB support");
                self.umb_usable = false;
                Err(ServiceError::NotInstalled)
            }
            Err(e) => Err(e),
        }
    }

    fn free(&mut self, segment: SegmentAddress) -> Result<(), ServiceError> {
        self.call(Regs::with_ah(FN_RELEASE_UMB).dx(segment.segment))
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY: SegmentAddress = SegmentAddress::new(0xC900, 0x0020);

    /// Minimal HIMEM: one 64 KiB block at 1 MiB + 64 KiB.
    #[derive(Default)]
    struct Himem {
        version: u16,
        allocated: Option<u16>,
        locks: u32,
        no_umbs: bool,
    }

    impl RealModeServices for Himem {
        fn int86(&mut self, vector: u8, regs: Regs) -> Regs {
            assert_eq!(vector, 0x2F);
            match regs.ax {
                0x4300 => Regs::with_ax(0x4380),
                0x4310 => Regs {
                    es: ENTRY.segment,
                    ..Regs::with_ax(0x4310).bx(ENTRY.offset)
                },
                _ => regs,
            }
        }

        fn far_call(&mut self, entry: SegmentAddress, regs: Regs) -> Regs {
            assert_eq!(entry, ENTRY);
            let fail = |bl: u8| Regs::with_ax(0).bx(u16::from(bl));
            match regs.ah() {
                FN_GET_VERSION => Regs::with_ax(self.version),
                FN_QUERY_FREE => {
                    if self.allocated.is_some() {
                        Regs::with_ax(0).bx(u16::from(ERR_ALL_ALLOCATED))
                    } else {
                        Regs::with_ax(64).dx(64)
                    }
                }
                FN_ALLOCATE if self.allocated.is_none() && regs.dx <= 64 => {
                    self.allocated = Some(7);
                    Regs::with_ax(1).dx(7)
                }
                FN_ALLOCATE => fail(ERR_ALL_ALLOCATED),
                FN_LOCK if Some(regs.dx) == self.allocated => {
                    self.locks += 1;
                    Regs::with_ax(1).dx(0x0011).bx(0x0000)
                }
                FN_UNLOCK if Some(regs.dx) == self.allocated && self.locks > 0 => {
                    self.locks -= 1;
                    Regs::with_ax(1)
                }
                FN_FREE if Some(regs.dx) == self.allocated && self.locks == 0 => {
                    self.allocated = None;
                    Regs::with_ax(1)
                }
                FN_LOCK | FN_UNLOCK | FN_FREE => fail(ERR_INVALID_HANDLE),
                FN_REQUEST_UMB if self.no_umbs => fail(ERR_NOT_IMPLEMENTED),
                FN_REQUEST_UMB => Regs::with_ax(1).bx(0xD000).dx(regs.dx),
                FN_RELEASE_UMB => Regs::with_ax(1),
                _ => fail(ERR_NOT_IMPLEMENTED),
            }
        }

        fn vector(&mut self, _vector: u8) -> SegmentAddress {
            SegmentAddress::default()
        }
    }

    fn himem() -> Himem {
        Himem {
            version: 0x0300,
            ..Himem::default()
        }
    }

    #[test]
    fn block_lifecycle() {
        let mut xms = XmsDriver::open(himem());
        assert!(ExtendedMemory::is_available(&xms));
        assert_eq!(xms.version(), 0x0300);

        let info = xms.query().unwrap();
        assert_eq!(info.largest_block_kb, 64);

        let h = ExtendedMemory::allocate(&mut xms, 64).unwrap();
        assert_eq!(ExtendedMemory::allocate(&mut xms, 1), Err(ServiceError::OutOfMemory));
        assert_eq!(xms.lock(h), Ok(PhysicalAddress::new(0x0011_0000)));
        assert_eq!(ExtendedMemory::free(&mut xms, h), Err(ServiceError::InvalidHandle), "locked");
        xms.unlock(h).unwrap();
        ExtendedMemory::free(&mut xms, h).unwrap();
        assert_eq!(xms.lock(h), Err(ServiceError::InvalidHandle));
    }

    #[test]
    fn exhausted_query_reports_zero() {
        let mut xms = XmsDriver::open(himem());
        let _h = ExtendedMemory::allocate(&mut xms, 16).unwrap();
        assert_eq!(xms.query().unwrap().free_kb, 0);
    }

    #[test]
    fn old_driver_is_ignored() {
        let mut xms = XmsDriver::open(Himem {
            version: 0x0100,
            ..Himem::default()
        });
        assert!(!ExtendedMemory::is_available(&xms));
        assert_eq!(ExtendedMemory::allocate(&mut xms, 1), Err(ServiceError::NotInstalled));
    }

    #[test]
    fn umb_support_turns_off_after_not_implemented() {
        let mut xms = XmsDriver::open(Himem {
            no_umbs: true,
            ..himem()
        });
        assert!(UpperMemory::is_available(&xms));
        assert_eq!(
            UpperMemory::allocate(&mut xms, 4),
            Err(ServiceError::NotInstalled)
        );
        assert!(!UpperMemory::is_available(&xms));

        let mut with_umbs = XmsDriver::open(himem());
        let seg = UpperMemory::allocate(&mut with_umbs, 4).unwrap();
        assert_eq!(seg, SegmentAddress::from_segment(0xD000));
        UpperMemory::free(&mut with_umbs, seg).unwrap();
    }
}
