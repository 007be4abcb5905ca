//! Individual environment detectors.
//!
//! Each function issues read-only queries and answers a single yes/no (or
//! version) question. None of them changes state in the queried service.

use crate::{DosVersion, RealModeServices, Regs};
use log::debug;
use pktdrv_addresses::SegmentAddress;

const INT_DOS: u8 = 0x21;
const INT_MULTIPLEX: u8 = 0x2F;
const INT_VDS: u8 = 0x4B;
const INT_EMS: u8 = 0x67;

/// VDS "get version" (`INT 4Bh AX=8102h`).
pub const VDS_GET_VERSION: u16 = 0x8102;

/// A provider answers `INT 4Bh` with carry clear.
///
/// The vector is checked first: calling through `0000:0000` would jump into
/// the interrupt table itself.
pub fn vds_present<R: RealModeServices>(rm: &mut R) -> bool {
    let vector = rm.vector(INT_VDS);
    let linear = vector.linear().as_u32();
    if linear == 0 || vector == SegmentAddress::new(0xFFFF, 0xFFFF) {
        debug!("INT 4Bh vector is {vector}; VDS not installed");
        return false;
    }

    let out = rm.int86(INT_VDS, Regs::with_ax(VDS_GET_VERSION));
    if out.cflag {
        debug!("VDS version query failed (AX={:04X})", out.ax);
        return false;
    }
    debug!("VDS {}.{} present", out.ah(), out.al());
    true
}

/// VCPI server: `INT 67h AX=DE00h` returns `AH = 0`.
///
/// VCPI only exists on top of an EMS driver, so the `INT 67h` vector must be
/// set before calling it.
pub fn vcpi_present<R: RealModeServices>(rm: &mut R) -> bool {
    if rm.vector(INT_EMS).linear().as_u32() == 0 {
        return false;
    }
    let out = rm.int86(INT_EMS, Regs::with_ax(0xDE00));
    out.ah() == 0
}

/// Windows enhanced mode.
///
/// `INT 2Fh AX=160Ah` (Windows 3.1+) changes `AX` to 0 and reports the mode
/// in `CX` (3 = enhanced). Older versions only answer `INT 2Fh AX=1600h` with
/// `AL` holding the major version; `00h` and `80h` mean "not running", `01h`
/// and `FFh` mean Windows/386 2.x.
pub fn windows_enhanced<R: RealModeServices>(rm: &mut R) -> bool {
    let out = rm.int86(INT_MULTIPLEX, Regs::with_ax(0x160A));
    if out.ax == 0 {
        return out.cx == 3;
    }

    let out = rm.int86(INT_MULTIPLEX, Regs::with_ax(0x1600));
    matches!(out.al(), 0x03..=0x7F | 0x81..=0xFE)
}

/// EMM386: the GEMMIS installation check `INT 2Fh AX=4A11h BX=0` answers
/// `AL = FFh`, or an EMS driver reports status OK on `INT 67h AH=40h`.
pub fn emm386_present<R: RealModeServices>(rm: &mut R) -> bool {
    let out = rm.int86(INT_MULTIPLEX, Regs::with_ax(0x4A11).bx(0));
    if out.al() == 0xFF {
        return true;
    }
    if rm.vector(INT_EMS).linear().as_u32() == 0 {
        return false;
    }
    let out = rm.int86(INT_EMS, Regs::with_ah(0x40));
    out.ah() == 0
}

/// QEMM-386: `INT 2Fh AX=D201h BX=5145h CX=4D4Dh DX=3432h` ("QEMM4") is
/// answered by changing the signature registers.
pub fn qemm_present<R: RealModeServices>(rm: &mut R) -> bool {
    let query = Regs::with_ax(0xD201).bx(0x5145).cx(0x4D4D).dx(0x3432);
    let out = rm.int86(INT_MULTIPLEX, query);
    out.bx != query.bx || out.cx != query.cx || out.dx != query.dx
}

/// XMS driver: `INT 2Fh AX=4300h` returns `AL = 80h`.
pub fn xms_present<R: RealModeServices>(rm: &mut R) -> bool {
    rm.int86(INT_MULTIPLEX, Regs::with_ax(0x4300)).al() == 0x80
}

/// XMS driver entry point from `INT 2Fh AX=4310h` (`ES:BX`).
pub fn xms_entry<R: RealModeServices>(rm: &mut R) -> Option<SegmentAddress> {
    if !xms_present(rm) {
        return None;
    }
    let out = rm.int86(INT_MULTIPLEX, Regs::with_ax(0x4310));
    let entry = SegmentAddress::new(out.es, out.bx);
    if entry.linear().as_u32() == 0 {
        None
    } else {
        Some(entry)
    }
}

/// `INT 21h AH=30h`: `AL` major, `AH` minor. DOS 1.x returns `AL = 0`.
pub fn dos_version<R: RealModeServices>(rm: &mut R) -> DosVersion {
    let out = rm.int86(INT_DOS, Regs::with_ah(0x30));
    match out.al() {
        0 => DosVersion::new(1, 0),
        major => DosVersion::new(major, out.ah()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Answers `(vector, AX)` pairs from a table; everything else echoes.
    #[derive(Default)]
    struct Table {
        answers: HashMap<(u8, u16), Regs>,
        vectors: HashMap<u8, SegmentAddress>,
        calls: Vec<(u8, u16)>,
    }

    impl Table {
        fn answer(mut self, vector: u8, ax: u16, out: Regs) -> Self {
            self.answers.insert((vector, ax), out);
            self
        }

        fn hook(mut self, vector: u8) -> Self {
            self.vectors.insert(vector, SegmentAddress::new(0xC800, 0x0010));
            self
        }
    }

    impl RealModeServices for Table {
        fn int86(&mut self, vector: u8, regs: Regs) -> Regs {
            self.calls.push((vector, regs.ax));
            self.answers.get(&(vector, regs.ax)).copied().unwrap_or(regs)
        }

        fn far_call(&mut self, _entry: SegmentAddress, regs: Regs) -> Regs {
            regs
        }

        fn vector(&mut self, vector: u8) -> SegmentAddress {
            self.vectors.get(&vector).copied().unwrap_or_default()
        }
    }

    #[test]
    fn vds_needs_vector_and_clear_carry() {
        let mut none = Table::default();
        assert!(!vds_present(&mut none));
        assert!(none.calls.is_empty(), "must not call through a null vector");

        let mut failing = Table::default().hook(INT_VDS).answer(
            INT_VDS,
            VDS_GET_VERSION,
            Regs {
                cflag: true,
                ..Regs::with_ax(0x0F)
            },
        );
        assert!(!vds_present(&mut failing));

        let mut ok = Table::default()
            .hook(INT_VDS)
            .answer(INT_VDS, VDS_GET_VERSION, Regs::with_ax(0x0100));
        assert!(vds_present(&mut ok));
    }

    #[test]
    fn windows_new_and_old_checks() {
        let mut win31 = Table::default().answer(INT_MULTIPLEX, 0x160A, Regs::with_ax(0).cx(3));
        assert!(windows_enhanced(&mut win31));

        let mut standard = Table::default().answer(INT_MULTIPLEX, 0x160A, Regs::with_ax(0).cx(2));
        assert!(!windows_enhanced(&mut standard));

        let mut win30 = Table::default().answer(INT_MULTIPLEX, 0x1600, Regs::with_ax(0x0003));
        assert!(windows_enhanced(&mut win30));

        let mut absent = Table::default().answer(INT_MULTIPLEX, 0x1600, Regs::with_ax(0x0080));
        assert!(!windows_enhanced(&mut absent));

        let mut winx = Table::default().answer(INT_MULTIPLEX, 0x1600, Regs::with_ax(0x00FF));
        assert!(!windows_enhanced(&mut winx));
    }

    #[test]
    fn vcpi_requires_ems_vector() {
        let mut no_ems = Table::default().answer(INT_EMS, 0xDE00, Regs::with_ax(0x0000));
        assert!(!vcpi_present(&mut no_ems));

        let mut vcpi = Table::default()
            .hook(INT_EMS)
            .answer(INT_EMS, 0xDE00, Regs::with_ax(0x0000));
        assert!(vcpi_present(&mut vcpi));

        let mut ems_only = Table::default()
            .hook(INT_EMS)
            .answer(INT_EMS, 0xDE00, Regs::with_ax(0x8400));
        assert!(!vcpi_present(&mut ems_only));
    }

    #[test]
    fn emm386_via_gemmis_or_ems_status() {
        let mut gemmis = Table::default().answer(INT_MULTIPLEX, 0x4A11, Regs::with_ax(0x00FF));
        assert!(emm386_present(&mut gemmis));

        let mut ems = Table::default()
            .hook(INT_EMS)
            .answer(INT_EMS, 0x4000, Regs::with_ax(0x0000));
        assert!(emm386_present(&mut ems));

        let mut neither = Table::default()
            .hook(INT_EMS)
            .answer(INT_EMS, 0x4000, Regs::with_ax(0x8000));
        assert!(!emm386_present(&mut neither));
    }

    #[test]
    fn qemm_signature_changes() {
        let mut absent = Table::default();
        assert!(!qemm_present(&mut absent));

        let mut qemm = Table::default().answer(
            INT_MULTIPLEX,
            0xD201,
            Regs::with_ax(0xD201).bx(0x4F4B).cx(0x4D4D).dx(0x3432),
        );
        assert!(qemm_present(&mut qemm));
    }

    #[test]
    fn xms_and_dos_version() {
        let mut xms = Table::default()
            .answer(INT_MULTIPLEX, 0x4300, Regs::with_ax(0x4380))
            .answer(
                INT_MULTIPLEX,
                0x4310,
                Regs {
                    es: 0xC900,
                    ..Regs::with_ax(0x4310).bx(0x0020)
                },
            );
        assert!(xms_present(&mut xms));
        assert_eq!(xms_entry(&mut xms), Some(SegmentAddress::new(0xC900, 0x0020)));

        let mut dos = Table::default().answer(INT_DOS, 0x3000, Regs::with_ax(0x1606));
        assert_eq!(dos_version(&mut dos), DosVersion::new(6, 22));

        let mut dos1 = Table::default().answer(INT_DOS, 0x3000, Regs::with_ax(0));
        assert_eq!(dos_version(&mut dos1), DosVersion::new(1, 0));
    }
}
