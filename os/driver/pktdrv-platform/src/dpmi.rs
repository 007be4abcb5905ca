//! [`RealModeServices`] for a 32-bit DPMI client.
//!
//! Real-mode interrupts and far calls go through the DPMI host
//! (`INT 31h AX=0300h/0301h`), which switches to V86 or real mode, loads the
//! registers from a real-mode call structure and writes them back on return.

use crate::{RealModeServices, Regs};
use core::arch::asm;
use pktdrv_addresses::SegmentAddress;

const FLAG_CARRY: u16 = 1 << 0;

/// DPMI real-mode call structure.
#[repr(C, packed)]
#[derive(Copy, Clone, Default)]
struct CallStructure {
    edi: u32,
    esi: u32,
    ebp: u32,
    _reserved: u32,
    ebx: u32,
    edx: u32,
    ecx: u32,
    eax: u32,
    flags: u16,
    es: u16,
    ds: u16,
    fs: u16,
    gs: u16,
    ip: u16,
    cs: u16,
    /// `SS:SP = 0:0` lets the host supply a real-mode stack.
    sp: u16,
    ss: u16,
}

const _: () = assert!(size_of::<CallStructure>() == 0x32);

impl CallStructure {
    fn from_regs(regs: Regs) -> Self {
        Self {
            edi: u32::from(regs.di),
            esi: u32::from(regs.si),
            ebx: u32::from(regs.bx),
            edx: u32::from(regs.dx),
            ecx: u32::from(regs.cx),
            eax: u32::from(regs.ax),
            es: regs.es,
            ds: regs.ds,
            ..Self::default()
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_regs(self) -> Regs {
        Regs {
            ax: self.eax as u16,
            bx: self.ebx as u16,
            cx: self.ecx as u16,
            dx: self.edx as u16,
            si: self.esi as u16,
            di: self.edi as u16,
            ds: self.ds,
            es: self.es,
            cflag: self.flags & FLAG_CARRY != 0,
        }
    }
}

/// Real-mode services through the DPMI host.
pub struct DpmiServices {
    _private: (),
}

impl DpmiServices {
    /// # Safety
    /// The caller must be a 32-bit DPMI client whose `ES` is a flat data
    /// selector covering its own data.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }

    /// Runs DPMI function `ax` with `BL = bl` against `rmcs`. Returns `false`
    /// when the host reports failure.
    unsafe fn simulate(ax: u32, bl: u8, rmcs: &mut CallStructure) -> bool {
        let failed: u8;
        // SAFETY: the caller upholds the flat `ES` contract of `new`; EBX is
        // preserved around the call since LLVM may use it as the PIC base.
        unsafe {
            asm!(
                "push ebx",
                "movzx ebx, {bl}",
                "int 0x31",
                "pop ebx",
                "setc {failed}",
                bl = in(reg_byte) bl,
                failed = out(reg_byte) failed,
                inout("eax") ax => _,
                inout("ecx") 0u32 => _,
                in("edi") core::ptr::from_mut(rmcs),
            );
        }
        failed == 0
    }

    fn call(&mut self, ax: u32, bl: u8, mut rmcs: CallStructure) -> Regs {
        // SAFETY: see `new`.
        let ok = unsafe { Self::simulate(ax, bl, &mut rmcs) };
        if ok {
            rmcs.to_regs()
        } else {
            Regs {
                cflag: true,
                ..Regs::with_ax(0xFFFF)
            }
        }
    }
}

impl RealModeServices for DpmiServices {
    fn int86(&mut self, vector: u8, regs: Regs) -> Regs {
        self.call(0x0300, vector, CallStructure::from_regs(regs))
    }

    fn far_call(&mut self, entry: SegmentAddress, regs: Regs) -> Regs {
        let rmcs = CallStructure {
            cs: entry.segment,
            ip: entry.offset,
            ..CallStructure::from_regs(regs)
        };
        self.call(0x0301, 0, rmcs)
    }

    fn vector(&mut self, vector: u8) -> SegmentAddress {
        let segment: u16;
        let offset: u16;
        // SAFETY: `INT 31h AX=0200h` only reads the real-mode vector table.
        unsafe {
            asm!(
                "push ebx",
                "movzx ebx, {v}",
                "int 0x31",
                "pop ebx",
                v = in(reg_byte) vector,
                inout("eax") 0x0200u32 => _,
                out("cx") segment,
                out("dx") offset,
            );
        }
        SegmentAddress::new(segment, offset)
    }
}
