use pktdrv_addresses::SegmentAddress;

/// Real-mode register image passed to and returned from a service call.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Regs {
    pub ax: u16,
    pub bx: u16,
    pub cx: u16,
    pub dx: u16,
    pub si: u16,
    pub di: u16,
    pub ds: u16,
    pub es: u16,
    /// Carry flag on return; most DOS and VDS services signal failure here.
    pub cflag: bool,
}

impl Regs {
    #[inline]
    #[must_use]
    pub const fn with_ax(ax: u16) -> Self {
        Self {
            ax,
            bx: 0,
            cx: 0,
            dx: 0,
            si: 0,
            di: 0,
            ds: 0,
            es: 0,
            cflag: false,
        }
    }

    /// Register image for a service selected by `AH` with `AL = 0`.
    #[inline]
    #[must_use]
    pub const fn with_ah(ah: u8) -> Self {
        Self::with_ax((ah as u16) << 8)
    }

    #[inline]
    #[must_use]
    pub const fn bx(mut self, bx: u16) -> Self {
        self.bx = bx;
        self
    }

    #[inline]
    #[must_use]
    pub const fn cx(mut self, cx: u16) -> Self {
        self.cx = cx;
        self
    }

    #[inline]
    #[must_use]
    pub const fn dx(mut self, dx: u16) -> Self {
        self.dx = dx;
        self
    }

    #[inline]
    #[must_use]
    pub const fn es_di(mut self, at: SegmentAddress) -> Self {
        self.es = at.segment;
        self.di = at.offset;
        self
    }

    #[inline]
    #[must_use]
    pub const fn ah(&self) -> u8 {
        self.ax.to_be_bytes()[0]
    }

    #[inline]
    #[must_use]
    pub const fn al(&self) -> u8 {
        self.ax.to_le_bytes()[0]
    }

    #[inline]
    #[must_use]
    pub const fn bl(&self) -> u8 {
        self.bx.to_le_bytes()[0]
    }

    /// `DX:BX` as one 32-bit value (XMS lock result).
    #[inline]
    #[must_use]
    pub const fn dx_bx(&self) -> u32 {
        ((self.dx as u32) << 16) | self.bx as u32
    }
}

/// Access to real-mode software interrupts and driver entry points.
///
/// Implemented over DPMI for protected-mode builds, and by scripted doubles in
/// tests. Implementations never interpret the registers; decoding lives with
/// the callers.
pub trait RealModeServices {
    /// Issues `INT vector` with `regs` and returns the resulting registers.
    fn int86(&mut self, vector: u8, regs: Regs) -> Regs;

    /// Far-calls a real-mode entry point (the XMS driver) with `regs`.
    fn far_call(&mut self, entry: SegmentAddress, regs: Regs) -> Regs;

    /// Reads an interrupt vector table entry.
    fn vector(&mut self, vector: u8) -> SegmentAddress;
}

impl<T: RealModeServices + ?Sized> RealModeServices for &mut T {
    fn int86(&mut self, vector: u8, regs: Regs) -> Regs {
        (**self).int86(vector, regs)
    }

    fn far_call(&mut self, entry: SegmentAddress, regs: Regs) -> Regs {
        (**self).far_call(entry, regs)
    }

    fn vector(&mut self, vector: u8) -> SegmentAddress {
        (**self).vector(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_halves() {
        let r = Regs::with_ax(0x1603).bx(0x00B1);
        assert_eq!(r.ah(), 0x16);
        assert_eq!(r.al(), 0x03);
        assert_eq!(r.bl(), 0xB1);
        assert_eq!(Regs::with_ah(0x30).ax, 0x3000);
    }

    #[test]
    fn xms_linear_pair() {
        let r = Regs::default().dx(0x0012).bx(0x3400);
        assert_eq!(r.dx_bx(), 0x0012_3400);
    }
}
