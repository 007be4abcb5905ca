//! DOS memory arena (`INT 21h AH=48h/49h`).

use crate::services::{ConventionalMemory, ServiceError};
use crate::{RealModeServices, Regs};
use log::trace;
use pktdrv_addresses::SegmentAddress;

const INT_DOS: u8 = 0x21;
const FN_ALLOCATE: u8 = 0x48;
const FN_FREE: u8 = 0x49;

const ERR_INSUFFICIENT_MEMORY: u16 = 8;
const ERR_INVALID_BLOCK: u16 = 9;

const fn map_error(ax: u16) -> ServiceError {
    match ax {
        ERR_INSUFFICIENT_MEMORY => ServiceError::OutOfMemory,
        ERR_INVALID_BLOCK => ServiceError::InvalidHandle,
        other => ServiceError::Dos(other),
    }
}

/// Conventional memory from the DOS memory control block chain.
pub struct DosMemory<R> {
    rm: R,
}

impl<R: RealModeServices> DosMemory<R> {
    pub const fn new(rm: R) -> Self {
        Self { rm }
    }

    pub fn into_inner(self) -> R {
        self.rm
    }
}

impl<R: RealModeServices> ConventionalMemory for DosMemory<R> {
    fn allocate(&mut self, paragraphs: u16) -> Result<SegmentAddress, ServiceError> {
        let out = self
            .rm
            .int86(INT_DOS, Regs::with_ah(FN_ALLOCATE).bx(paragraphs));
        if out.cflag {
            trace!("DOS allocate {paragraphs} paragraphs failed: {}, largest {}", out.ax, out.bx);
            return Err(map_error(out.ax));
        }
        Ok(SegmentAddress::from_segment(out.ax))
    }

    fn free(&mut self, segment: SegmentAddress) -> Result<(), ServiceError> {
        let regs = Regs {
            es: segment.segment,
            ..Regs::with_ah(FN_FREE)
        };
        let out = self.rm.int86(INT_DOS, regs);
        if out.cflag {
            Err(map_error(out.ax))
        } else {
            Ok(())
        }
    }
}
