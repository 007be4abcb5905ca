use crate::Tier;
use pktdrv_addresses::PhysicalAddress;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AllocError {
    /// Every tier that was tried is exhausted.
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// A block header failed validation on free; the block was not touched.
    #[error("corrupted block header at {addr} (sentinel {found:#010x})")]
    Corruption { addr: PhysicalAddress, found: u32 },
    #[error("no DMA buffer met the constraints in {attempts} attempts")]
    ConstraintUnsatisfiable { attempts: u8 },
    #[error("{0} memory service unavailable")]
    ServiceUnavailable(Tier),
}

impl AllocError {
    /// Errors the tiered allocator answers by trying the next tier.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::OutOfMemory | Self::ServiceUnavailable(_))
    }
}
