//! Tier selection on top of the three pools.

use crate::{
    AllocError,
    backing::{ConventionalBacking, ExtendedBacking, UpperBacking},
    header::{AllocFlags, BlockKind},
    pool::{LeakReport, Pool, PoolStats},
};
use core::fmt;
use core::ptr::NonNull;
use log::{debug, info, warn};
use pktdrv_addresses::PhysicalAddress;
use pktdrv_platform::{ConventionalMemory, ExtendedMemory, PhysMapper, UpperMemory};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Tier {
    /// XMS, above 1 MiB.
    Extended,
    /// UMBs between 640 KiB and 1 MiB.
    Upper,
    /// DOS memory below 640 KiB.
    Conventional,
}

impl Tier {
    pub const ALL: [Self; 3] = [Self::Extended, Self::Upper, Self::Conventional];

    /// Letter used in `TIER=` configuration values.
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Extended => 'X',
            Self::Upper => 'U',
            Self::Conventional => 'C',
        }
    }

    #[must_use]
    pub const fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'X' => Some(Self::Extended),
            'U' => Some(Self::Upper),
            'C' => Some(Self::Conventional),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extended => "extended",
            Self::Upper => "upper",
            Self::Conventional => "conventional",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TierOrderError {
    #[error("no tier given")]
    Empty,
    #[error("unknown tier {0:?}")]
    UnknownTier(char),
    #[error("{0} tier listed twice")]
    Duplicate(Tier),
}

/// Order in which tiers are tried. Tiers left out are never used.
#[derive(Debug, Copy, Clone)]
pub struct TierOrder {
    tiers: [Tier; 3],
    len: u8,
}

/// Only the listed tiers count; slots past `len` are leftovers.
impl PartialEq for TierOrder {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for TierOrder {}

impl Default for TierOrder {
    /// Extended, then upper, then conventional.
    fn default() -> Self {
        Self {
            tiers: Tier::ALL,
            len: 3,
        }
    }
}

impl TierOrder {
    /// An order of `tier` alone.
    #[must_use]
    pub const fn only(tier: Tier) -> Self {
        Self {
            tiers: [tier; 3],
            len: 1,
        }
    }

    /// Parses a string of tier letters such as `"XUC"` or `"uc"`.
    ///
    /// # Errors
    /// Empty strings, unknown letters and repeated tiers are rejected.
    pub fn parse(s: &str) -> Result<Self, TierOrderError> {
        let mut order = Self {
            tiers: Tier::ALL,
            len: 0,
        };
        for c in s.chars() {
            let tier = Tier::from_letter(c).ok_or(TierOrderError::UnknownTier(c))?;
            if order.contains(tier) {
                return Err(TierOrderError::Duplicate(tier));
            }
            order.tiers[usize::from(order.len)] = tier;
            order.len += 1;
        }
        if order.len == 0 {
            return Err(TierOrderError::Empty);
        }
        Ok(order)
    }

    #[must_use]
    pub fn reversed(mut self) -> Self {
        self.tiers[..usize::from(self.len)].reverse();
        self
    }

    /// The same order without `tier`. Removing the last tier is a no-op.
    #[must_use]
    pub fn without(self, tier: Tier) -> Self {
        if !self.contains(tier) || self.len == 1 {
            return self;
        }
        let mut out = Self {
            tiers: self.tiers,
            len: 0,
        };
        for t in self.iter().filter(|&t| t != tier) {
            out.tiers[usize::from(out.len)] = t;
            out.len += 1;
        }
        out
    }

    #[must_use]
    pub fn contains(&self, tier: Tier) -> bool {
        self.iter().any(|t| t == tier)
    }

    pub fn iter(&self) -> impl Iterator<Item = Tier> + '_ {
        self.tiers[..usize::from(self.len)].iter().copied()
    }
}

impl fmt::Display for TierOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in self.iter() {
            write!(f, "{}", t.letter())?;
        }
        Ok(())
    }
}

/// A block handed out by a pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Allocation {
    /// Payload, 16-byte aligned.
    pub ptr: NonNull<u8>,
    /// Linear address of the payload.
    pub linear: PhysicalAddress,
    /// Usable payload bytes; at least what was asked for.
    pub size: u32,
    pub tier: Tier,
}

/// Something blocks can be taken from and given back to.
pub trait BlockAllocator {
    /// # Errors
    /// As [`Pool::allocate`].
    fn allocate(
        &mut self,
        size: u32,
        kind: BlockKind,
        flags: AllocFlags,
    ) -> Result<Allocation, AllocError>;

    /// # Errors
    /// As [`Pool::free`].
    fn free(&mut self, ptr: *mut u8) -> Result<(), AllocError>;

    /// Tiers [`allocate`](Self::allocate) draws from, first choice first.
    fn tiers(&self) -> TierOrder;

    /// Allocates from `tier` only.
    ///
    /// # Errors
    /// [`AllocError::ServiceUnavailable`] for a tier this allocator does not
    /// have; otherwise as [`allocate`](Self::allocate).
    fn allocate_in(
        &mut self,
        tier: Tier,
        size: u32,
        kind: BlockKind,
        flags: AllocFlags,
    ) -> Result<Allocation, AllocError>;
}

impl<B: crate::Backing, M: PhysMapper> BlockAllocator for Pool<B, M> {
    fn allocate(
        &mut self,
        size: u32,
        kind: BlockKind,
        flags: AllocFlags,
    ) -> Result<Allocation, AllocError> {
        Self::allocate(self, size, kind, flags)
    }

    fn free(&mut self, ptr: *mut u8) -> Result<(), AllocError> {
        Self::free(self, ptr)
    }

    fn tiers(&self) -> TierOrder {
        TierOrder::only(B::TIER)
    }

    fn allocate_in(
        &mut self,
        tier: Tier,
        size: u32,
        kind: BlockKind,
        flags: AllocFlags,
    ) -> Result<Allocation, AllocError> {
        if tier != B::TIER {
            return Err(AllocError::ServiceUnavailable(tier));
        }
        Self::allocate(self, size, kind, flags)
    }
}

/// The three pools behind one allocate/free pair.
pub struct TieredAllocator<X, U, C, M> {
    extended: Pool<ExtendedBacking<X>, M>,
    upper: Pool<UpperBacking<U>, M>,
    conventional: Pool<ConventionalBacking<C>, M>,
    order: TierOrder,
}

impl<X, U, C, M> TieredAllocator<X, U, C, M>
where
    X: ExtendedMemory,
    U: UpperMemory,
    C: ConventionalMemory,
    M: PhysMapper + Copy,
{
    #[must_use]
    pub const fn new(xms: X, umb: U, dos: C, mapper: M) -> Self {
        Self {
            extended: Pool::new(ExtendedBacking::new(xms), mapper),
            upper: Pool::new(UpperBacking::new(umb), mapper),
            conventional: Pool::new(ConventionalBacking::new(dos), mapper),
            order: TierOrder {
                tiers: Tier::ALL,
                len: 3,
            },
        }
    }

    #[must_use]
    pub const fn with_order(mut self, order: TierOrder) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub const fn order(&self) -> TierOrder {
        self.order
    }

    /// Allocates from the first tier in the configured order that can serve
    /// the request.
    ///
    /// # Errors
    /// [`AllocError::InvalidArgument`] for a zero size; [`AllocError::OutOfMemory`]
    /// when every tier failed.
    pub fn allocate(
        &mut self,
        size: u32,
        kind: BlockKind,
        flags: AllocFlags,
    ) -> Result<Allocation, AllocError> {
        self.allocate_with_order(size, kind, flags, self.order)
    }

    /// As [`allocate`](Self::allocate) with an explicit order.
    ///
    /// # Errors
    /// See [`allocate`](Self::allocate).
    pub fn allocate_with_order(
        &mut self,
        size: u32,
        kind: BlockKind,
        flags: AllocFlags,
        order: TierOrder,
    ) -> Result<Allocation, AllocError> {
        for tier in order.iter() {
            match self.allocate_in(tier, size, kind, flags) {
                Ok(allocation) => return Ok(allocation),
                Err(e) if e.is_recoverable() => {
                    debug!("{tier} tier cannot serve {size} bytes ({e}), trying next");
                }
                Err(e) => return Err(e),
            }
        }
        warn!("no tier of {order} could serve {size} bytes");
        Err(AllocError::OutOfMemory)
    }

    /// Allocates from `tier` only.
    ///
    /// # Errors
    /// Whatever that tier's pool reports.
    pub fn allocate_in(
        &mut self,
        tier: Tier,
        size: u32,
        kind: BlockKind,
        flags: AllocFlags,
    ) -> Result<Allocation, AllocError> {
        match tier {
            Tier::Extended => self.extended.allocate(size, kind, flags),
            Tier::Upper => self.upper.allocate(size, kind, flags),
            Tier::Conventional => self.conventional.allocate(size, kind, flags),
        }
    }

    /// Tier owning `ptr`, if any.
    #[must_use]
    pub fn tier_of(&self, ptr: *const u8) -> Option<Tier> {
        if self.extended.owns(ptr) {
            Some(Tier::Extended)
        } else if self.upper.owns(ptr) {
            Some(Tier::Upper)
        } else if self.conventional.owns(ptr) {
            Some(Tier::Conventional)
        } else {
            None
        }
    }

    /// Returns a block to the pool that owns it.
    ///
    /// # Errors
    /// [`AllocError::InvalidArgument`] for null or foreign pointers,
    /// [`AllocError::Corruption`] for a damaged header.
    pub fn free(&mut self, ptr: *mut u8) -> Result<(), AllocError> {
        if ptr.is_null() {
            return Err(AllocError::InvalidArgument("null pointer"));
        }
        match self.tier_of(ptr) {
            Some(Tier::Extended) => self.extended.free(ptr),
            Some(Tier::Upper) => self.upper.free(ptr),
            Some(Tier::Conventional) => self.conventional.free(ptr),
            None => Err(AllocError::InvalidArgument("pointer not owned by any pool")),
        }
    }

    /// Linear address of a payload pointer.
    #[must_use]
    pub fn linear_of(&self, ptr: *const u8) -> Option<PhysicalAddress> {
        self.extended
            .linear_of(ptr)
            .or_else(|| self.upper.linear_of(ptr))
            .or_else(|| self.conventional.linear_of(ptr))
    }

    #[must_use]
    pub fn stats(&self, tier: Tier) -> PoolStats {
        match tier {
            Tier::Extended => self.extended.stats(),
            Tier::Upper => self.upper.stats(),
            Tier::Conventional => self.conventional.stats(),
        }
    }

    /// Checks every pool.
    ///
    /// # Errors
    /// The first [`AllocError::Corruption`] found.
    pub fn verify(&self) -> Result<(), AllocError> {
        self.extended.verify()?;
        self.upper.verify()?;
        self.conventional.verify()
    }

    /// Returns fully free arenas of every pool; total bytes released.
    pub fn trim(&mut self) -> u32 {
        self.extended.trim() + self.upper.trim() + self.conventional.trim()
    }

    /// Releases every arena of every pool.
    pub fn teardown(&mut self) -> LeakReport {
        let report = self
            .extended
            .teardown()
            .merge(self.upper.teardown())
            .merge(self.conventional.teardown());
        if report.is_clean() {
            info!("memory pools released");
        } else {
            warn!(
                "memory pools released with {} leaked blocks ({} bytes)",
                report.blocks, report.bytes
            );
        }
        report
    }

    #[must_use]
    pub const fn extended(&self) -> &Pool<ExtendedBacking<X>, M> {
        &self.extended
    }

    #[must_use]
    pub const fn upper(&self) -> &Pool<UpperBacking<U>, M> {
        &self.upper
    }

    #[must_use]
    pub const fn conventional(&self) -> &Pool<ConventionalBacking<C>, M> {
        &self.conventional
    }
}

impl<X, U, C, M> BlockAllocator for TieredAllocator<X, U, C, M>
where
    X: ExtendedMemory,
    U: UpperMemory,
    C: ConventionalMemory,
    M: PhysMapper + Copy,
{
    fn allocate(
        &mut self,
        size: u32,
        kind: BlockKind,
        flags: AllocFlags,
    ) -> Result<Allocation, AllocError> {
        Self::allocate(self, size, kind, flags)
    }

    fn free(&mut self, ptr: *mut u8) -> Result<(), AllocError> {
        Self::free(self, ptr)
    }

    fn tiers(&self) -> TierOrder {
        self.order
    }

    fn allocate_in(
        &mut self,
        tier: Tier,
        size: u32,
        kind: BlockKind,
        flags: AllocFlags,
    ) -> Result<Allocation, AllocError> {
        Self::allocate_in(self, tier, size, kind, flags)
    }
}
