use crate::DriverConfig;
use crate::registry::{self, DmaSnapshot};
use log::{debug, info, warn};
use pktdrv_alloc::{
    AllocError, AllocFlags, Allocation, BlockKind, DmaAllocator, DmaBuffer, DmaRequest,
    LeakReport, PoolStats, Tier, TieredAllocator,
};
use pktdrv_dma::{CacheOps, CacheSync, CoherencyPlan, DmaPolicy, SnoopTestResult, decide};
use pktdrv_platform::{
    CapabilityFacts, ConventionalMemory, ExtendedMemory, MediatedDma, PhysMapper, UpperMemory,
};

/// Further halvings the degrade path tries after the requested size.
pub const DEGRADE_STEPS: usize = 3;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error("bus master DMA is disabled, use PIO")]
    DmaForbidden,
}

/// The memory services the core draws on.
pub struct Services<X, U, C, V> {
    pub xms: X,
    pub umb: U,
    pub dos: C,
    pub vds: V,
}

/// Sizes the degrade path asks for: `size`, then up to [`DEGRADE_STEPS`]
/// halvings, none smaller than `min`.
pub fn degrade_sizes(size: u32, min: u32) -> impl Iterator<Item = u32> {
    let floor = min.max(1);
    core::iter::successors(Some(size), move |&s| Some(s / 2).filter(|&n| n >= floor))
        .take(1 + DEGRADE_STEPS)
}

/// The VDS client, when the policy routes buffers through it.
fn mediator<V: MediatedDma>(policy: DmaPolicy, vds: &mut V) -> Option<&mut dyn MediatedDma> {
    if policy.requires_mediation() {
        Some(vds)
    } else {
        None
    }
}

/// Everything the driver needs for buffers, decided once at load.
pub struct MemoryCore<X, U, C, M, V, O> {
    heap: TieredAllocator<X, U, C, M>,
    dma: DmaAllocator,
    vds: V,
    sync: CacheSync<O>,
    plan: CoherencyPlan,
    policy: DmaPolicy,
    config: DriverConfig,
}

impl<X, U, C, M, V, O> MemoryCore<X, U, C, M, V, O>
where
    X: ExtendedMemory,
    U: UpperMemory,
    C: ConventionalMemory,
    M: PhysMapper + Copy,
    V: MediatedDma,
    O: CacheOps,
{
    /// Takes the load-time decisions and publishes them to the
    /// [`registry`](crate::registry).
    #[must_use]
    pub fn init(
        facts: &CapabilityFacts,
        config: &DriverConfig,
        services: Services<X, U, C, V>,
        mapper: M,
        ops: O,
        snoop: Option<SnoopTestResult>,
    ) -> Self {
        let mut policy = decide(facts).with_override(config.bus_master_override());
        if policy.requires_mediation() && !services.vds.is_available() {
            warn!("VDS reported but not answering; disabling bus master DMA");
            policy = DmaPolicy::Forbidden;
        }
        info!("DMA policy: {policy}");

        let plan = CoherencyPlan::new(facts, snoop);
        let order = config.effective_order();
        info!("Memory tiers: {order}");

        if registry::publish(DmaSnapshot {
            policy,
            coherency: plan,
        }) {
            debug!("DMA policy published");
        }

        Self {
            heap: TieredAllocator::new(services.xms, services.umb, services.dos, mapper)
                .with_order(order),
            dma: DmaAllocator::new(),
            vds: services.vds,
            sync: CacheSync::new(&plan, ops),
            plan,
            policy,
            config: *config,
        }
    }

    #[must_use]
    pub const fn dma_policy(&self) -> DmaPolicy {
        self.policy
    }

    #[must_use]
    pub const fn coherency(&self) -> &CoherencyPlan {
        &self.plan
    }

    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    #[must_use]
    pub const fn heap(&self) -> &TieredAllocator<X, U, C, M> {
        &self.heap
    }

    #[must_use]
    pub const fn dma(&self) -> &DmaAllocator {
        &self.dma
    }

    #[must_use]
    pub const fn vds(&self) -> &V {
        &self.vds
    }

    #[must_use]
    pub const fn cache_sync(&self) -> &CacheSync<O> {
        &self.sync
    }

    /// # Errors
    /// See [`TieredAllocator::allocate`].
    pub fn allocate(
        &mut self,
        size: u32,
        kind: BlockKind,
        flags: AllocFlags,
    ) -> Result<Allocation, CoreError> {
        Ok(self.heap.allocate(size, kind, flags)?)
    }

    /// # Errors
    /// See [`TieredAllocator::free`].
    pub fn free(&mut self, ptr: *mut u8) -> Result<(), CoreError> {
        Ok(self.heap.free(ptr)?)
    }

    /// The request for `size` bytes at `alignment`, never below the
    /// configured `DMAALIGN`.
    fn dma_request(&self, size: u32, alignment: u32, legacy: bool) -> DmaRequest {
        let alignment = if alignment.is_power_of_two() {
            alignment.max(self.config.dma_alignment)
        } else {
            alignment
        };
        let req = DmaRequest::new(size, alignment).with_retries(self.config.dma_retries);
        if legacy { req.legacy() } else { req }
    }

    /// A DMA buffer of exactly `size` bytes aligned to `alignment` or the
    /// configured alignment, whichever is larger.
    ///
    /// # Errors
    /// [`CoreError::DmaForbidden`] under [`DmaPolicy::Forbidden`]; otherwise
    /// see [`DmaAllocator::allocate`]. An `alignment` that is not a power of
    /// two is an [`AllocError::InvalidArgument`].
    pub fn allocate_dma(
        &mut self,
        size: u32,
        alignment: u32,
        legacy: bool,
    ) -> Result<DmaBuffer, CoreError> {
        if self.policy.pio_fallback() {
            return Err(CoreError::DmaForbidden);
        }
        let req = self.dma_request(size, alignment, legacy);
        let vds = mediator(self.policy, &mut self.vds);
        Ok(self.dma.allocate(&mut self.heap, req, vds)?)
    }

    /// As [`allocate_dma`](Self::allocate_dma), settling for a halved buffer
    /// (see [`degrade_sizes`]) when the full size cannot be placed.
    ///
    /// # Errors
    /// The error of the last size tried, or the first error that a smaller
    /// size would not fix.
    pub fn allocate_dma_with_fallback(
        &mut self,
        size: u32,
        min: u32,
        alignment: u32,
        legacy: bool,
    ) -> Result<DmaBuffer, CoreError> {
        let mut last = CoreError::Alloc(AllocError::OutOfMemory);
        for candidate in degrade_sizes(size, min) {
            match self.allocate_dma(candidate, alignment, legacy) {
                Ok(buf) => {
                    if candidate != size {
                        info!("DMA buffer degraded from {size} to {candidate} bytes");
                    }
                    return Ok(buf);
                }
                Err(
                    e @ CoreError::Alloc(
                        AllocError::ConstraintUnsatisfiable { .. } | AllocError::OutOfMemory,
                    ),
                ) => {
                    debug!("DMA buffer of {candidate} bytes: {e}");
                    last = e;
                }
                Err(e) => return Err(e),
            }
        }
        warn!("no DMA buffer between {size} and {min} bytes");
        Err(last)
    }

    /// Returns a buffer from [`allocate_dma`](Self::allocate_dma).
    ///
    /// # Errors
    /// See [`DmaAllocator::free`].
    pub fn free_dma(&mut self, aligned: *mut u8) -> Result<(), CoreError> {
        let vds = mediator(self.policy, &mut self.vds);
        Ok(self.dma.free(&mut self.heap, aligned, vds)?)
    }

    /// Before the NIC reads `buf` (transmit).
    pub fn prepare_for_device_write(&mut self, buf: &[u8]) {
        if self.plan.hooks_required() {
            self.sync.prepare_for_device_write(buf);
        }
    }

    /// Before the NIC writes `buf` (receive).
    pub fn prepare_for_device_read(&mut self, buf: &[u8]) {
        if self.plan.hooks_required() {
            self.sync.prepare_for_device_read(buf);
        }
    }

    /// After the NIC has written `buf`.
    pub fn complete_device_read(&mut self, buf: &[u8]) {
        if self.plan.hooks_required() {
            self.sync.complete_device_read(buf);
        }
    }

    #[must_use]
    pub fn stats(&self, tier: Tier) -> PoolStats {
        self.heap.stats(tier)
    }

    /// # Errors
    /// The first corrupted block found.
    pub fn verify(&self) -> Result<(), CoreError> {
        Ok(self.heap.verify()?)
    }

    /// Returns outstanding DMA buffers, then every arena. The report lists
    /// the general blocks that were still allocated.
    pub fn teardown(&mut self) -> LeakReport {
        let vds = mediator(self.policy, &mut self.vds);
        let released = self.dma.release_all(&mut self.heap, vds);
        if released > 0 {
            warn!("{released} DMA buffers still live at unload");
        }
        self.heap.teardown()
    }
}
