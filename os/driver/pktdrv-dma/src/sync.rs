//! Cache maintenance around bus master transfers.

use crate::{CacheOps, CoherencyPlan, CoherencyTier};

/// Prepare/complete hooks around PIO and DMA transfers.
///
/// Which instructions run is fixed by the [`CoherencyTier`] chosen at load;
/// the hooks never query the CPU again, never allocate and never block. Under
/// [`CoherencyTier::NotNeeded`] they execute nothing at all; under every
/// other tier they end with a fence.
///
/// Skipping the hooks entirely when the bus snoops is up to the call site
/// (see [`CoherencyPlan::hooks_required`]).
pub struct CacheSync<O> {
    tier: CoherencyTier,
    line_size: usize,
    ops: O,
}

impl<O: CacheOps> CacheSync<O> {
    #[must_use]
    pub fn new(plan: &CoherencyPlan, ops: O) -> Self {
        Self {
            tier: plan.tier,
            line_size: usize::from(plan.line_size).max(1).next_power_of_two(),
            ops,
        }
    }

    #[inline]
    #[must_use]
    pub const fn tier(&self) -> CoherencyTier {
        self.tier
    }

    #[must_use]
    pub const fn ops(&self) -> &O {
        &self.ops
    }

    /// Before the device reads `buf` (transmit): make memory hold what the
    /// CPU wrote.
    pub fn prepare_for_device_write(&mut self, buf: &[u8]) {
        match self.tier {
            CoherencyTier::NotNeeded => return,
            CoherencyTier::SurgicalInstruction => self.flush_lines(buf),
            CoherencyTier::FullFlushInstruction => self.ops.flush_all(),
            CoherencyTier::SoftwareBarrier => self.touch_lines(buf),
        }
        self.ops.fence();
    }

    /// Before the device writes into `buf` (receive): drop any cached copy so
    /// a dirty line cannot be written back over the incoming data.
    pub fn prepare_for_device_read(&mut self, buf: &[u8]) {
        match self.tier {
            CoherencyTier::NotNeeded => return,
            CoherencyTier::SurgicalInstruction => self.flush_lines(buf),
            CoherencyTier::FullFlushInstruction => self.ops.flush_all(),
            CoherencyTier::SoftwareBarrier => {}
        }
        self.ops.fence();
    }

    /// After the device has written `buf`: discard lines the CPU may have
    /// prefetched while the transfer was running.
    pub fn complete_device_read(&mut self, buf: &[u8]) {
        match self.tier {
            CoherencyTier::NotNeeded => return,
            CoherencyTier::SurgicalInstruction => self.flush_lines(buf),
            CoherencyTier::FullFlushInstruction => self.ops.flush_all(),
            CoherencyTier::SoftwareBarrier => self.touch_lines(buf),
        }
        self.ops.fence();
    }

    /// Start of every cache line covering `buf`.
    fn lines(&self, buf: &[u8]) -> impl Iterator<Item = *const u8> + use<O> {
        let start = buf.as_ptr();
        let first = start.addr() & !(self.line_size - 1);
        let skip = start.addr() - first;
        let line = self.line_size;
        let end = if buf.is_empty() { 0 } else { buf.len() + skip };
        (0..end)
            .step_by(line)
            .map(move |off| start.wrapping_sub(skip).wrapping_add(off))
    }

    fn flush_lines(&mut self, buf: &[u8]) {
        for line in self.lines(buf) {
            // SAFETY: the line overlaps `buf`, which the caller owns; CLFLUSH
            // does not fault on the bytes outside it.
            unsafe { self.ops.flush_line(line) };
        }
    }

    fn touch_lines(&mut self, buf: &[u8]) {
        let start = buf.as_ptr().addr();
        for line in self.lines(buf) {
            let at = line.addr().max(start) - start;
            // SAFETY: every covering line has a byte inside `buf`.
            unsafe { self.ops.touch_line(buf.as_ptr().wrapping_add(at)) };
        }
    }
}
