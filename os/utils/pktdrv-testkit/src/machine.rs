use pktdrv_addresses::PhysicalAddress;
use pktdrv_platform::PhysMapper;
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ptr::NonNull;

/// 17 MiB: conventional memory, the UMA, and extended memory up to one MiB
/// past the legacy DMA ceiling.
pub const MEMORY_BYTES: usize = 0x0110_0000;

const PAGE: usize = 4096;

/// Host memory standing for the machine's linear address space.
pub struct SimMachine {
    memory: NonNull<u8>,
    layout: Layout,
}

impl SimMachine {
    #[must_use]
    pub fn new() -> Self {
        let layout = Layout::from_size_align(MEMORY_BYTES, PAGE).expect("valid layout");
        // SAFETY: non-zero size.
        let memory = unsafe { alloc_zeroed(layout) };
        let memory = NonNull::new(memory).expect("host allocation failed");
        Self { memory, layout }
    }

    /// Mapper into this machine. Pointers it produces are valid while the
    /// machine lives.
    #[must_use]
    pub const fn mapper(&self) -> SimMapper {
        SimMapper {
            base: self.memory.as_ptr(),
        }
    }

    /// Copy of `len` bytes at linear address `at`.
    #[must_use]
    pub fn read(&self, at: PhysicalAddress, len: usize) -> Vec<u8> {
        assert!(at.as_usize() + len <= MEMORY_BYTES);
        // SAFETY: bounds checked above.
        unsafe { std::slice::from_raw_parts(self.memory.as_ptr().add(at.as_usize()), len).to_vec() }
    }
}

impl Default for SimMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimMachine {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with the same layout.
        unsafe { dealloc(self.memory.as_ptr(), self.layout) };
    }
}

#[derive(Copy, Clone, Debug)]
pub struct SimMapper {
    base: *mut u8,
}

impl SimMapper {
    /// Linear address of a pointer produced by this mapper.
    #[must_use]
    pub fn linear_of(&self, ptr: *const u8) -> PhysicalAddress {
        let offset = ptr.addr() - self.base.addr();
        assert!(offset < MEMORY_BYTES, "pointer outside the simulated machine");
        PhysicalAddress::new(u32::try_from(offset).expect("fits 32 bits"))
    }
}

impl PhysMapper for SimMapper {
    fn linear_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        assert!(pa.as_usize() < MEMORY_BYTES, "{pa} outside the simulated machine");
        self.base.wrapping_add(pa.as_usize())
    }
}
