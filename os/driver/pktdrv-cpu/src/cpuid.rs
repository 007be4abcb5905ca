mod leaf01h;
mod ranges;

pub use leaf01h::{LEAF_01H, Leaf01h, Leaf1Eax, Leaf1Ebx, Leaf1Edx};
pub use ranges::{CpuVendor, CpuidRanges, LEAF_00H};

/// Raw output of one `CPUID` invocation.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[repr(C)]
pub struct CpuidResult {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

/// Execute CPUID with the given leaf and subleaf.
///
/// # Safety
/// The `CPUID` instruction must exist (see [`crate::CpuClass::detect`]); on a
/// 386 or early 486 it raises `#UD`.
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
#[inline(always)]
#[allow(unused_assignments, clippy::inline_always)]
pub unsafe fn cpuid(leaf: u32, subleaf: u32) -> CpuidResult {
    let (mut eax, mut ebx, mut ecx, mut edx) = (leaf, 0u32, subleaf, 0u32);
    unsafe {
        core::arch::asm!(
            "push rbx",
            "cpuid",
            "mov {ebx_out:e}, ebx",
            "pop rbx",
            ebx_out = lateout(reg) ebx,
            inlateout("eax") eax,
            inlateout("ecx") ecx,
            lateout("edx") edx,
            options(nomem, preserves_flags),
        );
    }
    CpuidResult { eax, ebx, ecx, edx }
}

/// Execute CPUID with the given leaf and subleaf.
///
/// # Safety
/// The `CPUID` instruction must exist (see [`crate::CpuClass::detect`]); on a
/// 386 or early 486 it raises `#UD`.
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[inline(always)]
#[allow(unused_assignments, clippy::inline_always)]
pub unsafe fn cpuid(leaf: u32, subleaf: u32) -> CpuidResult {
    let (mut eax, mut ebx, mut ecx, mut edx) = (leaf, 0u32, subleaf, 0u32);
    unsafe {
        core::arch::asm!(
            "push ebx",
            "cpuid",
            "mov {ebx_out}, ebx",
            "pop ebx",
            ebx_out = lateout(reg) ebx,
            inlateout("eax") eax,
            inlateout("ecx") ecx,
            lateout("edx") edx,
            options(nomem, preserves_flags),
        );
    }
    CpuidResult { eax, ebx, ecx, edx }
}
