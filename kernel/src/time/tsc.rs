//! Hardware cycle counter.
//!
//! On x86_64 this is the TSC, a 64-bit register counting CPU cycles; on
//! aarch64 the generic timer's virtual count. The clock only relies on the
//! counter being monotonic on the CPU that reads it. Its frequency is
//! measured elsewhere and handed to `recalibrate`.

/// Source of raw, per-CPU monotonic cycle counts.
pub trait CycleCounter: Sync {
    fn read_cycles(&self) -> u64;
}

impl<F> CycleCounter for F
where
    F: Fn() -> u64 + Sync,
{
    #[inline]
    fn read_cycles(&self) -> u64 {
        self()
    }
}

/// The CPU's own cycle counter.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct Tsc;

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
impl CycleCounter for Tsc {
    #[inline(always)]
    fn read_cycles(&self) -> u64 {
        read_tsc()
    }
}

/// Read the Time Stamp Counter using RDTSC instruction.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn read_tsc() -> u64 {
    let low: u32;
    let high: u32;

    // RDTSC returns the 64-bit TSC in EDX:EAX
    unsafe {
        core::arch::asm!(
            "rdtsc",
            out("eax") low,
            out("edx") high,
            options(nostack, nomem, preserves_flags)
        );
    }

    ((high as u64) << 32) | (low as u64)
}

/// Read the virtual count (CNTVCT_EL0).
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn read_tsc() -> u64 {
    let cnt: u64;
    unsafe {
        core::arch::asm!("mrs {}, cntvct_el0", out(reg) cnt, options(nomem, nostack, preserves_flags));
    }
    cnt
}
