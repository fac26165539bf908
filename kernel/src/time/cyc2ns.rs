//! Cycles to nanoseconds conversion data.
//!
//! We use the full linear equation `ns = offset + (cycles * mul) >> shift`
//! so the function can stay continuous when the counter frequency changes:
//! a new slope gets a new offset chosen so both segments agree at the
//! switch point (see `recalibrate`).
//!
//! Each CPU keeps two copies of its record plus a sequence counter. The low
//! bit of the counter selects which copy readers use. An update first moves
//! readers onto copy 1 (counter odd), rewrites copy 0, moves readers back
//! onto copy 0 (counter even) and finally brings copy 1 up to date. A reader
//! copies the selected record and retries only if the counter moved while
//! it was copying, so a reader that interrupts an update on the same CPU
//! still finishes against the copy the writer is not touching.
//!
//! The price is strict monotonicity: a reader racing an update cannot tell
//! whether it ran before or after the switch point.

use core::hint::spin_loop;
use core::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};

use crate::per_cpu;

/// One segment of the piecewise-linear cycles to ns function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Cyc2NsData {
    pub mul: u32,
    pub shift: u32,
    pub offset: u64,
} /* 16 bytes */

impl Cyc2NsData {
    pub const fn new(mul: u32, shift: u32, offset: u64) -> Self {
        Self { mul, shift, offset }
    }

    /// One nanosecond per cycle. Installed at CPU bring-up, before the
    /// counter frequency is known.
    pub const fn identity(shift: u32) -> Self {
        Self {
            mul: 1 << shift,
            shift,
            offset: 0,
        }
    }

    /// Evaluate this segment at `cycles`.
    #[inline]
    pub fn to_ns(&self, cycles: u64) -> u64 {
        cycles_to_ns(cycles, self)
    }
}

/// `(a * mul) >> shift` with a 96-bit intermediate product.
///
/// The product of a 64-bit count and a 32-bit multiplier never overflows the
/// 128-bit intermediate. The result is exact as long as it fits in 64 bits,
/// i.e. `a * mul < 2^(64 + shift)`; with `shift >= 32` that holds for every
/// input. With the default shift of 10, any counter at or above 1 GHz
/// (`mul <= 1024`) is exact over the whole 64-bit cycle range, and a 1 MHz
/// counter (`mul` = 1_024_000) for 2^54 cycles, roughly 570 years.
#[inline]
pub fn mul_u64_u32_shr(a: u64, mul: u32, shift: u32) -> u64 {
    ((a as u128 * mul as u128) >> shift) as u64
}

/// Evaluate `data` at `cycles`.
///
/// The offset is applied modulo 2^64: when a recalibration lowers the
/// frequency the new offset is "negative" and wraps back on addition.
#[inline]
pub fn cycles_to_ns(cycles: u64, data: &Cyc2NsData) -> u64 {
    data.offset
        .wrapping_add(mul_u64_u32_shr(cycles, data.mul, data.shift))
}

/// Storage for one copy of a record. Fields are individually atomic so a
/// racing reader sees stale values rather than undefined behaviour; the
/// sequence counter is what rejects mixed copies.
struct Cyc2NsSlot {
    mul: AtomicU32,
    shift: AtomicU32,
    offset: AtomicU64,
}

impl Cyc2NsSlot {
    const fn new(data: Cyc2NsData) -> Self {
        Self {
            mul: AtomicU32::new(data.mul),
            shift: AtomicU32::new(data.shift),
            offset: AtomicU64::new(data.offset),
        }
    }

    #[inline]
    fn load(&self) -> Cyc2NsData {
        Cyc2NsData {
            mul: self.mul.load(Ordering::Relaxed),
            shift: self.shift.load(Ordering::Relaxed),
            offset: self.offset.load(Ordering::Relaxed),
        }
    }

    #[inline]
    fn store(&self, data: &Cyc2NsData) {
        self.mul.store(data.mul, Ordering::Relaxed);
        self.shift.store(data.shift, Ordering::Relaxed);
        self.offset.store(data.offset, Ordering::Relaxed);
    }
}

/// Per-CPU double-buffered coefficients and their sequence counter.
pub struct Cyc2Ns {
    data: [Cyc2NsSlot; 2],
    seq: AtomicU32,
}

impl Cyc2Ns {
    /// Both copies hold `initial`, sequence starts at 0.
    pub const fn new(initial: Cyc2NsData) -> Self {
        Self {
            data: [Cyc2NsSlot::new(initial), Cyc2NsSlot::new(initial)],
            seq: AtomicU32::new(0),
        }
    }

    /// Copy out the active record.
    ///
    /// Never blocks and may be re-entered from an interrupt that fired in
    /// the middle of another read or of `publish` on this CPU. Must be
    /// paired with [`Cyc2Ns::read_end`].
    #[inline]
    pub fn read_begin(&self) -> Cyc2NsData {
        per_cpu::preempt_disable();

        loop {
            let seq = self.seq.load(Ordering::Acquire);
            let data = self.data[(seq & 1) as usize].load();
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == seq {
                return data;
            }
            spin_loop();
        }
    }

    /// Close the bracket opened by [`Cyc2Ns::read_begin`].
    #[inline]
    pub fn read_end(&self) {
        per_cpu::preempt_enable();
    }

    /// Replace the active record with `new`.
    ///
    /// Single writer per CPU; never re-entered. Readers that interrupt the
    /// update are served from the copy not being written.
    pub fn publish(&self, new: Cyc2NsData) {
        self.begin_update(&new);
        self.finish_update(&new);
    }

    /// Move readers onto copy 1 and rewrite copy 0.
    #[inline(always)]
    fn begin_update(&self, new: &Cyc2NsData) {
        let seq = self.seq.load(Ordering::Relaxed);

        // Release pairs with the Acquire load in `read_begin`: a reader that
        // sees the odd value also sees the previous update's copy 1 stores.
        self.seq.store(seq.wrapping_add(1), Ordering::Release);
        // Copy 0 stores stay behind the odd counter.
        fence(Ordering::Release);
        self.data[0].store(new);
    }

    /// Move readers back onto copy 0 and bring copy 1 up to date.
    #[inline(always)]
    fn finish_update(&self, new: &Cyc2NsData) {
        let seq = self.seq.load(Ordering::Relaxed);

        // Release: copy 0 is complete before readers are sent to it.
        self.seq.store(seq.wrapping_add(1), Ordering::Release);
        fence(Ordering::Release);
        self.data[1].store(new);
    }

    /// Current value of the sequence counter.
    #[inline]
    pub fn sequence(&self) -> u32 {
        self.seq.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "cyc2ns_tests.rs"]
mod tests;
