//! Continuous recalibration of the cycles to ns function.
//!
//! Continuity means that when the counter frequency changes the slope (mul)
//! changes but the function value at the switch point does not:
//! `f(t) == f'(t)`, which gives `offset + mul*t == offset' + mul'*t`.
//! Solving for `offset'` is all this module does; the frequency itself and
//! the switch point come from platform code.

use crate::config::MAX_SCALE_FACTOR;
use crate::error::ClockError;
use crate::time::cyc2ns::{cycles_to_ns, mul_u64_u32_shr, Cyc2Ns, Cyc2NsData};
use crate::time::NSEC_PER_SEC;

/// Fixed-point ns-per-cycle ratio for `cycles_per_second`, rounded to the
/// nearest representable value. `shift` must lie in `1..=31`.
pub fn cyc2ns_mul(cycles_per_second: u64, shift: u32) -> Result<u32, ClockError> {
    if shift == 0 || shift > MAX_SCALE_FACTOR {
        return Err(ClockError::InvalidShift(shift));
    }
    if cycles_per_second == 0 {
        return Err(ClockError::ZeroFrequency);
    }

    let hz = cycles_per_second as u128;
    let mul = (((NSEC_PER_SEC as u128) << shift) + hz / 2) / hz;

    match u32::try_from(mul) {
        Ok(mul) if mul != 0 => Ok(mul),
        _ => Err(ClockError::FrequencyOutOfRange { cycles_per_second }),
    }
}

/// Build the segment that takes over from `old` at `at_cycles`.
///
/// The new segment evaluated at `at_cycles` equals `old` evaluated there,
/// exactly; only the slope reflects `cycles_per_second`.
pub fn next_segment(
    old: &Cyc2NsData,
    cycles_per_second: u64,
    at_cycles: u64,
    shift: u32,
) -> Result<Cyc2NsData, ClockError> {
    let mul = cyc2ns_mul(cycles_per_second, shift)?;
    let ns_now = cycles_to_ns(at_cycles, old);
    let offset = ns_now.wrapping_sub(mul_u64_u32_shr(at_cycles, mul, shift));

    Ok(Cyc2NsData { mul, shift, offset })
}

/// Switch `store` to a counter running at `cycles_per_second`, starting at
/// `at_cycles`, and return the published segment.
///
/// Must run on the CPU owning `store`. On error nothing is published and the
/// previous segment stays active.
pub fn recalibrate(
    store: &Cyc2Ns,
    cycles_per_second: u64,
    at_cycles: u64,
    shift: u32,
) -> Result<Cyc2NsData, ClockError> {
    let old = store.read_begin();
    store.read_end();

    let new = match next_segment(&old, cycles_per_second, at_cycles, shift) {
        Ok(new) => new,
        Err(e) => {
            log::warn!(
                "cyc2ns: rejecting recalibration to {} Hz at cycle {}: {}",
                cycles_per_second,
                at_cycles,
                e
            );
            return Err(e);
        }
    };

    store.publish(new);

    log::debug!(
        "cyc2ns: {} Hz from cycle {} -> mul={} shift={} offset={:#x} (ns {})",
        cycles_per_second,
        at_cycles,
        new.mul,
        new.shift,
        new.offset,
        cycles_to_ns(at_cycles, &new)
    );

    Ok(new)
}

#[cfg(test)]
#[path = "recalibrate_tests.rs"]
mod tests;
