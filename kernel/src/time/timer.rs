//! Fallback tick counter.
//!
//! A coarse process-wide counter advanced by the periodic timer interrupt.
//! Used by the scheduler clock whenever the hardware counter is not in use.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::config::ClockConfig;

/// Global monotonic tick counter.
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Source of fallback ticks.
pub trait TickSource: Sync {
    fn ticks(&self) -> u64;
}

impl<F> TickSource for F
where
    F: Fn() -> u64 + Sync,
{
    #[inline]
    fn ticks(&self) -> u64 {
        self()
    }
}

/// The process-wide tick counter driven by [`timer_interrupt`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Jiffies;

impl TickSource for Jiffies {
    #[inline]
    fn ticks(&self) -> u64 {
        get_ticks()
    }
}

/// Invoked from the timer interrupt once per tick.
#[inline]
pub fn timer_interrupt() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Raw tick counter.
#[inline]
pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Nanoseconds represented by `ticks` under `config`.
///
/// No locking, and a rare wrong value is not a big deal: a tick count read
/// mid-update only costs one tick of accuracy. Arithmetic wraps rather than
/// panicking when `ticks` is below the configured zero point.
#[inline]
pub fn ticks_to_ns(ticks: u64, config: &ClockConfig) -> u64 {
    ticks
        .wrapping_sub(config.initial_ticks)
        .wrapping_mul(config.tick_nsec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hundred_ticks_at_1000_hz() {
        let config = ClockConfig::new(1000, 0);
        assert_eq!(ticks_to_ns(100, &config), 100_000_000);
    }

    #[test]
    fn test_initial_ticks_are_subtracted() {
        let config = ClockConfig::new(250, 1_000);
        assert_eq!(ticks_to_ns(1_000, &config), 0);
        assert_eq!(ticks_to_ns(1_250, &config), 1_000_000_000);
    }

    #[test]
    fn test_timer_interrupt_advances_ticks() {
        let before = get_ticks();
        timer_interrupt();
        timer_interrupt();
        assert!(get_ticks() >= before + 2);
        assert!(Jiffies.ticks() >= before + 2);
    }

    #[test]
    fn test_closure_tick_source() {
        let source = || 7u64;
        assert_eq!(source.ticks(), 7);
    }
}
