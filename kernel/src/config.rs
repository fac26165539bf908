//! Clock configuration.
//!
//! Collects the fixed parameters of the scheduler clock: the fallback tick
//! rate and its zero point, and the fixed-point scale factor used for every
//! cycles-to-nanoseconds record.

use crate::error::ClockError;
use crate::time::NSEC_PER_SEC;

/// 2^10, carefully chosen: sub-ns multiplier precision for multi-GHz
/// counters while `cycles * mul` stays well inside 96 bits.
pub const CYC2NS_SCALE_FACTOR: u32 = 10;

/// Default fallback tick rate (1000 Hz ⇒ 1 ms per tick).
pub const DEFAULT_FALLBACK_HZ: u64 = 1000;

/// Largest scale factor for which the identity record `1 << shift` still
/// fits in a 32-bit multiplier.
pub const MAX_SCALE_FACTOR: u32 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    /// Fallback ticks per second
    pub fallback_hz: u64,
    /// Tick value treated as time zero on the fallback path
    pub initial_ticks: u64,
    /// Right shift applied to `cycles * mul`
    pub scale_factor: u32,
}

impl ClockConfig {
    pub const DEFAULT: ClockConfig = ClockConfig {
        fallback_hz: DEFAULT_FALLBACK_HZ,
        initial_ticks: 0,
        scale_factor: CYC2NS_SCALE_FACTOR,
    };

    pub const fn new(fallback_hz: u64, initial_ticks: u64) -> Self {
        Self {
            fallback_hz,
            initial_ticks,
            scale_factor: CYC2NS_SCALE_FACTOR,
        }
    }

    pub const fn with_scale_factor(mut self, scale_factor: u32) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// Check the configuration before a clock is built from it.
    pub fn validate(&self) -> Result<(), ClockError> {
        if self.fallback_hz == 0 {
            return Err(ClockError::ZeroFrequency);
        }
        if self.fallback_hz > NSEC_PER_SEC {
            return Err(ClockError::FrequencyOutOfRange {
                cycles_per_second: self.fallback_hz,
            });
        }
        if self.scale_factor == 0 || self.scale_factor > MAX_SCALE_FACTOR {
            return Err(ClockError::InvalidShift(self.scale_factor));
        }
        Ok(())
    }

    /// Nanoseconds per fallback tick.
    #[inline]
    pub const fn tick_nsec(&self) -> u64 {
        NSEC_PER_SEC / self.fallback_hz
    }

    /// Microseconds per fallback tick.
    #[inline]
    pub const fn tick_size_us(&self) -> u64 {
        self.tick_nsec() / 1000
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClockConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.tick_nsec(), 1_000_000);
        assert_eq!(config.tick_size_us(), 1000);
    }

    #[test]
    fn test_rejects_zero_fallback_rate() {
        let config = ClockConfig::new(0, 0);
        assert_eq!(config.validate(), Err(ClockError::ZeroFrequency));
    }

    #[test]
    fn test_rejects_sub_nanosecond_ticks() {
        let config = ClockConfig::new(NSEC_PER_SEC + 1, 0);
        assert!(matches!(
            config.validate(),
            Err(ClockError::FrequencyOutOfRange { .. })
        ));
    }

    #[test]
    fn test_scale_factor_bounds() {
        let base = ClockConfig::DEFAULT;
        assert_eq!(
            base.with_scale_factor(0).validate(),
            Err(ClockError::InvalidShift(0))
        );
        assert_eq!(
            base.with_scale_factor(32).validate(),
            Err(ClockError::InvalidShift(32))
        );
        assert_eq!(base.with_scale_factor(31).validate(), Ok(()));
    }

    #[test]
    fn test_hz_100_tick_size() {
        let config = ClockConfig::new(100, 0);
        assert_eq!(config.tick_nsec(), 10_000_000);
        assert_eq!(config.tick_size_us(), 10_000);
    }
}
