//! Clock Error Types
//!
//! The conversion and read paths never fail. These errors only come out of
//! bring-up and recalibration boundaries, where bad input is rejected
//! before anything is published.

use core::fmt;

/// Errors reported by clock configuration and recalibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// A frequency of 0 Hz was supplied
    ZeroFrequency,
    /// The frequency cannot be expressed as a 32-bit fixed-point multiplier
    FrequencyOutOfRange { cycles_per_second: u64 },
    /// Scale factor outside the supported range
    InvalidShift(u32),
    /// CPU index does not have a per-CPU slot
    CpuOutOfRange { cpu: usize, max: usize },
    /// The process-wide clock has already been installed
    AlreadyInitialized,
    /// The process-wide clock has not been installed yet
    NotInitialized,
    /// A global logger is already installed
    LoggerAlreadyInstalled,
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::ZeroFrequency => write!(f, "frequency must be non-zero"),
            ClockError::FrequencyOutOfRange { cycles_per_second } => write!(
                f,
                "{} Hz does not fit a 32-bit cycles-to-ns multiplier",
                cycles_per_second
            ),
            ClockError::InvalidShift(shift) => {
                write!(f, "scale factor {} outside 1..=31", shift)
            }
            ClockError::CpuOutOfRange { cpu, max } => {
                write!(f, "cpu {} out of range (max {})", cpu, max)
            }
            ClockError::AlreadyInitialized => write!(f, "sched clock already initialized"),
            ClockError::NotInitialized => write!(f, "sched clock not initialized"),
            ClockError::LoggerAlreadyInstalled => write!(f, "logger already installed"),
        }
    }
}
