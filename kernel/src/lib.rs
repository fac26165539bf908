//! Scheduler clock
//!
//! Translates a per-CPU hardware cycle counter into nanoseconds for the
//! scheduler, staying continuous when the counter frequency changes at
//! runtime, and falls back to the periodic tick counter when the hardware
//! counter is not trusted.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sched_clock::{time, ClockConfig};
//!
//! // Boot CPU, once the TSC frequency is known
//! time::init(ClockConfig::new(1000, 0), cpu_id)?;
//! time::recalibrate(tsc_hz, time::tsc::read_tsc())?;
//! time::set_active_path(true)?;
//!
//! // Anywhere, with preemption disabled
//! let now = time::sched_clock();
//! ```

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod logger;
pub mod per_cpu;
pub mod time;

pub use config::{ClockConfig, CYC2NS_SCALE_FACTOR};
pub use error::ClockError;
pub use per_cpu::{PerCpu, PreemptHooks, MAX_CPUS};
pub use time::{ClockPath, CycleCounter, Cyc2Ns, Cyc2NsData, SchedClock, TickSource};
