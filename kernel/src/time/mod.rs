//! Scheduler clock.
//!
//! Time sources (in order of precision):
//! - Hardware cycle counter: nanosecond precision, converted through the
//!   per-CPU coefficients in [`cyc2ns`] and kept continuous across frequency
//!   changes by [`recalibrate`]
//! - Fallback tick counter: tick precision (1 ms at 1000 Hz)
//!
//! The scheduler clock is not a wall clock and is only monotonic per CPU
//! and per segment. Callers keep the current task from migrating (preemption
//! disabled or equivalent) for the duration of a [`SchedClock::now_ns`] call.

pub mod cyc2ns;
pub mod recalibrate;
pub mod timer;
pub mod tsc;

use core::sync::atomic::{AtomicU8, Ordering};

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
use conquer_once::spin::OnceCell;

use crate::config::ClockConfig;
use crate::error::ClockError;
use crate::per_cpu::{self, PerCpu};

pub use cyc2ns::{cycles_to_ns, mul_u64_u32_shr, Cyc2Ns, Cyc2NsData};
pub use timer::{get_ticks, ticks_to_ns, timer_interrupt, Jiffies, TickSource};
pub use tsc::CycleCounter;
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub use tsc::Tsc;

pub const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Which source `now_ns` reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClockPath {
    /// Platform code has not decided yet; behaves as `Fallback`
    Undecided = 0,
    Hardware = 1,
    Fallback = 2,
}

impl ClockPath {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ClockPath::Hardware,
            2 => ClockPath::Fallback,
            _ => ClockPath::Undecided,
        }
    }
}

/// Read-mostly flag selecting the active path. Flipped a handful of times
/// per boot at most; readers may race a flip and take either path.
struct ActivePath(AtomicU8);

impl ActivePath {
    const fn new() -> Self {
        Self(AtomicU8::new(ClockPath::Undecided as u8))
    }

    #[inline]
    fn get(&self) -> ClockPath {
        ClockPath::from_u8(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, path: ClockPath) -> ClockPath {
        ClockPath::from_u8(self.0.swap(path as u8, Ordering::Relaxed))
    }
}

/// Cycle counter to nanosecond clock with a tick-based fallback.
pub struct SchedClock<C, T> {
    counter: C,
    ticks: T,
    config: ClockConfig,
    path: ActivePath,
    cyc2ns: PerCpu<Cyc2Ns>,
    cpu_id: fn() -> usize,
}

impl<C: CycleCounter, T: TickSource> SchedClock<C, T> {
    /// Build a clock with every CPU on the identity segment and the active
    /// path undecided. The current CPU is taken to be CPU 0 until
    /// [`SchedClock::with_cpu_id`] supplies the kernel's lookup.
    pub fn new(counter: C, ticks: T, config: ClockConfig) -> Result<Self, ClockError> {
        config.validate()?;

        let identity = Cyc2NsData::identity(config.scale_factor);
        Ok(Self {
            counter,
            ticks,
            config,
            path: ActivePath::new(),
            cyc2ns: PerCpu::from_fn(|_| Cyc2Ns::new(identity)),
            cpu_id: per_cpu::boot_cpu_id,
        })
    }

    /// Use `cpu_id` to find the current CPU's coefficients.
    pub fn with_cpu_id(mut self, cpu_id: fn() -> usize) -> Self {
        self.cpu_id = cpu_id;
        self
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Current time in nanoseconds.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        match self.path.get() {
            ClockPath::Hardware => {
                let cycles = self.counter.read_cycles();
                self.cycles_to_ns(cycles)
            }
            ClockPath::Fallback | ClockPath::Undecided => self.fallback_ns(),
        }
    }

    /// Convert `cycles` with the current CPU's active segment.
    #[inline]
    pub fn cycles_to_ns(&self, cycles: u64) -> u64 {
        let store = self.this_cpu();
        let data = store.read_begin();
        let ns = cycles_to_ns(cycles, &data);
        store.read_end();
        ns
    }

    /// Tick-based time, regardless of the active path.
    #[inline]
    pub fn fallback_ns(&self) -> u64 {
        ticks_to_ns(self.ticks.ticks(), &self.config)
    }

    /// Select the hardware path (`true`) or the tick fallback (`false`).
    pub fn set_active_path(&self, hardware_enabled: bool) {
        let path = if hardware_enabled {
            ClockPath::Hardware
        } else {
            ClockPath::Fallback
        };
        let old = self.path.set(path);
        if old != path {
            log::info!("sched_clock: {:?} -> {:?}", old, path);
        }
    }

    /// The hardware counter turned out to be unreliable; use ticks from now on.
    pub fn mark_hardware_unstable(&self) {
        if self.path.set(ClockPath::Fallback) == ClockPath::Hardware {
            log::warn!("sched_clock: cycle counter marked unstable, falling back to ticks");
        }
    }

    pub fn active_path(&self) -> ClockPath {
        self.path.get()
    }

    /// Whether `now_ns` currently reads the hardware counter.
    #[inline]
    pub fn using_hardware_clock(&self) -> bool {
        self.path.get() == ClockPath::Hardware
    }

    /// The current CPU's counter now runs at `cycles_per_second`, starting at
    /// `at_cycles`. Must be called on that CPU.
    pub fn recalibrate(
        &self,
        cycles_per_second: u64,
        at_cycles: u64,
    ) -> Result<Cyc2NsData, ClockError> {
        recalibrate::recalibrate(
            self.this_cpu(),
            cycles_per_second,
            at_cycles,
            self.config.scale_factor,
        )
    }

    /// Recalibrate `cpu`'s segment. Must be called on `cpu`.
    pub fn recalibrate_cpu(
        &self,
        cpu: usize,
        cycles_per_second: u64,
        at_cycles: u64,
    ) -> Result<Cyc2NsData, ClockError> {
        recalibrate::recalibrate(
            self.cyc2ns.try_get(cpu)?,
            cycles_per_second,
            at_cycles,
            self.config.scale_factor,
        )
    }

    /// Recalibrate the current CPU at the counter's present value.
    pub fn recalibrate_now(&self, cycles_per_second: u64) -> Result<Cyc2NsData, ClockError> {
        let at_cycles = self.counter.read_cycles();
        self.recalibrate(cycles_per_second, at_cycles)
    }

    /// CPU bring-up: put `cpu` back on the identity segment.
    pub fn init_cpu(&self, cpu: usize) -> Result<(), ClockError> {
        let store = self.cyc2ns.try_get(cpu)?;
        store.publish(Cyc2NsData::identity(self.config.scale_factor));
        log::debug!("sched_clock: cpu {} cyc2ns initialized", cpu);
        Ok(())
    }

    /// Snapshot of `cpu`'s active segment.
    pub fn cpu_data(&self, cpu: usize) -> Result<Cyc2NsData, ClockError> {
        let store = self.cyc2ns.try_get(cpu)?;
        let data = store.read_begin();
        store.read_end();
        Ok(data)
    }

    /// Log the state of the clock.
    pub fn debug_info(&self) {
        let cpu = (self.cpu_id)();
        let store = self.this_cpu();
        let data = store.read_begin();
        store.read_end();

        log::info!("=== Sched Clock Debug Information ===");
        log::info!("Active path: {:?}", self.path.get());
        log::info!(
            "CPU {}: mul={} shift={} offset={:#x} seq={}",
            cpu,
            data.mul,
            data.shift,
            data.offset,
            store.sequence()
        );
        log::info!("Cycles -> ns: {} ns", self.cycles_to_ns(self.counter.read_cycles()));
        log::info!(
            "Fallback: {} ticks at {} Hz ({} us per tick) = {} ns",
            self.ticks.ticks(),
            self.config.fallback_hz,
            self.config.tick_size_us(),
            self.fallback_ns()
        );
        log::info!("=====================================");
    }

    #[inline]
    fn this_cpu(&self) -> &Cyc2Ns {
        // An out-of-range id from the kernel's lookup lands on the boot CPU.
        self.cyc2ns
            .get((self.cpu_id)())
            .unwrap_or_else(|| self.cyc2ns.boot_cpu())
    }
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
static SCHED_CLOCK: OnceCell<SchedClock<Tsc, Jiffies>> = OnceCell::uninit();

/// Install the process-wide clock on the CPU's own counter and the global
/// tick counter. `cpu_id` returns the current CPU number.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub fn init(config: ClockConfig, cpu_id: fn() -> usize) -> Result<(), ClockError> {
    let clock = SchedClock::new(Tsc, Jiffies, config)?.with_cpu_id(cpu_id);
    SCHED_CLOCK
        .try_init_once(|| clock)
        .map_err(|_| ClockError::AlreadyInitialized)?;

    log::info!(
        "sched_clock: initialized, fallback {} Hz, scale factor 2^{}",
        config.fallback_hz,
        config.scale_factor
    );
    Ok(())
}

/// Scheduler clock in nanoseconds.
///
/// Before [`init`] this is the tick counter under the default configuration.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
#[inline]
pub fn sched_clock() -> u64 {
    match SCHED_CLOCK.get() {
        Some(clock) => clock.now_ns(),
        None => ticks_to_ns(get_ticks(), &ClockConfig::DEFAULT),
    }
}

/// Convert `cycles` with the current CPU's active segment. Identity before
/// [`init`].
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
#[inline]
pub fn cycles_2_ns(cycles: u64) -> u64 {
    match SCHED_CLOCK.get() {
        Some(clock) => clock.cycles_to_ns(cycles),
        None => cycles,
    }
}

/// Frequency-change notification for the current CPU.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub fn recalibrate(cycles_per_second: u64, at_cycles: u64) -> Result<Cyc2NsData, ClockError> {
    global()?.recalibrate(cycles_per_second, at_cycles)
}

/// Select the hardware path (`true`) or the tick fallback (`false`).
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub fn set_active_path(hardware_enabled: bool) -> Result<(), ClockError> {
    global()?.set_active_path(hardware_enabled);
    Ok(())
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub fn using_hardware_clock() -> bool {
    SCHED_CLOCK
        .get()
        .map_or(false, |clock| clock.using_hardware_clock())
}

/// Log the state of the process-wide clock.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub fn debug_clock_info() {
    match SCHED_CLOCK.get() {
        Some(clock) => clock.debug_info(),
        None => log::info!("sched_clock: not initialized, {} ticks", get_ticks()),
    }
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn global() -> Result<&'static SchedClock<Tsc, Jiffies>, ClockError> {
    SCHED_CLOCK.get().ok_or(ClockError::NotInitialized)
}
