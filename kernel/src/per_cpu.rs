//! Per-CPU clock state
//!
//! Each CPU owns one slot of a `PerCpu<T>` array and only ever touches its
//! own slot. Slots are cache-line aligned so that one CPU publishing new
//! coefficients never bounces the line another CPU is reading from.
//!
//! The embedding kernel also registers its preemption-control primitives
//! here. Readers bracket their critical section with them the same way a
//! spinlock bumps preempt_count; until hooks are registered the bracket
//! compiles down to nothing.

use conquer_once::spin::OnceCell;

use crate::error::ClockError;

/// Number of per-CPU slots.
pub const MAX_CPUS: usize = 64;

#[repr(C, align(64))]
pub struct CacheAligned<T>(pub T);

/// One `T` per CPU, indexed by CPU number.
pub struct PerCpu<T> {
    slots: [CacheAligned<T>; MAX_CPUS],
}

impl<T> PerCpu<T> {
    /// Build every CPU's slot from its index.
    pub fn from_fn(mut init: impl FnMut(usize) -> T) -> Self {
        Self {
            slots: core::array::from_fn(|cpu| CacheAligned(init(cpu))),
        }
    }

    /// Slot for `cpu`, or `None` if the index has no slot.
    #[inline]
    pub fn get(&self, cpu: usize) -> Option<&T> {
        self.slots.get(cpu).map(|slot| &slot.0)
    }

    /// Like [`PerCpu::get`] but reports a bad index as an error.
    pub fn try_get(&self, cpu: usize) -> Result<&T, ClockError> {
        self.get(cpu).ok_or(ClockError::CpuOutOfRange {
            cpu,
            max: MAX_CPUS,
        })
    }

    /// The boot CPU's slot.
    #[inline]
    pub fn boot_cpu(&self) -> &T {
        &self.slots[0].0
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate().map(|(cpu, slot)| (cpu, &slot.0))
    }
}

/// Preemption-control primitives supplied by the embedding kernel.
#[derive(Clone, Copy)]
pub struct PreemptHooks {
    pub disable: fn(),
    pub enable: fn(),
}

static PREEMPT_HOOKS: OnceCell<PreemptHooks> = OnceCell::uninit();

/// Register the kernel's preempt_disable/preempt_enable pair.
///
/// Can only be done once; later registrations are ignored and reported.
pub fn register_preempt_hooks(hooks: PreemptHooks) -> Result<(), ClockError> {
    PREEMPT_HOOKS
        .try_init_once(|| hooks)
        .map_err(|_| ClockError::AlreadyInitialized)
}

/// Disable preemption if the kernel registered a hook for it.
#[inline]
pub fn preempt_disable() {
    if let Some(hooks) = PREEMPT_HOOKS.get() {
        (hooks.disable)();
    }
}

/// Re-enable preemption if the kernel registered a hook for it.
#[inline]
pub fn preempt_enable() {
    if let Some(hooks) = PREEMPT_HOOKS.get() {
        (hooks.enable)();
    }
}

/// CPU number used when the kernel did not supply its own lookup.
#[inline]
pub fn boot_cpu_id() -> usize {
    0
}
