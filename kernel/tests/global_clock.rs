//! The process-wide clock on the CPU's real cycle counter.
//!
//! Global state: everything runs inside one test so the steps happen in
//! order.

#![cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]

use sched_clock::time::{self, tsc};
use sched_clock::{ClockConfig, ClockError};

fn boot_cpu() -> usize {
    0
}

#[test]
fn test_global_clock_lifecycle() {
    // Before init: tick-based time under the default 1000 Hz configuration
    assert_eq!(time::recalibrate(1_000_000_000, 0), Err(ClockError::NotInitialized));
    assert_eq!(time::set_active_path(true), Err(ClockError::NotInitialized));
    assert!(!time::using_hardware_clock());
    assert_eq!(time::cycles_2_ns(1234), 1234);

    for _ in 0..100 {
        time::timer_interrupt();
    }
    assert_eq!(time::get_ticks(), 100);
    assert_eq!(time::sched_clock(), 100_000_000);

    time::init(ClockConfig::new(1000, 0), boot_cpu).unwrap();
    assert_eq!(
        time::init(ClockConfig::DEFAULT, boot_cpu),
        Err(ClockError::AlreadyInitialized)
    );

    // Path still undecided: ticks
    assert_eq!(time::sched_clock(), 100_000_000);
    time::timer_interrupt();
    assert_eq!(time::sched_clock(), 101_000_000);

    // Hardware path on the identity segment tracks the raw counter
    time::set_active_path(true).unwrap();
    assert!(time::using_hardware_clock());
    let before = tsc::read_tsc();
    let ns = time::sched_clock();
    let after = tsc::read_tsc();
    assert!(ns >= before && ns <= after, "{} not in [{}, {}]", ns, before, after);

    // Switch to a 2 GHz segment at the current counter value
    let at = tsc::read_tsc();
    let ns_at_switch = time::cycles_2_ns(at);
    let data = time::recalibrate(2_000_000_000, at).unwrap();
    assert_eq!(data.mul, 512);
    assert_eq!(time::cycles_2_ns(at), ns_at_switch);
    assert_eq!(time::cycles_2_ns(at + 2_000), ns_at_switch + 1_000);
    assert!(time::sched_clock() >= ns_at_switch);

    time::debug_clock_info();

    // Back to ticks
    time::set_active_path(false).unwrap();
    assert!(!time::using_hardware_clock());
    assert_eq!(time::sched_clock(), 101_000_000);
}
