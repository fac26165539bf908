//! Host-side concurrency tests for the per-CPU cycles to ns records.
//!
//! Real threads stand in for interrupt contexts: the protocol has to hold
//! against genuine parallel readers too.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use sched_clock::{ClockConfig, Cyc2Ns, Cyc2NsData, SchedClock};

/// Every published record is derived from its multiplier, so a reader can
/// tell whether the fields it got came from one publish.
fn record(generation: u32) -> Cyc2NsData {
    Cyc2NsData::new(
        generation,
        generation % 31 + 1,
        (generation as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
    )
}

fn is_whole(data: &Cyc2NsData) -> bool {
    *data == record(data.mul)
}

#[test]
fn test_no_torn_reads() {
    const PUBLISHES: u32 = 200_000;

    let store = Cyc2Ns::new(record(0));
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let mut reads = 0u64;
                let mut last = 0u32;
                while !done.load(Ordering::Relaxed) || reads == 0 {
                    let data = store.read_begin();
                    store.read_end();
                    assert!(is_whole(&data), "torn read: {:?}", data);
                    // Single writer publishing in order: never go back
                    assert!(data.mul >= last, "went back from {} to {}", last, data.mul);
                    last = data.mul;
                    reads += 1;
                }
            });
        }

        s.spawn(|| {
            for generation in 1..=PUBLISHES {
                store.publish(record(generation));
            }
            done.store(true, Ordering::Relaxed);
        });
    });

    let data = store.read_begin();
    store.read_end();
    assert_eq!(data, record(PUBLISHES));
    assert_eq!(store.sequence(), PUBLISHES * 2);
}

thread_local! {
    static CPU: Cell<usize> = const { Cell::new(0) };
}

fn this_cpu() -> usize {
    CPU.with(|cpu| cpu.get())
}

#[test]
fn test_cpus_recalibrate_independently() {
    const CPUS: usize = 8;

    let cycles = AtomicU64::new(0);
    let clock = SchedClock::new(
        || cycles.load(Ordering::Relaxed),
        || 0u64,
        ClockConfig::DEFAULT,
    )
    .unwrap()
    .with_cpu_id(this_cpu);
    clock.set_active_path(true);

    thread::scope(|s| {
        for cpu in 0..CPUS {
            let clock = &clock;
            s.spawn(move || {
                CPU.with(|c| c.set(cpu));
                // CPU n runs at (n + 1) GHz from cycle 0
                let hz = (cpu as u64 + 1) * 1_000_000_000;
                for _ in 0..1_000 {
                    clock.recalibrate_cpu(cpu, hz, 0).unwrap();
                    let ns = clock.cycles_to_ns(hz);
                    // Multiplier rounding at shift 10 is worth up to ~0.2%
                    assert!(ns.abs_diff(1_000_000_000) < 5_000_000, "cpu {}: {}", cpu, ns);
                }
            });
        }
    });

    for cpu in 0..CPUS {
        let data = clock.cpu_data(cpu).unwrap();
        let hz = (cpu as u64 + 1) * 1_000_000_000;
        assert!(data.to_ns(hz).abs_diff(1_000_000_000) < 5_000_000);
    }
    // Untouched CPUs stay on the identity segment
    assert_eq!(clock.cpu_data(CPUS).unwrap(), Cyc2NsData::identity(10));
}

#[test]
fn test_readers_race_recalibration_without_jumps() {
    let cycles = AtomicU64::new(1_000_000_000);
    let stop = AtomicBool::new(false);
    let clock = SchedClock::new(
        || cycles.load(Ordering::Relaxed),
        || 0u64,
        ClockConfig::DEFAULT,
    )
    .unwrap();
    clock.set_active_path(true);
    clock.recalibrate(2_000_000_000, 0).unwrap();

    // Counter frozen at 1e9 cycles: every reading must be the value at the
    // switch point, whichever segment the reader lands on.
    let expected = clock.now_ns();
    assert_eq!(expected, 500_000_000);

    thread::scope(|s| {
        for _ in 0..3 {
            s.spawn(|| {
                while !stop.load(Ordering::Relaxed) {
                    assert_eq!(clock.now_ns(), expected);
                }
            });
        }

        s.spawn(|| {
            let rates = [3_000_000_000u64, 1_200_000_000, 2_600_000_000, 900_000_000];
            for i in 0..20_000 {
                clock
                    .recalibrate(rates[i % rates.len()], 1_000_000_000)
                    .unwrap();
            }
            stop.store(true, Ordering::Relaxed);
        });
    });
}
