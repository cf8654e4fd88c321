//! Demo and timing bench runners for the traffic light CLI.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{CycleConfig, TimingMode};
use crate::controller::TrafficLightController;
use crate::error::LightError;
use crate::log_dev;
use crate::registry::{SimulationHost, ThreadRegistry};
use crate::types::Phase;

// Demo timing knobs (small for quick CLI feedback).
const DEMO_MIN_CYCLE_MS: u64 = 40;
const DEMO_MAX_CYCLE_MS: u64 = 60;
const DEMO_VEHICLES: usize = 3;
// Bench defaults: enough cycles for a stable mean without a long run.
const BENCH_CYCLES: usize = 200;
const BENCH_MIN_CYCLE_MS: u64 = 5;
const BENCH_MAX_CYCLE_MS: u64 = 15;

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let usage = unsafe { usage.assume_init() };
    let seconds = |tv: libc::timeval| tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0;
    Some((seconds(usage.ru_utime), seconds(usage.ru_stime)))
}

/// Stub on non-Unix platforms.
#[cfg(not(unix))]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

/// Run one light with a few vehicles that each wait for their own green.
pub fn run_demo(vehicles: Option<usize>, seed: Option<u64>) -> Result<(), LightError> {
    let vehicles = vehicles.unwrap_or(DEMO_VEHICLES);
    log_dev!("[DEMO] start vehicles={vehicles}");

    let registry = Arc::new(ThreadRegistry::new());
    let config = CycleConfig::with_range(DEMO_MIN_CYCLE_MS, DEMO_MAX_CYCLE_MS);
    let light = Arc::new(TrafficLightController::with_config(
        registry.clone(),
        config,
        seed,
    )?);

    let passed = Arc::new(AtomicUsize::new(0));
    let green_on_pass = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..vehicles {
        let vehicle_id = registry.new_id();
        let light = Arc::clone(&light);
        let passed = Arc::clone(&passed);
        let green_on_pass = Arc::clone(&green_on_pass);
        let handle = thread::Builder::new()
            .name(format!("vehicle-{vehicle_id}"))
            .spawn(move || {
                log_dev!("[VEHICLE] #{vehicle_id} waiting at light #{}", light.id());
                if light.wait_for_green().is_err() {
                    log_dev!("[VEHICLE] #{vehicle_id} light stopped before green");
                    return;
                }
                if light.current_phase() == Phase::Green {
                    green_on_pass.fetch_add(1, Ordering::SeqCst);
                }
                passed.fetch_add(1, Ordering::SeqCst);
                log_dev!("[VEHICLE] #{vehicle_id} crossed");
            })?;
        handles.push(handle);
    }

    let start = Instant::now();
    light.simulate()?;
    for handle in handles {
        handle.join().expect("vehicle thread panicked");
    }
    light.shutdown();
    let registered = registry.task_count();
    let panicked = registry.join_all();

    let transitions = light.transitions();
    let final_phase = light.current_phase();
    let expected_phase = if transitions % 2 == 0 {
        Phase::Red
    } else {
        Phase::Green
    };
    log_dev!(
        "[DEMO] finished in {}ms (dev logs suppressed in release mode)",
        start.elapsed().as_millis()
    );

    println!("DEMO SUMMARY");
    println!("light_id={} vehicles={vehicles}", light.id());
    println!("vehicles_passed={}", passed.load(Ordering::SeqCst));
    println!("green_on_pass={}", green_on_pass.load(Ordering::SeqCst));
    println!("transitions={transitions}");
    println!("final_phase={final_phase}");
    println!("alternation_ok={}", final_phase == expected_phase);
    println!("light_running={}", light.is_running());
    println!("registered_threads={registered}");
    println!("panicked_threads={panicked}");
    Ok(())
}

/// Aggregated timing from a single bench run.
struct BenchResult {
    cycles: usize,
    config: CycleConfig,
    interval_min_ms: f64,
    interval_mean_ms: f64,
    interval_max_ms: f64,
    out_of_range: usize,
    alternation_errors: usize,
    cpu_user_s: Option<f64>,
    cpu_sys_s: Option<f64>,
}

fn bench_once(
    cycles: usize,
    config: CycleConfig,
    seed: Option<u64>,
) -> Result<BenchResult, LightError> {
    let registry = Arc::new(ThreadRegistry::new());
    let light = TrafficLightController::with_config(registry.clone(), config.clone(), seed)?;

    let cpu_start = cpu_times_seconds();
    let start = Instant::now();
    light.simulate()?;

    let mut stamps = Vec::with_capacity(cycles);
    let mut previous = light.current_phase();
    let mut alternation_errors = 0usize;
    for _ in 0..cycles {
        let phase = light.next_phase()?;
        stamps.push(start.elapsed());
        if phase != previous.toggled() {
            alternation_errors += 1;
        }
        previous = phase;
    }
    light.shutdown();
    registry.join_all();

    let (cpu_user_s, cpu_sys_s) = match (cpu_start, cpu_times_seconds()) {
        (Some((user_start, sys_start)), Some((user_end, sys_end))) => {
            (Some(user_end - user_start), Some(sys_end - sys_start))
        }
        _ => (None, None),
    };

    let intervals: Vec<Duration> = stamps.windows(2).map(|pair| pair[1] - pair[0]).collect();
    let low = Duration::from_millis(config.min_cycle_ms);
    let slack = match config.mode {
        TimingMode::Polling => config.poll_slice(),
        TimingMode::Timed => Duration::ZERO,
    };
    let high = Duration::from_millis(config.max_cycle_ms) + slack;
    // Measured on the receiving side, so a wakeup delay shows up here too.
    let out_of_range = intervals
        .iter()
        .filter(|interval| **interval < low || **interval > high)
        .count();

    let as_ms = |d: &Duration| d.as_secs_f64() * 1000.0;
    let interval_min_ms = intervals.iter().map(as_ms).fold(f64::INFINITY, f64::min);
    let interval_max_ms = intervals.iter().map(as_ms).fold(0.0, f64::max);
    let interval_mean_ms = if intervals.is_empty() {
        0.0
    } else {
        intervals.iter().map(as_ms).sum::<f64>() / intervals.len() as f64
    };

    Ok(BenchResult {
        cycles,
        config,
        interval_min_ms: if intervals.is_empty() { 0.0 } else { interval_min_ms },
        interval_mean_ms,
        interval_max_ms,
        out_of_range,
        alternation_errors,
        cpu_user_s,
        cpu_sys_s,
    })
}

/// Record phase changes with the given timing and print interval stats as CSV.
pub fn run_bench(
    cycles: Option<usize>,
    min_ms: Option<u64>,
    max_ms: Option<u64>,
    mode: Option<TimingMode>,
    seed: Option<u64>,
) -> Result<(), LightError> {
    let cycles = cycles.unwrap_or(BENCH_CYCLES);
    debug_assert!(cycles >= 2, "cycles must be >= 2");
    let config = CycleConfig::with_range(
        min_ms.unwrap_or(BENCH_MIN_CYCLE_MS),
        max_ms.unwrap_or(BENCH_MAX_CYCLE_MS),
    )
    .mode(mode.unwrap_or(TimingMode::Polling));

    let result = bench_once(cycles, config, seed)?;

    println!(
        "cycles,mode,min_ms,max_ms,interval_min_ms,interval_mean_ms,interval_max_ms,out_of_range,alternation_errors,cpu_user_s,cpu_sys_s"
    );
    let cpu_user = result
        .cpu_user_s
        .map(|v| format!("{v:.4}"))
        .unwrap_or_else(|| "NA".to_string());
    let cpu_sys = result
        .cpu_sys_s
        .map(|v| format!("{v:.4}"))
        .unwrap_or_else(|| "NA".to_string());
    println!(
        "{},{},{},{},{:.2},{:.2},{:.2},{},{},{},{}",
        result.cycles,
        result.config.mode.as_str(),
        result.config.min_cycle_ms,
        result.config.max_cycle_ms,
        result.interval_min_ms,
        result.interval_mean_ms,
        result.interval_max_ms,
        result.out_of_range,
        result.alternation_errors,
        cpu_user,
        cpu_sys
    );
    if result.alternation_errors > 0 {
        eprintln!("# violation,phase_alternation");
    }
    Ok(())
}
