mod cancel;
mod config;
mod controller;
mod cycle;
mod error;
mod logging;
mod phase_channel;
mod registry;
mod sim;
mod types;

use config::TimingMode;

fn print_usage(program: &str) {
    println!("Traffic light CLI");
    println!("Usage:");
    println!("  {program} [demo] [vehicles] [seed]");
    println!("  {program} bench [cycles] [min_ms] [max_ms] [mode] [seed]");
    println!("  {program} --help");
    println!();
    println!("Use \"-\" for any positional value to keep its default.");
    println!("Defaults:");
    println!("  demo   vehicles=3 cycle=40..60ms");
    println!("  bench  cycles=200 min_ms=5 max_ms=15 mode=polling");
    println!("Modes:");
    println!("  polling  sleep 1ms between elapsed-time checks");
    println!("  timed    block until the phase is due");
}

fn exit_with_usage(program: &str, message: &str) -> ! {
    eprintln!("{message}");
    print_usage(program);
    std::process::exit(2);
}

/// Parse an optional positional value; "-" or a missing arg keeps the default.
fn parse_arg<T: std::str::FromStr>(program: &str, name: &str, arg: Option<String>) -> Option<T> {
    match arg.as_deref() {
        None | Some("-") => None,
        Some(value) => match value.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => exit_with_usage(program, &format!("invalid {name} value: {value}")),
        },
    }
}

fn main() {
    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "traffic_light".to_string());
    let mut args = std::env::args().skip(1);
    let result = match args.next().as_deref() {
        Some("bench") => {
            let cycles = parse_arg::<usize>(&program, "cycles", args.next());
            if cycles.is_some_and(|cycles| cycles < 2) {
                exit_with_usage(&program, "bench: cycles must be >= 2");
            }
            let min_ms = parse_arg::<u64>(&program, "min_ms", args.next());
            let max_ms = parse_arg::<u64>(&program, "max_ms", args.next());
            let mode = match args.next().as_deref() {
                None | Some("-") => None,
                Some(value) => match TimingMode::parse(value) {
                    Some(mode) => Some(mode),
                    None => exit_with_usage(&program, &format!("bench: invalid mode: {value}")),
                },
            };
            let seed = parse_arg::<u64>(&program, "seed", args.next());
            if let Some(extra) = args.next() {
                exit_with_usage(&program, &format!("bench: unexpected argument: {extra}"));
            }
            sim::run_bench(cycles, min_ms, max_ms, mode, seed)
        }
        Some("demo") => {
            let vehicles = parse_arg::<usize>(&program, "vehicles", args.next());
            let seed = parse_arg::<u64>(&program, "seed", args.next());
            if let Some(extra) = args.next() {
                exit_with_usage(&program, &format!("demo: unexpected argument: {extra}"));
            }
            sim::run_demo(vehicles, seed)
        }
        Some("--help") | Some("-h") | Some("help") => {
            print_usage(&program);
            Ok(())
        }
        Some(other) => exit_with_usage(&program, &format!("unknown command: {other}")),
        None => sim::run_demo(None, None),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
