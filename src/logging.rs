use std::sync::OnceLock;
use std::thread;
use std::time::Instant;

// Timestamps are relative to the first trace so cycle intervals read directly.
static EPOCH: OnceLock<Instant> = OnceLock::new();

pub fn dev_log(message: &str) {
    if !cfg!(debug_assertions) {
        return;
    }

    let epoch = EPOCH.get_or_init(Instant::now);
    let ms = epoch.elapsed().as_millis();
    let current = thread::current();
    let thread_name = current.name().unwrap_or("unnamed");
    println!("[{ms:>6}ms][{thread_name}] {message}");
}

#[macro_export]
macro_rules! log_dev {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) {
            $crate::logging::dev_log(&format!($($arg)*));
        }
    };
}
