//! A logger that stamps every record with simulation context.
//!
//! Each line carries the wall-clock time since startup, the logging thread,
//! the current simulated time, and the host the worker is running, all read
//! from the worker's thread-local state. The logger itself takes no
//! simulator locks, so logging is safe from anywhere except inside a held
//! queue mutex (which the scheduler never does).

use std::io::Write;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use once_cell::sync::Lazy;

use crate::core::worker::Worker;
use crate::utility::time::TimeParts;

static SIM_LOGGER: Lazy<SimLogger> = Lazy::new(|| SimLogger {
    start: Instant::now(),
});

/// Initialize the logger. Call once, before the scheduler starts.
pub fn init(max_log_level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&*SIM_LOGGER)?;
    log::set_max_level(max_log_level);

    // arrange to flush on panic, so the record that explains the panic isn't
    // lost in a buffer
    let default_panic_handler = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        SIM_LOGGER.flush();
        default_panic_handler(panic_info);
    }));

    Ok(())
}

struct SimLogger {
    start: Instant,
}

impl Log for SimLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let wall_time = TimeParts::from_nanos(self.start.elapsed().as_nanos());

        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("-").to_string();

        // "n/a" outside of event execution (setup, between rounds)
        let sim_time = Worker::current_time()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "n/a".to_string());

        let host_name = Worker::active_host_info()
            .map(|info| info.name.clone())
            .unwrap_or_else(|| "-".to_string());

        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(
            stdout,
            "{} [{}] {} [{}] [{}] [{}] {}",
            wall_time.fmt_hr_min_sec_nano(),
            thread_name,
            sim_time,
            record.level(),
            host_name,
            record.module_path().unwrap_or("-"),
            record.args(),
        );

        if record.level() <= Level::Error {
            let _ = stdout.flush();
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().lock().flush();
    }
}
