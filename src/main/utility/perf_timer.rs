use std::sync::atomic::{compiler_fence, Ordering};
use std::time::{Duration, Instant};

/// A start/stop stopwatch that accumulates elapsed wall time across runs.
pub struct PerfTimer {
    start_time: Option<Instant>,
    elapsed: Duration,
}

impl PerfTimer {
    /// Create a timer, and start it.
    pub fn new_started() -> Self {
        Self {
            start_time: Some(Instant::now()),
            elapsed: Duration::new(0, 0),
        }
    }

    /// Create a timer, but don't start it.
    pub fn new_stopped() -> Self {
        Self {
            start_time: None,
            elapsed: Duration::new(0, 0),
        }
    }

    /// Start the timer, which must not already be running.
    pub fn start(&mut self) {
        compiler_fence(Ordering::SeqCst);
        debug_assert!(self.start_time.is_none());
        self.start_time = Some(Instant::now());
        compiler_fence(Ordering::SeqCst);
    }

    /// Stop the timer, which must already be running. Returns the duration
    /// of this run.
    pub fn stop(&mut self) -> Duration {
        compiler_fence(Ordering::SeqCst);
        debug_assert!(self.start_time.is_some());
        let mut run = Duration::ZERO;
        if let Some(t) = self.start_time.take() {
            run = Instant::now().duration_since(t);
            self.elapsed += run;
        }
        compiler_fence(Ordering::SeqCst);
        run
    }

    /// Total time elapsed while the timer has been running.
    pub fn elapsed(&self) -> Duration {
        let mut e = self.elapsed;
        if let Some(t) = self.start_time.as_ref() {
            e += Instant::now().duration_since(*t)
        }
        e
    }
}

impl Default for PerfTimer {
    fn default() -> Self {
        Self::new_started()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates() {
        let mut timer = PerfTimer::new_stopped();
        assert_eq!(timer.elapsed(), Duration::ZERO);

        timer.start();
        std::thread::sleep(Duration::from_millis(5));
        timer.stop();

        let after_first = timer.elapsed();
        assert!(after_first >= Duration::from_millis(5));

        timer.start();
        std::thread::sleep(Duration::from_millis(5));
        timer.stop();

        assert!(timer.elapsed() >= after_first + Duration::from_millis(5));
    }
}
