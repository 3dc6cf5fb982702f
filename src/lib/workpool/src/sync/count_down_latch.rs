use std::sync::{Arc, Condvar, Mutex};

/// Build a count-down latch with one counter and one waiter. The counter can
/// be cloned so that each participating thread holds its own; the waiter
/// cannot, since the pool design only ever has a single thread waiting for a
/// round to end.
pub fn build_count_down_latch() -> (LatchCounter, LatchWaiter) {
    let inner = Arc::new(LatchInner {
        lock: Mutex::new(LatchState {
            generation: 0,
            counters: 1,
            total_counters: 1,
        }),
        cond: Condvar::new(),
    });

    let counter = LatchCounter {
        inner: Arc::clone(&inner),
        generation: 0,
    };

    let waiter = LatchWaiter {
        inner,
        generation: 0,
    };

    (counter, waiter)
}

/// A latch counter.
///
/// A cloned counter inherits the state of the original for the current
/// generation: cloning after counting down yields a counter that is also
/// considered counted-down for this generation, cloning before yields one
/// that must still count down.
#[derive(Debug)]
pub struct LatchCounter {
    inner: Arc<LatchInner>,
    /// The count-down round this counter will participate in next.
    generation: u64,
}

/// The latch waiter. Exactly one exists per latch.
#[derive(Debug)]
pub struct LatchWaiter {
    inner: Arc<LatchInner>,
    /// The count-down round this waiter will wait on next.
    generation: u64,
}

#[derive(Debug)]
struct LatchInner {
    lock: Mutex<LatchState>,
    cond: Condvar,
}

#[derive(Debug)]
struct LatchState {
    /// The current latch round.
    generation: u64,
    /// Counters that have not yet counted down this round.
    counters: usize,
    /// Total number of live counters.
    total_counters: usize,
}

impl LatchCounter {
    /// Decrement the latch count, waking the waiter when it reaches zero.
    /// Must be called exactly once per generation; calling it again before
    /// the waiter has waited panics.
    pub fn count_down(&mut self) {
        let counters = {
            let mut state = self.inner.lock.lock().unwrap();

            assert!(
                self.generation == state.generation,
                "Counter generation does not match latch generation ({} != {})",
                self.generation,
                state.generation,
            );

            state.counters = state.counters.checked_sub(1).unwrap();
            state.counters
        };

        if counters == 0 {
            self.inner.cond.notify_all();
        }

        self.generation += 1;
    }
}

impl LatchWaiter {
    /// Wait for all counters to count down, then start the next generation.
    pub fn wait(&mut self) {
        let state = self.inner.lock.lock().unwrap();

        let mut state = self
            .inner
            .cond
            .wait_while(state, |s| {
                self.generation != s.generation || s.counters > 0
            })
            .unwrap();

        // the single waiter is the only party that can advance the round
        state.counters = state.total_counters;
        state.generation += 1;

        self.generation += 1;
    }
}

impl Clone for LatchCounter {
    fn clone(&self) -> Self {
        let mut state = self.inner.lock.lock().unwrap();
        state.total_counters = state.total_counters.checked_add(1).unwrap();

        // if we haven't counted down yet this generation, neither has the clone
        if self.generation == state.generation {
            state.counters = state.counters.checked_add(1).unwrap();
        }

        LatchCounter {
            inner: Arc::clone(&self.inner),
            generation: self.generation,
        }
    }
}

impl std::ops::Drop for LatchCounter {
    fn drop(&mut self) {
        let mut state = self.inner.lock.lock().unwrap();
        state.total_counters = state.total_counters.checked_sub(1).unwrap();

        if self.generation == state.generation {
            state.counters = state.counters.checked_sub(1).unwrap();
        }

        if state.counters == 0 {
            self.inner.cond.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_single_thread() {
        let (mut counter, mut waiter) = build_count_down_latch();

        for _ in 0..3 {
            counter.count_down();
            waiter.wait();
        }
    }

    #[test]
    #[should_panic]
    fn test_double_count() {
        let (mut counter, mut _waiter) = build_count_down_latch();
        counter.count_down();
        counter.count_down();
    }

    #[test]
    fn test_clone_before_countdown() {
        let (mut counter, mut waiter) = build_count_down_latch();

        // the clone must also count down for the current generation
        let mut counter_clone = counter.clone();
        counter.count_down();
        counter_clone.count_down();
        waiter.wait();

        counter.count_down();
        counter_clone.count_down();
        waiter.wait();
    }

    #[test]
    fn test_clone_after_countdown() {
        let (mut counter, mut waiter) = build_count_down_latch();

        counter.count_down();
        // the clone is considered counted-down for the current generation;
        // if it counted down here, it would panic
        let mut counter_clone = counter.clone();
        waiter.wait();

        counter.count_down();
        counter_clone.count_down();
        waiter.wait();
    }

    #[test]
    fn test_drop_releases_waiter() {
        let (counter, mut waiter) = build_count_down_latch();
        let counter_clone = counter.clone();

        std::mem::drop(counter);
        std::mem::drop(counter_clone);

        // all counters are gone, so the count is zero and this must not block
        waiter.wait();
    }

    #[test]
    fn test_multi_thread() {
        use crate::sync::simple_latch::Latch;

        // the same shape the pool uses: a start latch gates each round, the
        // count-down latch ends it
        let mut start = Latch::new();
        let start_waiter = start.waiter();
        let (counter, mut waiter) = build_count_down_latch();

        let repeat = 30u32;
        let num_threads = 5u32;

        let total = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..num_threads)
            .map(|seed| {
                let mut start_waiter = start_waiter.clone();
                let mut counter = counter.clone();
                let total = Arc::clone(&total);
                std::thread::spawn(move || {
                    let mut rng = rand::rngs::StdRng::seed_from_u64(seed.into());
                    for _ in 0..repeat {
                        start_waiter.wait();
                        // randomized delays vary the order threads reach the latch
                        std::thread::sleep(Duration::from_millis(rng.gen_range(0..5)));
                        total.fetch_add(1, Ordering::Relaxed);
                        counter.count_down();
                    }
                })
            })
            .collect();

        // the originals don't participate
        std::mem::drop(counter);
        std::mem::drop(start_waiter);

        for round in 1..=repeat {
            start.open();
            waiter.wait();
            // every thread must have counted down before the wait returned
            assert_eq!(total.load(Ordering::Relaxed), num_threads * round);
        }

        for h in handles {
            h.join().unwrap();
        }
    }
}
