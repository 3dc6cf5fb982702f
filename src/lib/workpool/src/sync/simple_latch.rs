use std::sync::{Arc, Condvar, Mutex};

/// A reusable latch that many waiters can block on until it is opened.
///
/// The latch is generational: every [`open()`](Latch::open) starts a new
/// generation, and a waiter's [`wait()`](LatchWaiter::wait) returns once the
/// latch generation has advanced past the waiter's own. The latch must not
/// be opened again until every waiter has waited for the current generation;
/// keeping them in sync is the caller's job (the pool does it by counting
/// task completions), and a lapped waiter panics rather than silently
/// skipping a generation.
#[derive(Debug)]
pub struct Latch {
    inner: Arc<LatchInner>,
}

/// A waiter for a [`Latch`], created with [`Latch::waiter`]. Cloning a
/// waiter produces a new waiter at the same generation.
#[derive(Debug, Clone)]
pub struct LatchWaiter {
    /// The generation this waiter is waiting to see completed.
    gen: u64,
    inner: Arc<LatchInner>,
}

#[derive(Debug)]
struct LatchInner {
    /// Number of times the latch has been opened.
    gen: Mutex<u64>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LatchInner {
                gen: Mutex::new(0),
                cond: Condvar::new(),
            }),
        }
    }

    /// Get a new waiter at the latch's current generation, so that a single
    /// [`wait()`](LatchWaiter::wait) blocks until the next
    /// [`open()`](Self::open).
    pub fn waiter(&self) -> LatchWaiter {
        LatchWaiter {
            gen: *self.inner.gen.lock().unwrap(),
            inner: Arc::clone(&self.inner),
        }
    }

    /// Open the latch, waking all waiters of the current generation.
    pub fn open(&mut self) {
        let mut gen = self.inner.gen.lock().unwrap();
        *gen = gen.checked_add(1).unwrap();
        self.inner.cond.notify_all();
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl LatchWaiter {
    /// Wait for the latch to open.
    pub fn wait(&mut self) {
        let gen = self.inner.gen.lock().unwrap();
        let gen = self
            .inner
            .cond
            .wait_while(gen, |gen| *gen == self.gen)
            .unwrap();

        // a difference greater than one means the latch was opened again
        // before we waited, and we've lost a generation
        assert!(
            *gen == self.gen + 1,
            "Latch was opened multiple times without this waiter waiting \
             (waiter at generation {}, latch at {})",
            self.gen,
            *gen,
        );

        self.gen += 1;
    }
}
