use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;

use crate::sync::count_down_latch::{self, build_count_down_latch};
use crate::sync::simple_latch;

// If making substantial changes to this pool, check the commented
// compile-fail doctests at the end of this file. The pool unsafely
// transmutes the task closure lifetime, and those tests make sure that
// unsound usage fails to compile. Due to lifetime sub-typing/variance, rust
// will sometimes accept closures with shorter or longer lifetimes than the
// API names, so the tests check that the closures are invariant over the
// lifetime and that the usage is sound.

/// A task run by every pool thread once per scope.
pub trait TaskFn: Fn(usize) + Send + Sync {}
impl<T> TaskFn for T where T: Fn(usize) + Send + Sync {}

/// A pool of threads that all run the same task, once per thread per round.
pub struct WorkerPool {
    /// Handles for joining threads when they've exited.
    thread_handles: Vec<std::thread::JoinHandle<()>>,
    /// State shared between all threads.
    shared_state: Arc<SharedState>,
    /// Opened when a task has been set; tells the threads to start running.
    task_start_latch: simple_latch::Latch,
    /// The main thread uses this to wait for the task to finish everywhere.
    task_end_waiter: count_down_latch::LatchWaiter,
}

struct SharedState {
    /// The task to run during the next round. `None` tells threads to exit.
    task: AtomicRefCell<Option<Box<dyn TaskFn>>>,
    /// Has a thread panicked?
    has_thread_panicked: AtomicBool,
}

impl WorkerPool {
    /// Spawn `num_threads` threads named `thread_name`. Threads are spawned
    /// immediately and block until the first task is set.
    pub fn new(num_threads: usize, thread_name: &str) -> Self {
        let shared_state = Arc::new(SharedState {
            task: AtomicRefCell::new(None),
            has_thread_panicked: AtomicBool::new(false),
        });

        let (task_end_counter, task_end_waiter) = build_count_down_latch();
        let task_start_latch = simple_latch::Latch::new();

        let mut thread_handles = Vec::with_capacity(num_threads);

        for i in 0..num_threads {
            let shared_state = Arc::clone(&shared_state);
            let task_start_waiter = task_start_latch.waiter();
            let task_end_counter = task_end_counter.clone();

            let handle = std::thread::Builder::new()
                .name(thread_name.to_string())
                .spawn(move || work_loop(i, shared_state, task_start_waiter, task_end_counter))
                .unwrap();

            thread_handles.push(handle);
        }

        Self {
            thread_handles,
            shared_state,
            task_start_latch,
            task_end_waiter,
        }
    }

    pub fn num_threads(&self) -> usize {
        self.thread_handles.len()
    }

    /// Stop and join the threads.
    pub fn join(self) {
        // the drop handler joins the threads
    }

    fn join_internal(&mut self) {
        // a `None` task tells the threads to exit
        assert!(self.shared_state.task.borrow().is_none());

        // only check the join return values if no thread has already
        // panicked; a panicking thread has already poisoned the pool
        let check_for_errors = !self.shared_state.has_thread_panicked.load(Ordering::Relaxed);

        // release the threads so they can see the `None` and exit
        self.task_start_latch.open();

        for handle in self.thread_handles.drain(..) {
            let result = handle.join();
            if check_for_errors {
                result.expect("A pool thread panicked while stopping");
            }
        }
    }

    /// Create a new scope for the pool. Any task run within the scope is
    /// guaranteed to have completed on all threads before the scope returns.
    //
    // SAFETY: This works because:
    //
    // 1. WorkerScope<'scope> is covariant over 'scope.
    // 2. TaskRunner<'a, 'scope> is invariant over WorkerScope<'scope>, so
    //    TaskRunner<'a, 'scope> is invariant over 'scope.
    // 3. FnOnce(TaskRunner<'a, 'scope>) is contravariant over
    //    TaskRunner<'a, 'scope>, so FnOnce(TaskRunner<'a, 'scope>) is
    //    invariant over 'scope.
    //
    // The provided closure therefore cannot take a TaskRunner<'a, 'scope2>
    // where 'scope2 is shorter than 'scope, so 'scope must span this call.
    // Were TaskRunner covariant over 'scope, a closure could capture data
    // with a lifetime shorter than the scope closure's own, and captured
    // mutable references would be reachable from both closures at once.
    pub fn scope<'scope>(&'scope mut self, f: impl for<'a> FnOnce(TaskRunner<'a, 'scope>) + 'scope) {
        assert!(
            !self.shared_state.has_thread_panicked.load(Ordering::Relaxed),
            "Attempting to use a worker pool that previously panicked"
        );

        // makes sure the task is cleared even if `f` panics
        let mut scope = WorkerScope::<'scope> {
            pool: self,
            _phantom: Default::default(),
        };

        let runner = TaskRunner { scope: &mut scope };

        f(runner);
    }
}

impl std::ops::Drop for WorkerPool {
    fn drop(&mut self) {
        self.join_internal();
    }
}

struct WorkerScope<'scope> {
    pool: &'scope mut WorkerPool,
    // when we are dropped, it's like dropping the task
    _phantom: PhantomData<Box<dyn TaskFn + 'scope>>,
}

impl<'a> std::ops::Drop for WorkerScope<'a> {
    fn drop(&mut self) {
        // if a task was set (`TaskRunner::run` was called)
        if self.pool.shared_state.task.borrow().is_some() {
            // wait for the task to complete on all threads
            self.pool.task_end_waiter.wait();

            *self.pool.shared_state.task.borrow_mut() = None;

            // generally following https://docs.rs/rayon/latest/rayon/fn.scope.html#panics
            if self
                .pool
                .shared_state
                .has_thread_panicked
                .load(Ordering::Relaxed)
            {
                panic!("A worker thread panicked");
            }
        }
    }
}

/// Allows a single task to be run per pool scope.
pub struct TaskRunner<'a, 'scope> {
    // SAFETY: Self must be invariant over 'scope, which is why we use &mut
    // here. See the documentation for scope() above.
    scope: &'a mut WorkerScope<'scope>,
}

impl<'a, 'scope> TaskRunner<'a, 'scope> {
    /// Run `f` on every pool thread. `f` receives the thread's index.
    pub fn run(self, f: impl TaskFn + 'scope) {
        let f = Box::new(f);

        // SAFETY: WorkerScope drops this TaskFn before the end of 'scope
        let f = unsafe {
            std::mem::transmute::<Box<dyn TaskFn + 'scope>, Box<dyn TaskFn + 'static>>(f)
        };

        *self.scope.pool.shared_state.task.borrow_mut() = Some(f);

        // the task is set, so start the threads
        self.scope.pool.task_start_latch.open();
    }
}

fn work_loop(
    thread_index: usize,
    shared_state: Arc<SharedState>,
    mut start_waiter: simple_latch::LatchWaiter,
    mut end_counter: count_down_latch::LatchCounter,
) {
    // We don't use `catch_unwind` here: it would require `TaskFn` to be
    // `UnwindSafe` (ruling out interior mutability in tasks), and a
    // `panic_any` payload whose Drop panics would escape the catch anyway
    // and deadlock the pool. Instead a panicking thread marks the pool as
    // poisoned on unwind and the main thread re-panics when the scope ends.
    // https://github.com/rust-lang/rust/issues/86027

    struct PoisonWhenDropped<'a>(&'a SharedState);

    impl<'a> std::ops::Drop for PoisonWhenDropped<'a> {
        fn drop(&mut self) {
            // if we panicked, inform other threads and let them exit cleanly
            self.0.has_thread_panicked.store(true, Ordering::Relaxed);
        }
    }

    let shared_state = shared_state.as_ref();
    let poison_when_dropped = PoisonWhenDropped(shared_state);

    loop {
        // wait for a new task
        start_waiter.wait();

        // scope makes sure we drop the task borrow before counting down
        {
            match shared_state.task.borrow().deref() {
                Some(task) => (task)(thread_index),
                None => {
                    // received the exit sentinel
                    break;
                }
            };
        }

        end_counter.count_down();
    }

    // didn't panic, so forget the poison handler and return normally
    std::mem::forget(poison_when_dropped);
}

#[cfg(any(test, doctest))]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    #[test]
    fn test_scope() {
        let mut pool = WorkerPool::new(4, "worker");

        let mut counter = 0u32;
        for _ in 0..3 {
            pool.scope(|_| {
                counter += 1;
            });
        }

        assert_eq!(counter, 3);
    }

    #[test]
    fn test_run() {
        let mut pool = WorkerPool::new(4, "worker");

        let counter = AtomicU32::new(0);
        for _ in 0..3 {
            pool.scope(|s| {
                s.run(|_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            });
        }

        assert_eq!(counter.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn test_single_thread() {
        let mut pool = WorkerPool::new(1, "worker");

        let counter = AtomicU32::new(0);
        for _ in 0..5 {
            pool.scope(|s| {
                s.run(|i| {
                    assert_eq!(i, 0);
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            });
        }

        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_scope_runner_order() {
        let mut pool = WorkerPool::new(1, "worker");

        let flag = AtomicBool::new(false);
        pool.scope(|s| {
            s.run(|_| {
                std::thread::sleep(std::time::Duration::from_millis(10));
                flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .unwrap();
            });
            // the task may not have run yet; the scope end waits for it
            assert!(!flag.load(Ordering::SeqCst));
        });

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_non_aliasing_borrows() {
        let mut pool = WorkerPool::new(4, "worker");

        let mut counter = 0;
        pool.scope(|s| {
            counter += 1;
            s.run(|_| {
                let _x = counter;
            });
        });

        assert_eq!(counter, 1);
    }

    // should not compile: "cannot assign to `counter` because it is borrowed"
    /// ```compile_fail
    /// # use workpool::WorkerPool;
    /// let mut pool = WorkerPool::new(4, "worker");
    ///
    /// let mut counter = 0;
    /// pool.scope(|s| {
    ///     s.run(|_| {
    ///         let _x = counter;
    ///     });
    ///     counter += 1;
    /// });
    ///
    /// assert_eq!(counter, 1);
    /// ```
    fn _test_aliasing_borrows() {}

    #[test]
    #[should_panic]
    fn test_panic_all() {
        let mut pool = WorkerPool::new(4, "worker");

        pool.scope(|s| {
            s.run(|i| {
                // all threads panic
                panic!("{}", i);
            });
        });
    }

    #[test]
    #[should_panic]
    fn test_panic_single() {
        let mut pool = WorkerPool::new(4, "worker");

        pool.scope(|s| {
            s.run(|i| {
                // one thread panics
                if i == 2 {
                    panic!("{}", i);
                }
            });
        });
    }

    // should not compile: "`x` does not live long enough"
    /// ```compile_fail
    /// # use workpool::WorkerPool;
    /// let mut pool = WorkerPool::new(4, "worker");
    ///
    /// let x = 5;
    /// pool.scope(|s| {
    ///     s.run(|_| {
    ///         std::panic::panic_any(&x);
    ///     });
    /// });
    /// ```
    fn _test_panic_any() {}

    // should not compile: "closure may outlive the current function, but it
    // borrows `x`, which is owned by the current function"
    /// ```compile_fail
    /// # use workpool::WorkerPool;
    /// let mut pool = WorkerPool::new(4, "worker");
    ///
    /// pool.scope(|s| {
    ///     // 'x' is dropped when the closure is, but 's' lives longer
    ///     let x = 5;
    ///     s.run(|_| {
    ///         let _x = x;
    ///     });
    /// });
    /// ```
    fn _test_scope_lifetime() {}
}
