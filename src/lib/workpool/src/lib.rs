//! Worker-thread pool for barrier-synchronized simulation rounds.
//!
//! A simulation round runs the same closure once on every worker thread, and
//! the round is over only when every thread has finished. A general-purpose
//! thread pool is a poor fit for this: submitting one task per round per
//! thread costs an allocation and a queue operation per task, and gives no
//! natural way to say "everyone runs *this*, then we all meet at the end".
//!
//! [`WorkerPool`] instead spawns its threads once and then, per round, hands
//! all of them a single shared closure. Threads block on a reusable
//! generation latch between rounds and count down on a shared latch when the
//! closure returns, so the caller's [`WorkerPool::scope`] does not exit
//! until the whole pool is idle again. That end-of-scope wait is the round
//! barrier the simulator relies on.
//!
//! ```
//! # use std::sync::atomic::{AtomicU32, Ordering};
//! # use workpool::WorkerPool;
//! let mut pool = WorkerPool::new(2, "worker");
//!
//! let counter = AtomicU32::new(0);
//!
//! pool.scope(|s| {
//!     s.run(|thread_idx| {
//!         let _ = thread_idx;
//!         counter.fetch_add(1, Ordering::Relaxed);
//!     });
//!     // the main thread may do other work here; the scope blocks on exit
//! });
//!
//! assert_eq!(counter.load(Ordering::Relaxed), 2);
//! ```
//!
//! Unsafe code is confined to the pool itself. The lifetime handling around
//! [`pool::TaskRunner`] is delicate (it must stay invariant over the scope
//! lifetime); callers get a safe interface and should not need to reason
//! about it.

// https://github.com/rust-lang/rfcs/blob/master/text/2585-unsafe-block-in-unsafe-fn.md
#![deny(unsafe_op_in_unsafe_fn)]

pub mod pool;
pub mod sync;

pub use pool::{TaskRunner, WorkerPool};
