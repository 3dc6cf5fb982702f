//! Round orchestration for the worker pool.
//!
//! The simulation advances in rounds. Each round has a barrier: an upper
//! bound on event time chosen so that nothing a host does below the barrier
//! can affect another host below it (inter-host effects are delayed by at
//! least the lookahead). Workers drain and execute everything below the
//! barrier in parallel, meet at the pool's latch, and the main loop advances
//! the clock to the barrier and picks the next one.

pub mod policy;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use workpool::WorkerPool;

use crate::core::support::emulated_time::EmulatedTime;
use crate::core::support::simulation_time::SimulationTime;
use crate::core::worker::{Worker, WorkerShared, WorkerThreadId};
use crate::utility::perf_timer::PerfTimer;

pub struct Scheduler {
    pool: WorkerPool,
    shared: Arc<WorkerShared>,
    now: EmulatedTime,
    /// Set (e.g. from a signal handler) to stop after the current round.
    stop_flag: Arc<AtomicBool>,
    round_timer: PerfTimer,
    longest_round: Duration,
}

impl Scheduler {
    /// Spawn `num_workers` worker threads over the shared simulation state.
    pub fn new(shared: Arc<WorkerShared>, num_workers: u32) -> Self {
        let mut pool = WorkerPool::new(num_workers as usize, "umbra-worker");

        // give each pool thread its worker context before the first round
        {
            let shared = &shared;
            pool.scope(|s| {
                s.run(move |i| {
                    Worker::new_for_this_thread(
                        Arc::clone(shared),
                        WorkerThreadId(i.try_into().unwrap()),
                    );
                });
            });
        }

        Self {
            pool,
            shared,
            now: EmulatedTime::SIMULATION_START,
            stop_flag: Arc::new(AtomicBool::new(false)),
            round_timer: PerfTimer::new_stopped(),
            longest_round: Duration::ZERO,
        }
    }

    /// The flag that asks the scheduler to stop. The current round always
    /// completes first.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    /// The simulated clock: every event strictly below this instant has been
    /// executed.
    pub fn current_time(&self) -> EmulatedTime {
        self.now
    }

    pub fn shared(&self) -> &Arc<WorkerShared> {
        &self.shared
    }

    /// Run rounds until the end time is reached, the event system quiesces,
    /// or a stop is requested.
    pub fn run(&mut self) {
        loop {
            if self.stop_flag.load(Ordering::Relaxed) {
                log::info!("Stop requested; exiting at {}", self.now);
                break;
            }

            let Some(barrier) = self.next_barrier() else {
                break;
            };

            log::trace!("Round from {} to barrier {}", self.now, barrier);
            self.run_round(barrier);
            self.now = barrier;
        }
    }

    /// The next round's barrier, or None when the simulation is over. May
    /// fast-forward the clock over event-free gaps.
    fn next_barrier(&mut self) -> Option<EmulatedTime> {
        let end_time = self.shared.end_time();

        if self.now >= end_time {
            return None;
        }

        let Some(next_event_time) = self.shared.policy().min_next_event_time() else {
            log::info!("No events remain; simulation quiesced at {}", self.now);
            self.now = end_time;
            return None;
        };

        if next_event_time >= end_time {
            // whatever is left scheduled can never run
            self.now = end_time;
            return None;
        }

        let lookahead = self.shared.runahead().get();
        let mut barrier = self.now.saturating_add(lookahead);
        barrier = std::cmp::min(barrier, end_time);
        barrier = std::cmp::min(barrier, next_event_time);

        // a queue may hold events at exactly `now`; advance by the smallest
        // representable increment so the round can pop them
        if barrier <= self.now {
            barrier = self.now + SimulationTime::NANOSECOND;
        }

        Some(barrier)
    }

    fn run_round(&mut self, barrier: EmulatedTime) {
        self.shared.counters().rounds.fetch_add(1, Ordering::Relaxed);
        self.round_timer.start();

        let shared = &self.shared;
        self.pool.scope(|s| {
            s.run(move |worker_idx| {
                Worker::set_round_end_time(barrier);

                let policy = shared.policy();
                while let Some(event) = policy.pop(worker_idx, barrier) {
                    // exclusive borrow: nothing else may touch the host
                    // while its event runs
                    let host = shared.host(event.host_id()).borrow_mut();

                    Worker::set_active_host(Arc::clone(host.info()));
                    Worker::set_current_time(event.time());

                    event.execute(&host);
                    host.count_executed_event();

                    Worker::clear_active_host();
                }

                Worker::clear_current_time();
            });
        });
        // the pool scope waits on its latch, so every worker is done here

        let round = self.round_timer.stop();
        self.longest_round = std::cmp::max(self.longest_round, round);
    }

    /// Cumulative wall time spent inside rounds.
    pub fn total_round_time(&self) -> Duration {
        self.round_timer.elapsed()
    }

    /// Wall time of the slowest round.
    pub fn longest_round_time(&self) -> Duration {
        self.longest_round
    }

    /// Join the worker threads.
    pub fn join(self) {
        self.pool.join();
    }
}
