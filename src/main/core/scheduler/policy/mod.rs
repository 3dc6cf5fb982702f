//! Host→queue mapping strategies.
//!
//! A policy decides where a pushed event is stored and which events a given
//! worker may pop. All three variants share one contract: `pop(worker,
//! barrier)` only ever returns events with `time < barrier`, and a host's
//! events are only ever popped by one worker within a round, so event
//! execution needs no host locking beyond the arena cells.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::ValueEnum;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::sim_stats::SharedCounters;
use crate::core::support::emulated_time::EmulatedTime;
use crate::core::work::event::Event;
use crate::host::host::HostId;

mod global_single;
mod host_single;
mod thread_single;

pub use global_single::GlobalSinglePolicy;
pub use host_single::HostSinglePolicy;
pub use thread_single::ThreadSinglePolicy;

/// Which mapping strategy the scheduler runs with. Chosen at startup from
/// configuration; never changes during a run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// One queue and one worker; the serial baseline for determinism checks.
    GlobalSingle,
    /// One queue per host, each host pinned to a worker; workers drain their
    /// hosts one at a time for cache locality.
    HostSingle,
    /// One queue per worker; any worker may push into any queue, and a
    /// worker pops only its own.
    ThreadSingle,
}

/// The active policy plus the cross-cutting push/pop bookkeeping: causality
/// enforcement on push and the event counters.
#[derive(Debug)]
pub struct SchedulerPolicy {
    variant: PolicyVariant,
    counters: Arc<SharedCounters>,
}

#[derive(Debug)]
enum PolicyVariant {
    GlobalSingle(GlobalSinglePolicy),
    HostSingle(HostSinglePolicy),
    ThreadSingle(ThreadSinglePolicy),
}

impl PolicyVariant {
    enum_passthrough!(self, (host, worker), GlobalSingle, HostSingle, ThreadSingle;
        fn add_host(&mut self, host: HostId, worker: Option<u32>)
    );
    enum_passthrough!(self, (event), GlobalSingle, HostSingle, ThreadSingle;
        fn push(&self, event: Event)
    );
    enum_passthrough!(self, (worker, barrier), GlobalSingle, HostSingle, ThreadSingle;
        fn pop(&self, worker: usize, barrier: EmulatedTime) -> Option<Event>
    );
    enum_passthrough!(self, (worker), GlobalSingle, HostSingle, ThreadSingle;
        fn next_event_time(&self, worker: usize) -> Option<EmulatedTime>
    );
    enum_passthrough!(self, (), GlobalSingle, HostSingle, ThreadSingle;
        fn min_next_event_time(&self) -> Option<EmulatedTime>
    );
    enum_passthrough!(self, (worker), GlobalSingle, HostSingle, ThreadSingle;
        fn assigned_hosts(&self, worker: usize) -> Vec<HostId>
    );
}

impl SchedulerPolicy {
    pub fn new(kind: PolicyKind, num_workers: usize, counters: Arc<SharedCounters>) -> Self {
        let variant = match kind {
            PolicyKind::GlobalSingle => {
                PolicyVariant::GlobalSingle(GlobalSinglePolicy::new(num_workers))
            }
            PolicyKind::HostSingle => PolicyVariant::HostSingle(HostSinglePolicy::new(num_workers)),
            PolicyKind::ThreadSingle => {
                PolicyVariant::ThreadSingle(ThreadSinglePolicy::new(num_workers))
            }
        };

        Self { variant, counters }
    }

    /// Associate a host with a queue (and possibly a worker). Not
    /// threadsafe; must run during single-threaded setup, before the first
    /// round.
    pub fn add_host(&mut self, host: HostId, worker: Option<u32>) {
        self.variant.add_host(host, worker);
    }

    /// The hosts the given worker is responsible for.
    pub fn assigned_hosts(&self, worker: usize) -> Vec<HostId> {
        self.variant.assigned_hosts(worker)
    }

    /// Queue an event.
    ///
    /// An event crossing hosts below `barrier` would land in the past of a
    /// destination whose worker has already run up to the barrier, so its
    /// time is raised to the barrier before it is stored. Events a host
    /// schedules for itself keep their natural time: the host's queue is
    /// drained in order by a single worker, so local causality holds on its
    /// own.
    pub fn push(&self, mut event: Event, barrier: EmulatedTime) {
        if event.is_inter_host() && event.time() < barrier {
            log::info!(
                "Inter-host event from {:?} to {:?} at {} raised to the barrier at {}",
                event.src_host_id(),
                event.host_id(),
                event.time(),
                barrier,
            );
            self.counters.events_clamped.fetch_add(1, Ordering::Relaxed);
            event.set_time(barrier);
        }

        self.counters.events_pushed.fetch_add(1, Ordering::Relaxed);
        self.variant.push(event);
    }

    /// The next event for `worker` with `time < barrier`, or None when the
    /// worker has drained everything below the barrier.
    pub fn pop(&self, worker: usize, barrier: EmulatedTime) -> Option<Event> {
        let event = self.variant.pop(worker, barrier);

        if let Some(event) = &event {
            debug_assert!(event.time() < barrier);
            self.counters.events_popped.fetch_add(1, Ordering::Relaxed);
        }

        event
    }

    /// The minimum head-event time across the given worker's queues.
    pub fn next_event_time(&self, worker: usize) -> Option<EmulatedTime> {
        self.variant.next_event_time(worker)
    }

    /// The minimum head-event time across all queues. Called between rounds
    /// by the scheduler's main loop.
    pub fn min_next_event_time(&self) -> Option<EmulatedTime> {
        self.variant.min_next_event_time()
    }
}
