use std::collections::HashMap;
use std::sync::Mutex;

use atomic_refcell::AtomicRefCell;

use crate::core::support::emulated_time::EmulatedTime;
use crate::core::work::event::Event;
use crate::core::work::event_queue::EventQueue;
use crate::host::host::HostId;

/// One queue per host, each host pinned to a worker for the whole run.
///
/// Within a round, a worker walks its assigned hosts in order and fully
/// drains each host's events below the barrier before moving to the next
/// host, so a host's state stays hot in cache while its events run. Any
/// worker may push into any host's queue (that's how inter-host events
/// arrive), but only the pinned worker ever pops it.
#[derive(Debug)]
pub struct HostSinglePolicy {
    queues: HashMap<HostId, Mutex<EventQueue>>,
    /// Hosts pinned to each worker, in iteration order. Fixed after setup.
    assignments: Vec<Vec<HostId>>,
    /// Where the cursor-walk of each worker stands in the current round.
    cursors: Vec<AtomicRefCell<RoundCursor>>,
    /// Round-robin fallback for hosts added without an explicit worker.
    next_worker: usize,
}

#[derive(Debug, Default)]
struct RoundCursor {
    /// The barrier this cursor was built for; a pop under a different
    /// barrier starts a fresh walk.
    barrier: Option<EmulatedTime>,
    index: usize,
}

impl HostSinglePolicy {
    pub fn new(num_workers: usize) -> Self {
        assert!(num_workers >= 1);

        Self {
            queues: HashMap::new(),
            assignments: (0..num_workers).map(|_| Vec::new()).collect(),
            cursors: (0..num_workers)
                .map(|_| AtomicRefCell::new(RoundCursor::default()))
                .collect(),
            next_worker: 0,
        }
    }

    pub(super) fn add_host(&mut self, host: HostId, worker: Option<u32>) {
        let worker = worker.map(|w| w as usize).unwrap_or_else(|| {
            let w = self.next_worker;
            self.next_worker = (w + 1) % self.assignments.len();
            w
        });
        assert!(worker < self.assignments.len(), "no such worker {worker}");

        let previous = self.queues.insert(host, Mutex::new(EventQueue::new()));
        assert!(previous.is_none(), "host {host:?} added twice");

        self.assignments[worker].push(host);
    }

    pub(super) fn assigned_hosts(&self, worker: usize) -> Vec<HostId> {
        self.assignments[worker].clone()
    }

    pub(super) fn push(&self, event: Event) {
        self.queues
            .get(&event.host_id())
            .expect("event addressed to a host this policy doesn't know")
            .lock()
            .unwrap()
            .push(event);
    }

    pub(super) fn pop(&self, worker: usize, barrier: EmulatedTime) -> Option<Event> {
        let assigned = &self.assignments[worker];
        let mut cursor = self.cursors[worker].borrow_mut();

        // a new barrier means a new round; start over at the first host
        if cursor.barrier != Some(barrier) {
            cursor.barrier = Some(barrier);
            cursor.index = 0;
        }

        while let Some(host) = assigned.get(cursor.index) {
            let mut queue = self.queues[host].lock().unwrap();
            match queue.next_event_time() {
                Some(t) if t < barrier => return queue.pop(),
                _ => {
                    // this host is done until the next round
                    drop(queue);
                    cursor.index += 1;
                }
            }
        }

        None
    }

    pub(super) fn next_event_time(&self, worker: usize) -> Option<EmulatedTime> {
        self.assignments[worker]
            .iter()
            .filter_map(|host| self.queues[host].lock().unwrap().next_event_time())
            .min()
    }

    pub(super) fn min_next_event_time(&self) -> Option<EmulatedTime> {
        self.queues
            .values()
            .filter_map(|queue| queue.lock().unwrap().next_event_time())
            .min()
    }
}
