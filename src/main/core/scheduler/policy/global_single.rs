use std::sync::Mutex;

use crate::core::support::emulated_time::EmulatedTime;
use crate::core::work::event::Event;
use crate::core::work::event_queue::EventQueue;
use crate::host::host::HostId;

/// One queue shared by every host, drained by a single worker. Slow, but
/// events execute in exactly `(time, sequence)` order across the whole
/// simulation, which makes it the reference policy for determinism checks.
#[derive(Debug)]
pub struct GlobalSinglePolicy {
    queue: Mutex<EventQueue>,
    hosts: Vec<HostId>,
}

impl GlobalSinglePolicy {
    pub fn new(num_workers: usize) -> Self {
        // config validation enforces this before we're built
        assert!(num_workers == 1, "global-single runs on exactly one worker");

        Self {
            queue: Mutex::new(EventQueue::new()),
            hosts: Vec::new(),
        }
    }

    pub(super) fn add_host(&mut self, host: HostId, _worker: Option<u32>) {
        self.hosts.push(host);
    }

    pub(super) fn assigned_hosts(&self, _worker: usize) -> Vec<HostId> {
        self.hosts.clone()
    }

    pub(super) fn push(&self, event: Event) {
        self.queue.lock().unwrap().push(event);
    }

    pub(super) fn pop(&self, worker: usize, barrier: EmulatedTime) -> Option<Event> {
        debug_assert_eq!(worker, 0);

        let mut queue = self.queue.lock().unwrap();
        match queue.next_event_time() {
            Some(t) if t < barrier => queue.pop(),
            _ => None,
        }
    }

    pub(super) fn next_event_time(&self, _worker: usize) -> Option<EmulatedTime> {
        self.queue.lock().unwrap().next_event_time()
    }

    pub(super) fn min_next_event_time(&self) -> Option<EmulatedTime> {
        self.next_event_time(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::support::simulation_time::SimulationTime;
    use crate::core::work::task::TaskRef;

    fn start_plus(nanos: u64) -> EmulatedTime {
        EmulatedTime::SIMULATION_START + SimulationTime::from_nanos(nanos)
    }

    fn event_at(nanos: u64) -> Event {
        Event::new(
            TaskRef::new(|_| {}),
            start_plus(nanos),
            HostId::from(0),
            HostId::from(0),
        )
    }

    #[test]
    fn test_pop_order_and_barrier() {
        let mut policy = GlobalSinglePolicy::new(1);
        policy.add_host(HostId::from(0), None);

        for t in [5, 3, 5, 1] {
            policy.push(event_at(t));
        }

        // only events strictly below the barrier come out
        let barrier = start_plus(5);
        assert_eq!(policy.pop(0, barrier).unwrap().time(), start_plus(1));
        assert_eq!(policy.pop(0, barrier).unwrap().time(), start_plus(3));
        assert!(policy.pop(0, barrier).is_none());

        // the two time-5 events pop in push order behind a later barrier
        let barrier = start_plus(100);
        let first = policy.pop(0, barrier).unwrap();
        let second = policy.pop(0, barrier).unwrap();
        assert!(first.sequence() < second.sequence());
        assert!(policy.pop(0, barrier).is_none());
    }
}
