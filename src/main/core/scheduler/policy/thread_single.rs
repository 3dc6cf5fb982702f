use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::support::emulated_time::EmulatedTime;
use crate::core::work::event::Event;
use crate::core::work::event_queue::EventQueue;
use crate::host::host::HostId;

/// One queue per worker. A pushed event lands in the queue of the worker its
/// destination host maps to, and each worker pops only its own queue; there
/// is no per-host affinity beyond that mapping, so hosts sharing a worker
/// have their events interleaved in `(time, sequence)` order.
#[derive(Debug)]
pub struct ThreadSinglePolicy {
    queues: Vec<Mutex<EventQueue>>,
    host_to_worker: HashMap<HostId, usize>,
    /// Hosts mapped to each worker, kept for `assigned_hosts`.
    assignments: Vec<Vec<HostId>>,
    /// Round-robin fallback for hosts added without an explicit worker.
    next_worker: usize,
}

impl ThreadSinglePolicy {
    pub fn new(num_workers: usize) -> Self {
        assert!(num_workers >= 1);

        Self {
            queues: (0..num_workers).map(|_| Mutex::new(EventQueue::new())).collect(),
            host_to_worker: HashMap::new(),
            assignments: (0..num_workers).map(|_| Vec::new()).collect(),
            next_worker: 0,
        }
    }

    pub(super) fn add_host(&mut self, host: HostId, worker: Option<u32>) {
        let worker = worker.map(|w| w as usize).unwrap_or_else(|| {
            let w = self.next_worker;
            self.next_worker = (w + 1) % self.queues.len();
            w
        });
        assert!(worker < self.queues.len(), "no such worker {worker}");

        let previous = self.host_to_worker.insert(host, worker);
        assert!(previous.is_none(), "host {host:?} added twice");

        self.assignments[worker].push(host);
    }

    pub(super) fn assigned_hosts(&self, worker: usize) -> Vec<HostId> {
        self.assignments[worker].clone()
    }

    pub(super) fn push(&self, event: Event) {
        let worker = *self
            .host_to_worker
            .get(&event.host_id())
            .expect("event addressed to a host this policy doesn't know");

        self.queues[worker].lock().unwrap().push(event);
    }

    pub(super) fn pop(&self, worker: usize, barrier: EmulatedTime) -> Option<Event> {
        let mut queue = self.queues[worker].lock().unwrap();
        match queue.next_event_time() {
            Some(t) if t < barrier => queue.pop(),
            _ => None,
        }
    }

    pub(super) fn next_event_time(&self, worker: usize) -> Option<EmulatedTime> {
        self.queues[worker].lock().unwrap().next_event_time()
    }

    pub(super) fn min_next_event_time(&self) -> Option<EmulatedTime> {
        self.queues
            .iter()
            .filter_map(|queue| queue.lock().unwrap().next_event_time())
            .min()
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

    fn event_for(dst: u32, nanos: u64) -> Event {
        Event::new(
            TaskRef::new(|_| {}),
            start_plus(nanos),
            HostId::from(dst),
            HostId::from(dst),
        )
    }

    #[test]
    fn test_events_route_to_the_hosts_worker() {
        let mut policy = ThreadSinglePolicy::new(2);
        policy.add_host(HostId::from(0), Some(0));
        policy.add_host(HostId::from(1), Some(1));

        policy.push(event_for(0, 10));
        policy.push(event_for(1, 20));

        let barrier = start_plus(1000);
        assert_eq!(u32::from(policy.pop(0, barrier).unwrap().host_id()), 0);
        assert!(policy.pop(0, barrier).is_none());
        assert_eq!(u32::from(policy.pop(1, barrier).unwrap().host_id()), 1);
        assert!(policy.pop(1, barrier).is_none());
    }

    #[test]
    fn test_hosts_sharing_a_worker_interleave_by_time() {
        let mut policy = ThreadSinglePolicy::new(1);
        policy.add_host(HostId::from(0), Some(0));
        policy.add_host(HostId::from(1), Some(0));

        policy.push(event_for(0, 30));
        policy.push(event_for(1, 10));
        policy.push(event_for(0, 20));

        let barrier = start_plus(1000);
        let order: Vec<u64> = std::iter::from_fn(|| policy.pop(0, barrier))
            .map(|e| e.time().to_abs_simtime().as_nanos())
            .collect();
        assert_eq!(order, vec![10, 20, 30]);
    }

    #[test]
    fn test_barrier_bounds_pop() {
        let mut policy = ThreadSinglePolicy::new(1);
        policy.add_host(HostId::from(0), Some(0));

        policy.push(event_for(0, 10));
        policy.push(event_for(0, 50));

        assert!(policy.pop(0, start_plus(10)).is_none());
        assert!(policy.pop(0, start_plus(11)).is_some());
        assert!(policy.pop(0, start_plus(11)).is_none());
        assert_eq!(policy.min_next_event_time(), Some(start_plus(50)));
    }
}
