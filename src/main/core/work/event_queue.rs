use std::cmp::Reverse;
use std::collections::binary_heap::BinaryHeap;

use crate::core::support::emulated_time::EmulatedTime;

use super::event::Event;

/// A queue of [`Event`]s ordered by `(time, sequence)`.
///
/// The queue stamps each pushed event with the next value of its push
/// counter, so that events with equal times pop in push order. Pop times are
/// checked to never move backward over the queue's lifetime.
#[derive(Debug)]
pub struct EventQueue {
    queue: BinaryHeap<Reverse<Event>>,
    /// The sequence stamp for the next push; strictly increasing.
    push_counter: u64,
    last_popped_event_time: EmulatedTime,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            push_counter: 0,
            last_popped_event_time: EmulatedTime::SIMULATION_START,
        }
    }

    /// Push a new [`Event`] on to the queue, stamping its sequence.
    ///
    /// Will panic if the event time is earlier than the last popped event
    /// time (time moves backward).
    pub fn push(&mut self, mut event: Event) {
        // make sure time never moves backward
        assert!(
            event.time() >= self.last_popped_event_time,
            "Event at {} pushed into the past of a queue already at {}",
            event.time(),
            self.last_popped_event_time,
        );

        self.push_counter += 1;
        event.set_sequence(self.push_counter);

        self.queue.push(Reverse(event));
    }

    /// Pop the earliest [`Event`] from the queue.
    pub fn pop(&mut self) -> Option<Event> {
        let event = self.queue.pop().map(|x| x.0);

        // make sure time never moves backward
        if let Some(ref event) = event {
            assert!(event.time() >= self.last_popped_event_time);
            self.last_popped_event_time = event.time();
        }

        event
    }

    /// The time of the next [`Event`] (the time of the earliest event in the
    /// queue).
    pub fn next_event_time(&self) -> Option<EmulatedTime> {
        self.queue.peek().map(|x| x.0.time())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::support::simulation_time::SimulationTime;
    use crate::core::work::task::TaskRef;
    use crate::host::host::HostId;

    fn event_at(nanos: u64) -> Event {
        Event::new(
            TaskRef::new(|_| {}),
            EmulatedTime::SIMULATION_START + SimulationTime::from_nanos(nanos),
            HostId::from(0),
            HostId::from(0),
        )
    }

    #[test]
    fn test_pops_in_time_order() {
        let mut queue = EventQueue::new();
        for t in [5, 3, 5, 1] {
            queue.push(event_at(t));
        }

        let popped: Vec<u64> = std::iter::from_fn(|| queue.pop())
            .map(|e| e.time().to_abs_simtime().as_nanos())
            .collect();
        assert_eq!(popped, vec![1, 3, 5, 5]);
    }

    #[test]
    fn test_equal_times_pop_in_push_order() {
        let mut queue = EventQueue::new();
        // push order: t5 (seq 1), t3 (seq 2), t5 (seq 3), t1 (seq 4)
        for t in [5, 3, 5, 1] {
            queue.push(event_at(t));
        }

        let sequences: Vec<u64> = std::iter::from_fn(|| queue.pop())
            .map(|e| e.sequence())
            .collect();
        assert_eq!(sequences, vec![4, 2, 1, 3]);
    }

    #[test]
    fn test_popped_times_never_decrease() {
        let mut queue = EventQueue::new();
        for t in [9, 2, 7, 2, 8] {
            queue.push(event_at(t));
        }

        let mut last = EmulatedTime::SIMULATION_START;
        while let Some(event) = queue.pop() {
            assert!(event.time() >= last);
            last = event.time();
        }
    }

    #[test]
    #[should_panic]
    fn test_push_into_the_past_panics() {
        let mut queue = EventQueue::new();
        queue.push(event_at(10));
        queue.pop().unwrap();

        // 5 < 10, so time would move backward
        queue.push(event_at(5));
    }

    #[test]
    fn test_next_event_time() {
        let mut queue = EventQueue::new();
        assert_eq!(queue.next_event_time(), None);

        queue.push(event_at(4));
        queue.push(event_at(2));
        assert_eq!(
            queue.next_event_time(),
            Some(EmulatedTime::SIMULATION_START + SimulationTime::from_nanos(2))
        );
    }
}
