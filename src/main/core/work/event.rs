use crate::core::support::emulated_time::EmulatedTime;
use crate::host::host::{Host, HostId};
use crate::utility::Magic;

use super::task::TaskRef;

/// A unit of work addressed to a host at an instant of simulated time.
///
/// An event is immutable once enqueued, with two exceptions: its time may be
/// raised to the barrier when it crosses hosts (the causality clamp applied
/// at push), and its sequence number is stamped by the destination queue
/// under the queue lock. Within a queue, `(time, sequence)` is the total
/// delivery order.
#[derive(Debug)]
pub struct Event {
    magic: Magic<0x3adf260f>,
    task: TaskRef,
    time: EmulatedTime,
    /// Stamped by the destination queue at push; 0 until then.
    sequence: u64,
    src_host_id: HostId,
    dst_host_id: HostId,
}

impl Event {
    pub fn new(task: TaskRef, time: EmulatedTime, src_host_id: HostId, dst_host_id: HostId) -> Self {
        Self {
            magic: Magic::new(),
            task,
            time,
            sequence: 0,
            src_host_id,
            dst_host_id,
        }
    }

    /// Run the event's payload. Consumes the event.
    pub fn execute(self, host: &Host) {
        self.magic.debug_check();

        // make sure we're executing on the correct host
        assert_eq!(self.host_id(), host.id());

        self.task.execute(host);
    }

    pub fn time(&self) -> EmulatedTime {
        self.magic.debug_check();
        self.time
    }

    pub fn set_time(&mut self, time: EmulatedTime) {
        self.magic.debug_check();
        self.time = time;
    }

    pub fn sequence(&self) -> u64 {
        self.magic.debug_check();
        self.sequence
    }

    pub(super) fn set_sequence(&mut self, sequence: u64) {
        self.magic.debug_check();
        self.sequence = sequence;
    }

    /// The destination host, which determines the queue.
    pub fn host_id(&self) -> HostId {
        self.magic.debug_check();
        self.dst_host_id
    }

    pub fn src_host_id(&self) -> HostId {
        self.magic.debug_check();
        self.src_host_id
    }

    /// An event crossing hosts is subject to the causality clamp; an event a
    /// host schedules for itself is not.
    pub fn is_inter_host(&self) -> bool {
        self.src_host_id != self.dst_host_id
    }

    fn key(&self) -> (EmulatedTime, u64) {
        (self.time, self.sequence)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    /// Sort by time, breaking ties with the queue-assigned sequence. Two
    /// events in one queue never share a sequence, so this is total within
    /// the queue that stamped them.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::support::simulation_time::SimulationTime;

    fn event_at(nanos: u64, sequence: u64) -> Event {
        let mut event = Event::new(
            TaskRef::new(|_| {}),
            EmulatedTime::SIMULATION_START + SimulationTime::from_nanos(nanos),
            HostId::from(0),
            HostId::from(1),
        );
        event.set_sequence(sequence);
        event
    }

    #[test]
    fn test_time_orders_first() {
        assert!(event_at(1, 5) < event_at(2, 1));
    }

    #[test]
    fn test_sequence_breaks_ties() {
        assert!(event_at(7, 1) < event_at(7, 2));
    }
}
