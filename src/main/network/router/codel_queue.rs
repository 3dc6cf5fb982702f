//! An active queue management (AQM) algorithm implementing CoDel.
//! <https://tools.ietf.org/html/rfc8289>
//!
//! The "Flow Queue" variant is not implemented.
//! <https://tools.ietf.org/html/rfc8290>
//!
//! More info:
//!  - <https://en.wikipedia.org/wiki/CoDel>
//!  - <http://man7.org/linux/man-pages/man8/tc-codel.8.html>
//!  - <https://queue.acm.org/detail.cfm?id=2209336>
//!  - <https://queue.acm.org/appendices/codel.html>

use std::collections::VecDeque;
use std::time::Duration;

use crate::core::support::emulated_time::EmulatedTime;
use crate::core::support::simulation_time::SimulationTime;
use crate::network::packet::{Packet, PacketStatus};

/// Parameters of a [`CoDelQueue`]. The defaults are the values recommended
/// for internet routers.
#[derive(Copy, Clone, Debug)]
pub struct CoDelParams {
    /// The hard cap on stored packets; arrivals beyond it are dropped on
    /// ingress, corresponding to the "limit" parameter in the codel man
    /// page.
    pub limit: usize,
    /// The target minimum standing queue delay, corresponding to the
    /// "TARGET" parameter in the RFC.
    pub target: SimulationTime,
    /// The most recent time interval over which the standing delay is
    /// computed, corresponding to the "INTERVAL" parameter in the RFC.
    pub interval: SimulationTime,
}

impl Default for CoDelParams {
    fn default() -> Self {
        Self {
            limit: 1000,
            target: SimulationTime::from_duration(Duration::from_millis(5)),
            interval: SimulationTime::from_duration(Duration::from_millis(100)),
        }
    }
}

/// When the stored bytes fit within one packet of this size, the standing
/// delay is never considered excessive (section 4.4 of the RFC).
const MTU: usize = 1500;

/// Encodes if CoDel determines that the next available packet can be dropped.
struct CoDelPopItem {
    packet: Packet,
    ok_to_drop: bool,
}

/// Represents the possible states of the CoDel algorithm.
#[derive(PartialEq, Debug)]
enum CoDelMode {
    /// Under good conditions, we store and forward packets.
    Store,
    /// Under bad conditions, we occasionally drop packets.
    Drop,
}

/// An entry in the CoDel queue.
struct CoDelElement {
    packet: Packet,
    enqueue_ts: EmulatedTime,
}

/// A packet queue implementing the CoDel active queue management (AQM)
/// algorithm, suitable for use in network routers.
pub struct CoDelQueue {
    params: CoDelParams,
    /// A queue holding packets and insertion times.
    elements: VecDeque<CoDelElement>,
    /// The running sum of the sizes of packets stored in the queue.
    total_bytes_stored: usize,
    /// The state indicating if we are dropping or storing packets.
    mode: CoDelMode,
    /// If Some, this is an interval worth of time after which packet delays
    /// started to exceed the target delay.
    interval_end: Option<EmulatedTime>,
    /// If Some, the next time we should drop a packet.
    drop_next: Option<EmulatedTime>,
    /// The number of packets dropped since entering drop mode.
    current_drop_count: usize,
    /// The number of packets dropped the last time we were in drop mode.
    previous_drop_count: usize,
    /// Total packets this queue has dropped, on ingress or on dequeue.
    total_dropped: u64,
}

impl CoDelQueue {
    /// Creates a new empty packet queue.
    pub fn new(params: CoDelParams) -> CoDelQueue {
        assert!(params.limit > 0);
        assert!(params.target.is_positive());
        assert!(params.interval.is_positive());

        CoDelQueue {
            params,
            elements: VecDeque::new(),
            total_bytes_stored: 0,
            mode: CoDelMode::Store,
            interval_end: None,
            drop_next: None,
            current_drop_count: 0,
            previous_drop_count: 0,
            total_dropped: 0,
        }
    }

    /// Returns the total number of packets stored in the queue.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true if the queue is holding zero packets, false otherwise.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total packets dropped over the queue's lifetime, whether on ingress
    /// (full queue) or on dequeue (AQM decision).
    pub fn dropped_packets(&self) -> u64 {
        self.total_dropped
    }

    /// Returns the packet at the front of the queue, or None if the queue is
    /// empty. Note that there is no guarantee that a subsequent `pop()`
    /// operation will return the same packet, since it could be dropped by
    /// the queue between the `peek()` and `pop()` operations.
    #[cfg(test)]
    pub fn peek(&self) -> Option<&Packet> {
        self.elements.front().map(|x| &x.packet)
    }

    /// Append a packet to the end of the queue, or drop it if the queue
    /// already holds `limit` packets.
    pub fn push(&mut self, mut packet: Packet, now: EmulatedTime) {
        if self.elements.len() < self.params.limit {
            packet.add_status(PacketStatus::RouterEnqueued);
            self.total_bytes_stored += packet.len();
            self.elements.push_back(CoDelElement {
                packet,
                enqueue_ts: now,
            });
        } else {
            // Section 5.4 in the RFC notes that "packets arriving at a full
            // buffer will be dropped, but these drops are not counted
            // towards CoDel's computations".
            self.drop_packet(packet);
        }
    }

    /// Returns the next packet in the queue that conforms to the CoDel
    /// standing delay requirements, or None if the queue is empty before a
    /// conforming packet is found. The CoDel packet dropping logic is
    /// applied during this operation, which could result in packets being
    /// dropped before a packet that conforms to the standing delay
    /// requirements is returned. Requires the current time as an argument so
    /// the queue never reaches back into the worker.
    pub fn pop(&mut self, now: EmulatedTime) -> Option<Packet> {
        let maybe_packet = match self.codel_pop(&now) {
            Some(item) => match item.ok_to_drop {
                true => match self.mode {
                    CoDelMode::Store => self.drop_from_store_mode(&now, item.packet),
                    CoDelMode::Drop => self.drop_from_drop_mode(&now, item.packet),
                },
                false => {
                    // Always set Store mode when standing delay below target.
                    self.mode = CoDelMode::Store;
                    Some(item.packet)
                }
            },
            None => {
                // Always set Store mode when the queue is empty.
                self.mode = CoDelMode::Store;
                None
            }
        };

        maybe_packet.map(|mut p| {
            p.add_status(PacketStatus::RouterDequeued);
            p
        })
    }

    fn drop_from_store_mode(&mut self, now: &EmulatedTime, packet: Packet) -> Option<Packet> {
        debug_assert_eq!(self.mode, CoDelMode::Store);

        // Drop one packet and move to drop mode.
        self.drop_packet(packet);
        let next_item = self.codel_pop(now);
        self.mode = CoDelMode::Drop;

        // Reset to the drop rate that was known to control the queue.
        let delta = self
            .current_drop_count
            .saturating_sub(self.previous_drop_count);
        self.current_drop_count = match self.was_dropping_recently(now) && delta > 1 {
            true => delta,
            false => 1,
        };
        self.drop_next = Some(self.apply_control_law(now, self.current_drop_count));
        self.previous_drop_count = self.current_drop_count;

        next_item.map(|x| x.packet)
    }

    fn drop_from_drop_mode(&mut self, now: &EmulatedTime, packet: Packet) -> Option<Packet> {
        debug_assert_eq!(self.mode, CoDelMode::Drop);

        let mut item = Some(CoDelPopItem {
            packet,
            ok_to_drop: true,
        });

        // Drop as many packets as the control law dictates.
        while item.is_some() && self.mode == CoDelMode::Drop && self.should_drop(now) {
            self.drop_packet(item.unwrap().packet);
            self.current_drop_count += 1;

            item = self.codel_pop(now);

            match item.as_ref().is_some_and(|x| x.ok_to_drop) {
                true => {
                    // Set the next drop time based on the CoDel control law.
                    // `self.drop_next` is already set in
                    // `drop_from_store_mode()`.
                    self.drop_next =
                        Some(self.apply_control_law(&self.drop_next.unwrap(), self.current_drop_count));
                }
                false => self.mode = CoDelMode::Store,
            }
        }

        item.map(|x| x.packet)
    }

    // Corresponds to the `dodequeue` function in the RFC.
    fn codel_pop(&mut self, now: &EmulatedTime) -> Option<CoDelPopItem> {
        match self.elements.pop_front() {
            Some(element) => {
                // Found a packet.
                debug_assert!(element.packet.len() <= self.total_bytes_stored);
                self.total_bytes_stored =
                    self.total_bytes_stored.saturating_sub(element.packet.len());

                debug_assert!(now >= &element.enqueue_ts);
                let standing_delay = now.saturating_duration_since(&element.enqueue_ts);
                let ok_to_drop = self.process_standing_delay(now, standing_delay);

                Some(CoDelPopItem {
                    packet: element.packet,
                    ok_to_drop,
                })
            }
            None => {
                // Queue is empty, so we cannot be above target.
                self.interval_end = None;
                None
            }
        }
    }

    /// Update our state based on the given standing delay. Returns true if
    /// the packet associated with this delay can be dropped, false
    /// otherwise.
    fn process_standing_delay(&mut self, now: &EmulatedTime, standing_delay: SimulationTime) -> bool {
        if standing_delay < self.params.target || self.total_bytes_stored <= MTU {
            // We are in a good state, i.e., below the target delay. We reset
            // the interval expiration, so that we wait for at least one full
            // interval if the delay exceeds the target again.
            self.interval_end = None;
            false
        } else {
            // We are in a bad state, i.e., at or above the target delay.
            match self.interval_end {
                Some(end) => {
                    // We were already in a bad state, and now we stayed in
                    // it. If we have been in a bad state for a full interval
                    // worth of time, drop this packet.
                    now >= &end
                }
                None => {
                    // None means we were in a good state, but now we just
                    // entered a bad state. If we stay in the bad state for a
                    // full interval, we will need to enter drop mode later.
                    // Mark the end of the interval now so we can track it.
                    self.interval_end = Some(now.saturating_add(self.params.interval));
                    false
                }
            }
        }
    }

    /// Returns true if now exceeds our drop_next threshold, false otherwise.
    fn should_drop(&self, now: &EmulatedTime) -> bool {
        match self.drop_next {
            Some(next) => now >= &next,
            None => false, // Have not yet set the drop threshold
        }
    }

    /// Returns true if now is within 16 intervals of drop_next, false
    /// otherwise.
    fn was_dropping_recently(&self, now: &EmulatedTime) -> bool {
        match self.drop_next {
            Some(drop_next) => {
                // now < drop_next + interval*16
                now.saturating_duration_since(&drop_next) < self.params.interval.saturating_mul(16)
            }
            None => false, // Have not yet dropped a packet
        }
    }

    /// Apply the CoDel control law using the inverse sqrt of the drop count,
    /// i.e., `time + (interval / sqrt(count))`.
    fn apply_control_law(&self, time: &EmulatedTime, count: usize) -> EmulatedTime {
        let increment = {
            let interval = self.params.interval.as_nanos_f64();
            let sqrt_count = match count {
                0 => 1f64,
                _ => (count as f64).sqrt(),
            };
            let div = interval / sqrt_count;
            SimulationTime::from_nanos(div.round() as u64)
        };
        time.saturating_add(increment)
    }

    fn drop_packet(&mut self, mut packet: Packet) {
        packet.add_status(PacketStatus::RouterDropped);
        self.total_dropped += 1;
    }
}
