use crate::core::support::emulated_time::EmulatedTime;
use crate::network::packet::Packet;
use crate::utility::Magic;

use self::codel_queue::CoDelQueue;
pub use self::codel_queue::CoDelParams;
mod codel_queue;

/// The ingress side of a host: packets arriving from the simulated network
/// pass through an AQM queue and surface one at a time in a delivery slot
/// that the receiving interface drains.
///
/// The router is owned by the destination host; senders never touch it
/// directly, they schedule a delivery event that lands here on the owner's
/// worker.
pub struct Router {
    magic: Magic<0x74c01e77>,
    /// Packets inbound to the host from the simulated network.
    inbound_packets: CoDelQueue,
    /// The single packet currently offered to the receive interface.
    delivery_slot: Option<Packet>,
}

impl Router {
    pub fn new(params: CoDelParams) -> Router {
        Router {
            magic: Magic::new(),
            inbound_packets: CoDelQueue::new(params),
            delivery_slot: None,
        }
    }

    /// Accept a packet arriving from the network at time `now`. The AQM
    /// queue may drop it instead of storing it. Returns true if the delivery
    /// slot went from empty to occupied, in which case the owner should be
    /// notified that a packet is available.
    pub fn push(&mut self, packet: Packet, now: EmulatedTime) -> bool {
        self.magic.debug_check();

        let was_empty = self.delivery_slot.is_none();
        self.inbound_packets.push(packet, now);

        if self.delivery_slot.is_none() {
            self.delivery_slot = self.inbound_packets.pop(now);
        }

        was_empty && self.delivery_slot.is_some()
    }

    /// The packet currently available to receive, if any.
    pub fn peek(&self) -> Option<&Packet> {
        self.magic.debug_check();
        self.delivery_slot.as_ref()
    }

    /// Take the available packet, refilling the slot from the AQM queue.
    pub fn receive(&mut self, now: EmulatedTime) -> Option<Packet> {
        self.magic.debug_check();

        let packet = self.delivery_slot.take();
        self.delivery_slot = self.inbound_packets.pop(now);
        packet
    }

    /// Packets this router has dropped, on ingress overflow or by the AQM
    /// standing-delay logic.
    pub fn dropped_packets(&self) -> u64 {
        self.magic.debug_check();
        self.inbound_packets.dropped_packets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::support::simulation_time::SimulationTime;

    fn mock_time_millis(millis: u64) -> EmulatedTime {
        EmulatedTime::SIMULATION_START + SimulationTime::from_millis(millis)
    }

    #[test]
    fn empty() {
        let now = mock_time_millis(1000);
        let mut router = Router::new(CoDelParams::default());
        assert!(router.peek().is_none());
        assert!(router.receive(now).is_none());
    }

    #[test]
    fn push_receive_simple() {
        let now = mock_time_millis(1000);
        let mut router = Router::new(CoDelParams::default());

        const N: usize = 10;

        for i in 1..=N {
            // only the first push finds the slot empty
            assert_eq!(router.push(Packet::mock(100), now), i == 1);
            assert!(router.peek().is_some());
        }
        for _ in 1..=N {
            assert!(router.peek().is_some());
            assert!(router.receive(now).is_some());
        }

        assert!(router.peek().is_none());
        assert!(router.receive(now).is_none());
        assert_eq!(router.dropped_packets(), 0);
    }

    #[test]
    fn slot_refills_from_queue() {
        let now = mock_time_millis(1000);
        let mut router = Router::new(CoDelParams::default());

        router.push(Packet::mock(100), now);
        router.push(Packet::mock(100), now);

        // the second packet is queued behind the slot
        assert!(router.receive(now).is_some());
        // the slot refilled without another push
        assert!(router.peek().is_some());
        assert!(router.receive(now).is_some());
        assert!(router.receive(now).is_none());
    }

    #[test]
    fn overflow_drops_on_ingress() {
        let now = mock_time_millis(1000);
        let limit = 50;
        let mut router = Router::new(CoDelParams {
            limit,
            ..CoDelParams::default()
        });

        // one packet sits in the delivery slot, `limit` fill the queue
        for _ in 0..(limit + 1) {
            router.push(Packet::mock(100), now);
        }
        assert_eq!(router.dropped_packets(), 0);

        for _ in 0..25 {
            router.push(Packet::mock(100), now);
        }
        assert_eq!(router.dropped_packets(), 25);
    }
}
