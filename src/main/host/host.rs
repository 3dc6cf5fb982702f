use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::core::support::emulated_time::EmulatedTime;
use crate::core::support::simulation_time::SimulationTime;
use crate::core::work::event::Event;
use crate::core::work::task::TaskRef;
use crate::core::worker::Worker;
use crate::network::packet::{Packet, PacketStatus};
use crate::network::router::{CoDelParams, Router};

/// A host's handle: its index in the scheduler-owned host arena. Events and
/// packets carry these instead of owning references, which keeps the object
/// graph acyclic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostId(u32);

impl From<u32> for HostId {
    fn from(i: u32) -> Self {
        HostId(i)
    }
}

impl From<HostId> for u32 {
    fn from(id: HostId) -> Self {
        id.0
    }
}

impl From<HostId> for usize {
    fn from(id: HostId) -> Self {
        id.0 as usize
    }
}

/// Fixed identity of a host, decided at configuration time.
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub id: HostId,
    pub name: String,
    /// Seed for the host's own RNG, drawn from the root RNG.
    pub seed: u64,
}

/// Per-host simulation state.
///
/// The scheduler owns every host for the lifetime of the run; at most one
/// worker touches a host at a time (the one executing an event addressed to
/// it), which is what lets rounds run in parallel. The interior cells assert
/// that discipline rather than synchronize around it.
pub struct Host {
    info: Arc<HostInfo>,
    random: AtomicRefCell<Xoshiro256PlusPlus>,
    /// Ingress from the simulated network.
    router: AtomicRefCell<Router>,
    /// Runs (as an event on this host) whenever the router's delivery slot
    /// goes from empty to occupied.
    packet_handler: AtomicRefCell<Option<TaskRef>>,
    num_events_executed: AtomicU64,
    num_packets_received: AtomicU64,
}

impl Host {
    pub fn new(info: HostInfo, codel_params: CoDelParams) -> Self {
        let random = Xoshiro256PlusPlus::seed_from_u64(info.seed);
        Self {
            info: Arc::new(info),
            random: AtomicRefCell::new(random),
            router: AtomicRefCell::new(Router::new(codel_params)),
            packet_handler: AtomicRefCell::new(None),
            num_events_executed: AtomicU64::new(0),
            num_packets_received: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> HostId {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &Arc<HostInfo> {
        &self.info
    }

    pub fn with_random_mut<T>(&self, f: impl FnOnce(&mut Xoshiro256PlusPlus) -> T) -> T {
        f(&mut self.random.borrow_mut())
    }

    /// Schedule `task` to run on this host at absolute time `t`. Returns
    /// false (and schedules nothing) if `t` is at or past the end of the
    /// simulation. Must run on a worker.
    pub fn schedule_task_at(&self, task: TaskRef, t: EmulatedTime) -> bool {
        let now = Worker::current_time().unwrap();
        debug_assert!(t >= now);

        if t >= Worker::end_time().unwrap() {
            return false;
        }

        let event = Event::new(task, t, self.id(), self.id());
        Worker::push_event(event);
        true
    }

    /// Schedule `task` to run on this host `delay` from now. Returns false
    /// if that instant is at or past the end of the simulation. Must run on
    /// a worker.
    pub fn schedule_task_with_delay(&self, task: TaskRef, delay: SimulationTime) -> bool {
        let now = Worker::current_time().unwrap();
        self.schedule_task_at(task, now + delay)
    }

    /// Hand a packet to the simulated network. Must run on a worker, with
    /// `self` as the active host.
    pub fn send_packet(&self, packet: Packet) {
        Worker::send_packet(self, packet);
    }

    /// Accept a packet arriving from the network (the delivery event's
    /// callback on the destination host). The router's AQM queue may drop it
    /// instead.
    pub fn deliver_packet(&self, packet: Packet) {
        let now = Worker::current_time().unwrap();

        let became_available;
        let newly_dropped;
        {
            let mut router = self.router.borrow_mut();
            let dropped_before = router.dropped_packets();
            became_available = router.push(packet, now);
            newly_dropped = router.dropped_packets() - dropped_before;
        }

        if newly_dropped > 0 {
            Worker::count_aqm_dropped_packets(newly_dropped);
        }

        if became_available {
            self.packets_are_available();
        }
    }

    /// Take the next available packet from the router, if any. Must run on a
    /// worker.
    pub fn receive(&self) -> Option<Packet> {
        let now = Worker::current_time().unwrap();
        let mut packet = self.router.borrow_mut().receive(now)?;
        packet.add_status(PacketStatus::Received);
        self.num_packets_received.fetch_add(1, Ordering::Relaxed);
        Some(packet)
    }

    /// Install the task that runs (at the current time, as an event on this
    /// host) whenever a packet becomes available to receive.
    pub fn set_packet_handler(&self, task: TaskRef) {
        *self.packet_handler.borrow_mut() = Some(task);
    }

    fn packets_are_available(&self) {
        let handler = self.packet_handler.borrow().clone();
        if let Some(task) = handler {
            self.schedule_task_with_delay(task, SimulationTime::ZERO);
        }
    }

    pub(crate) fn count_executed_event(&self) {
        self.num_events_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn num_events_executed(&self) -> u64 {
        self.num_events_executed.load(Ordering::Relaxed)
    }

    pub fn num_packets_received(&self) -> u64 {
        self.num_packets_received.load(Ordering::Relaxed)
    }

    /// Packets this host's router has dropped so far.
    pub fn num_router_dropped_packets(&self) -> u64 {
        self.router.borrow().dropped_packets()
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("id", &self.info.id)
            .field("name", &self.info.name)
            .finish_non_exhaustive()
    }
}
