use std::cell::{Cell, RefCell};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;
use crossbeam::atomic::AtomicCell;
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::core::runahead::Runahead;
use crate::core::scheduler::policy::SchedulerPolicy;
use crate::core::sim_stats::SharedCounters;
use crate::core::support::emulated_time::EmulatedTime;
use crate::core::support::simulation_time::SimulationTime;
use crate::core::work::event::Event;
use crate::core::work::task::TaskRef;
use crate::host::host::{Host, HostId, HostInfo};
use crate::network::packet::{Packet, PacketStatus};
use crate::network::routing::RoutingTable;

// thread-local worker state; initialized when the worker thread starts
// running, never shared outside the current thread
std::thread_local! {
    static WORKER: once_cell::unsync::OnceCell<Worker> = const { once_cell::unsync::OnceCell::new() };
}

#[derive(Copy, Clone, Debug)]
pub struct WorkerThreadId(pub u32);

struct Clock {
    now: Option<EmulatedTime>,
    barrier: Option<EmulatedTime>,
}

/// Worker context: 'global' information for the current scheduler thread.
///
/// Every worker holds an explicit handle to the [`WorkerShared`] simulation
/// state, populated at spawn; there is no process-wide registry to look
/// workers up in.
pub struct Worker {
    worker_id: WorkerThreadId,
    shared: Arc<WorkerShared>,

    /// Identity of the host an event is currently executing for, if any.
    /// Lets code that can't see the host object (e.g. the logger) know where
    /// it is running.
    active_host: RefCell<Option<Arc<HostInfo>>>,

    clock: RefCell<Clock>,

    /// This worker's own RNG, independent of any host's.
    rng: RefCell<Xoshiro256PlusPlus>,

    /// A saved copy of the lowest path latency this worker has routed over,
    /// so repeat packets skip the shared read-lock.
    min_latency_cache: Cell<Option<SimulationTime>>,
}

impl Worker {
    /// Create the worker context for this thread. Panics if the thread
    /// already has one.
    pub fn new_for_this_thread(shared: Arc<WorkerShared>, worker_id: WorkerThreadId) {
        let rng_seed = shared.seed() ^ u64::from(worker_id.0);
        WORKER.with(|worker| {
            let res = worker.set(Self {
                worker_id,
                shared,
                active_host: RefCell::new(None),
                clock: RefCell::new(Clock {
                    now: None,
                    barrier: None,
                }),
                rng: RefCell::new(Xoshiro256PlusPlus::seed_from_u64(rng_seed)),
                min_latency_cache: Cell::new(None),
            });
            assert!(res.is_ok(), "Worker already initialized for this thread");
        });
    }

    // Runs `f` with a reference to the current thread's Worker, or returns
    // None if this thread has no Worker.
    #[must_use]
    fn with<F, O>(f: F) -> Option<O>
    where
        F: FnOnce(&Worker) -> O,
    {
        WORKER.try_with(|w| w.get().map(f)).ok().flatten()
    }

    /// Whether currently running on a live worker thread.
    pub fn is_alive() -> bool {
        Worker::with(|_| ()).is_some()
    }

    /// ID of this thread's worker, if any.
    pub fn thread_id() -> Option<WorkerThreadId> {
        Worker::with(|w| w.worker_id)
    }

    pub fn set_round_end_time(t: EmulatedTime) {
        Worker::with(|w| w.clock.borrow_mut().barrier.replace(t)).unwrap();
    }

    pub fn round_end_time() -> Option<EmulatedTime> {
        Worker::with(|w| w.clock.borrow().barrier).flatten()
    }

    pub fn set_current_time(t: EmulatedTime) {
        Worker::with(|w| w.clock.borrow_mut().now.replace(t)).unwrap();
    }

    pub fn clear_current_time() {
        Worker::with(|w| w.clock.borrow_mut().now.take()).unwrap();
    }

    /// The time of the event currently executing on this worker.
    pub fn current_time() -> Option<EmulatedTime> {
        Worker::with(|w| w.clock.borrow().now).flatten()
    }

    pub fn set_active_host(info: Arc<HostInfo>) {
        let old = Worker::with(|w| w.active_host.borrow_mut().replace(info)).unwrap();
        debug_assert!(old.is_none());
    }

    pub fn clear_active_host() {
        let old = Worker::with(|w| w.active_host.borrow_mut().take()).unwrap();
        debug_assert!(old.is_some());
    }

    /// The destination host of the event currently executing.
    pub fn active_host_id() -> Option<HostId> {
        Worker::with(|w| w.active_host.borrow().as_ref().map(|info| info.id)).flatten()
    }

    /// Identity of the host the current event executes for, if any.
    pub fn active_host_info() -> Option<Arc<HostInfo>> {
        Worker::with(|w| w.active_host.borrow().clone()).flatten()
    }

    /// Run `f` with this worker's RNG.
    pub fn with_rng<T>(f: impl FnOnce(&mut Xoshiro256PlusPlus) -> T) -> Option<T> {
        Worker::with(|w| f(&mut w.rng.borrow_mut()))
    }

    /// The instant the simulation ends.
    pub fn end_time() -> Option<EmulatedTime> {
        Worker::with(|w| w.shared.end_time())
    }

    /// Offer a path latency to the dynamic lookahead, going through the
    /// shared state only when it beats this worker's best so far.
    pub fn update_lowest_used_latency(t: SimulationTime) {
        assert!(t != SimulationTime::ZERO);

        Worker::with(|w| {
            let cached = w.min_latency_cache.get();
            if cached.is_none() || t < cached.unwrap() {
                w.min_latency_cache.set(Some(t));
                w.shared.runahead().update_lowest_used_latency(t);
            }
        })
        .unwrap();
    }

    pub(crate) fn count_aqm_dropped_packets(n: u64) {
        Worker::with(|w| {
            w.shared
                .counters()
                .packets_dropped_aqm
                .fetch_add(n, Ordering::Relaxed)
        })
        .unwrap();
    }

    /// Queue an event with the active policy, under the barrier currently in
    /// force on this worker.
    pub fn push_event(event: Event) {
        Worker::with(|w| {
            let barrier = w
                .clock
                .borrow()
                .barrier
                .expect("Cannot push an event with no round in progress");
            w.shared.push_event(event, barrier);
        })
        .unwrap();
    }

    /// Route a packet from `src_host` toward its destination. The path's
    /// reliability decides whether it is silently lost; otherwise a delivery
    /// event is queued for the destination at `now + max(latency,
    /// lookahead)`.
    ///
    /// The reliability draw comes from the source host's RNG, not the
    /// worker's, so that delivery traces don't depend on how hosts are
    /// partitioned over workers.
    pub fn send_packet(src_host: &Host, mut packet: Packet) {
        let current_time = Worker::current_time().unwrap();
        let shared = Worker::with(|w| Arc::clone(&w.shared)).unwrap();

        if current_time >= shared.end_time() {
            // the simulation is over, don't bother
            return;
        }

        let src = packet.src_host_id();
        let dst = packet.dst_host_id();
        debug_assert_eq!(src, src_host.id());

        let path = shared.routing().path(src, dst);

        // check if path reliability forces us to 'drop' the packet
        let chance: f64 = src_host.with_random_mut(|rng| rng.gen());
        if chance >= f64::from(path.reliability) {
            packet.add_status(PacketStatus::InetDropped);
            shared
                .counters()
                .packets_dropped_unreliable
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        // the delay is never below the lookahead, so delivery always lands
        // at or past the next barrier and the destination's worker cannot
        // have run past it
        let delay = std::cmp::max(path.latency, shared.runahead().get());
        let deliver_time = current_time + delay;

        Worker::update_lowest_used_latency(path.latency);
        shared.counters().packets_sent.fetch_add(1, Ordering::Relaxed);
        packet.add_status(PacketStatus::InetSent);

        let packet = Arc::new(AtomicCell::new(Some(packet)));
        let packet_task = TaskRef::new(move |host: &Host| {
            let packet = packet.take().expect("Packet delivery task ran twice");
            host.deliver_packet(packet);
        });

        let event = Event::new(packet_task, deliver_time, src, dst);
        Worker::push_event(event);
    }
}

/// Simulation state shared by every worker and the scheduler's main loop.
#[derive(Debug)]
pub struct WorkerShared {
    policy: SchedulerPolicy,
    /// The host arena; a `HostId` is an index into it.
    hosts: Vec<AtomicRefCell<Host>>,
    routing: RoutingTable,
    runahead: Runahead,
    counters: Arc<SharedCounters>,
    end_time: EmulatedTime,
    seed: u64,
}

impl WorkerShared {
    pub fn new(
        policy: SchedulerPolicy,
        hosts: Vec<Host>,
        routing: RoutingTable,
        runahead: Runahead,
        counters: Arc<SharedCounters>,
        end_time: EmulatedTime,
        seed: u64,
    ) -> Self {
        // host ids must be their arena indices
        for (i, host) in hosts.iter().enumerate() {
            assert_eq!(usize::from(host.id()), i);
        }

        Self {
            policy,
            hosts: hosts.into_iter().map(AtomicRefCell::new).collect(),
            routing,
            runahead,
            counters,
            end_time,
            seed,
        }
    }

    pub fn host(&self, id: HostId) -> &AtomicRefCell<Host> {
        &self.hosts[usize::from(id)]
    }

    pub fn hosts(&self) -> &[AtomicRefCell<Host>] {
        &self.hosts
    }

    pub fn policy(&self) -> &SchedulerPolicy {
        &self.policy
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn runahead(&self) -> &Runahead {
        &self.runahead
    }

    pub fn counters(&self) -> &SharedCounters {
        &self.counters
    }

    pub fn end_time(&self) -> EmulatedTime {
        self.end_time
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Queue an event with the active policy. A host pushing an event to
    /// itself into its own past is a programming error in the caller and
    /// fatal; an inter-host event below the barrier is raised to it by the
    /// policy.
    pub fn push_event(&self, event: Event, barrier: EmulatedTime) {
        if !event.is_inter_host() {
            if let Some(now) = Worker::current_time() {
                assert!(
                    event.time() >= now,
                    "Host {:?} scheduled an event for itself at {}, in the past of its clock {}",
                    event.src_host_id(),
                    event.time(),
                    now,
                );
            }
        }

        self.policy.push(event, barrier);
    }
}
