use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::core::configuration::{ConfigOptions, MessageOptions};
use crate::core::runahead::Runahead;
use crate::core::scheduler::policy::{PolicyKind, SchedulerPolicy};
use crate::core::scheduler::Scheduler;
use crate::core::sim_stats::{self, RoundStats, SharedCounters, SimStats};
use crate::core::support::emulated_time::EmulatedTime;
use crate::core::support::simulation_time::SimulationTime;
use crate::core::work::event::Event;
use crate::core::work::task::TaskRef;
use crate::core::worker::WorkerShared;
use crate::host::host::{Host, HostId, HostInfo};
use crate::network::packet::Packet;
use crate::network::routing::{PathProperties, RoutingTable};
use crate::utility::counter::Counter;
use crate::utility::perf_timer::PerfTimer;

/// Builds the simulation out of a validated configuration and drives it to
/// completion.
pub struct Controller {
    scheduler: Scheduler,
    shared: Arc<WorkerShared>,
    data_directory: Option<PathBuf>,
}

impl Controller {
    pub fn new(config: &ConfigOptions) -> anyhow::Result<Self> {
        validate(config)?;

        let seed = config.seed();
        let num_workers = config.parallelism();
        let stop_time = config.stop_time().unwrap();
        let end_time = EmulatedTime::SIMULATION_START + stop_time;

        // root RNG; host seeds are drawn from it in configuration order
        let mut root_rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        let name_to_id: HashMap<String, HostId> = config
            .hosts
            .iter()
            .enumerate()
            .map(|(i, h)| (h.name.clone(), HostId::from(u32::try_from(i).unwrap())))
            .collect();

        let routing = build_routing_table(config, &name_to_id)?;

        let codel_params = config.codel_params();
        let hosts: Vec<Host> = config
            .hosts
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let info = HostInfo {
                    id: HostId::from(u32::try_from(i).unwrap()),
                    name: h.name.clone(),
                    seed: root_rng.gen(),
                };
                Host::new(info, codel_params)
            })
            .collect();

        let counters = Arc::new(SharedCounters::default());
        let mut policy = SchedulerPolicy::new(
            config.scheduler_policy(),
            num_workers as usize,
            Arc::clone(&counters),
        );
        for (i, host_options) in config.hosts.iter().enumerate() {
            policy.add_host(HostId::from(u32::try_from(i).unwrap()), host_options.worker);
        }

        let runahead = Runahead::new(
            config.use_dynamic_runahead(),
            routing.smallest_latency(),
            config.runahead(),
        );

        let shared = Arc::new(WorkerShared::new(
            policy,
            hosts,
            routing,
            runahead,
            counters,
            end_time,
            seed,
        ));

        schedule_workload(&shared, config, &name_to_id)?;

        let scheduler = Scheduler::new(Arc::clone(&shared), num_workers);

        Ok(Self {
            scheduler,
            shared,
            data_directory: config.data_directory().map(PathBuf::from),
        })
    }

    /// The flag that asks the run to stop after the current round; wire it
    /// to a signal handler.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.scheduler.stop_flag()
    }

    pub fn shared(&self) -> &Arc<WorkerShared> {
        &self.shared
    }

    /// Run the simulation to completion and return the stats snapshot.
    pub fn run(mut self) -> anyhow::Result<SimStats> {
        log::info!("Running simulation until {}", self.shared.end_time());
        let wall_timer = PerfTimer::new_started();

        self.scheduler.run();

        log::info!(
            "Finished simulation at {} after {:?} of wall time",
            self.scheduler.current_time(),
            wall_timer.elapsed(),
        );

        let stats = self.snapshot_stats();

        if let Some(dir) = &self.data_directory {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory '{}'", dir.display()))?;
            sim_stats::write_stats_to_file(&dir.join("stats.json"), &stats)?;
        }

        log::info!(
            "{} events executed over {} rounds; {} packets sent, {} lost to paths, {} dropped by routers",
            stats.events.popped,
            stats.rounds.count,
            stats.packets.sent,
            stats.packets.dropped_unreliable,
            stats.packets.dropped_aqm,
        );

        self.scheduler.join();

        Ok(stats)
    }

    fn snapshot_stats(&self) -> SimStats {
        let rounds = RoundStats {
            count: self
                .shared
                .counters()
                .rounds
                .load(Ordering::Relaxed),
            total_wall_time_ms: u64::try_from(self.scheduler.total_round_time().as_millis())
                .unwrap(),
            longest_wall_time_ms: u64::try_from(self.scheduler.longest_round_time().as_millis())
                .unwrap(),
        };

        let mut host_event_counts = Counter::new();
        for cell in self.shared.hosts() {
            let host = cell.borrow();
            host_event_counts.add_value(host.name(), host.num_events_executed());
        }

        self.shared.counters().snapshot(rounds, host_event_counts)
    }
}

fn validate(config: &ConfigOptions) -> anyhow::Result<()> {
    let stop_time = config
        .stop_time()
        .ok_or_else(|| anyhow::anyhow!("A stop_time must be configured"))?;
    anyhow::ensure!(stop_time.is_positive(), "stop_time must be nonzero");

    let workers = config.parallelism();
    anyhow::ensure!(workers >= 1, "parallelism must be at least 1");
    if config.scheduler_policy() == PolicyKind::GlobalSingle {
        anyhow::ensure!(
            workers == 1,
            "the global-single policy requires parallelism=1, not {workers}"
        );
    }

    anyhow::ensure!(
        config.latency().is_positive(),
        "the network latency must be nonzero"
    );
    anyhow::ensure!(
        (0.0..=1.0).contains(&config.reliability()),
        "reliability must be a probability in [0, 1]"
    );

    let codel = config.codel_params();
    anyhow::ensure!(codel.limit >= 1, "the router queue limit must be nonzero");
    anyhow::ensure!(
        codel.target.is_positive() && codel.interval.is_positive(),
        "the router target and interval must be nonzero"
    );

    let mut names = std::collections::HashSet::new();
    for host in &config.hosts {
        anyhow::ensure!(!host.name.is_empty(), "host names must be nonempty");
        anyhow::ensure!(
            names.insert(host.name.as_str()),
            "duplicate host name '{}'",
            host.name
        );
        if let Some(worker) = host.worker {
            anyhow::ensure!(
                worker < workers,
                "host '{}' is pinned to worker {worker}, but there are only {workers} workers",
                host.name
            );
        }
    }

    Ok(())
}

fn build_routing_table(
    config: &ConfigOptions,
    name_to_id: &HashMap<String, HostId>,
) -> anyhow::Result<RoutingTable> {
    let default_path = PathProperties {
        latency: config.latency(),
        reliability: config.reliability(),
    };
    let mut routing = RoutingTable::new(default_path);

    for link in config.links() {
        let src = *name_to_id
            .get(&link.src)
            .with_context(|| format!("link references unknown host '{}'", link.src))?;
        let dst = *name_to_id
            .get(&link.dst)
            .with_context(|| format!("link references unknown host '{}'", link.dst))?;
        anyhow::ensure!(src != dst, "link from '{}' to itself", link.src);

        let path = PathProperties {
            latency: link.latency.map(|t| t.interval()).unwrap_or(default_path.latency),
            reliability: link.reliability.unwrap_or(default_path.reliability),
        };
        anyhow::ensure!(
            path.latency.is_positive(),
            "the link from '{}' to '{}' must have nonzero latency",
            link.src,
            link.dst
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&path.reliability),
            "the link from '{}' to '{}' must have a reliability in [0, 1]",
            link.src,
            link.dst
        );

        routing.set_path(src, dst, path);
        if link.bidirectional.unwrap_or(true) {
            routing.set_path(dst, src, path);
        }
    }

    Ok(routing)
}

/// Queue the configured message workloads and install the receive handlers.
fn schedule_workload(
    shared: &Arc<WorkerShared>,
    config: &ConfigOptions,
    name_to_id: &HashMap<String, HostId>,
) -> anyhow::Result<()> {
    for (i, host_options) in config.hosts.iter().enumerate() {
        let src = HostId::from(u32::try_from(i).unwrap());

        let Some(messages) = &host_options.messages else {
            continue;
        };
        if messages.count == 0 {
            continue;
        }

        let dst = *name_to_id.get(&messages.to).with_context(|| {
            format!(
                "host '{}' messages unknown peer '{}'",
                host_options.name, messages.to
            )
        })?;
        anyhow::ensure!(
            dst != src,
            "host '{}' cannot message itself",
            host_options.name
        );

        let start_time = EmulatedTime::SIMULATION_START
            + messages
                .start_time
                .map(|t| t.interval())
                .unwrap_or(SimulationTime::ZERO);

        let task = message_task(dst, messages);
        let event = Event::new(task, start_time, src, src);
        shared.push_event(event, EmulatedTime::SIMULATION_START);
    }

    // every host drains arriving packets as they surface
    for cell in shared.hosts() {
        let host = cell.borrow();
        host.set_packet_handler(TaskRef::new(|host| {
            while let Some(packet) = host.receive() {
                log::debug!(
                    "Received a {}-byte packet from {:?}",
                    packet.len(),
                    packet.src_host_id(),
                );
            }
        }));
    }

    Ok(())
}

/// A task that sends one packet of the configured workload and reschedules
/// itself until the count is exhausted.
fn message_task(dst: HostId, messages: &MessageOptions) -> TaskRef {
    let remaining = messages.count;
    let interval = messages.interval.interval();
    let payload_len = messages.payload.unwrap_or(512);

    fn make_task(
        dst: HostId,
        remaining: u64,
        interval: SimulationTime,
        payload_len: usize,
    ) -> TaskRef {
        TaskRef::new(move |host| {
            let payload = host.with_random_mut(|rng| {
                let mut buf = vec![0u8; payload_len];
                rng.fill(&mut buf[..]);
                buf
            });
            host.send_packet(Packet::new(host.id(), dst, payload));

            if remaining > 1 {
                let next = make_task(dst, remaining - 1, interval, payload_len);
                host.schedule_task_with_delay(next, interval);
            }
        })
    }

    make_task(dst, remaining, interval, payload_len)
}
