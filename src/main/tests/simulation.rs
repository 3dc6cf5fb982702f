//! Whole-simulation tests driving the scheduler through its public API.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use clap::Parser;

use umbra::core::configuration::{CliOptions, ConfigFileOptions, ConfigOptions};
use umbra::core::controller::Controller;
use umbra::core::runahead::Runahead;
use umbra::core::scheduler::policy::{PolicyKind, SchedulerPolicy};
use umbra::core::scheduler::Scheduler;
use umbra::core::sim_stats::SharedCounters;
use umbra::core::support::emulated_time::EmulatedTime;
use umbra::core::support::simulation_time::SimulationTime;
use umbra::core::work::event::Event;
use umbra::core::work::task::TaskRef;
use umbra::core::worker::{Worker, WorkerShared};
use umbra::host::host::{Host, HostId, HostInfo};
use umbra::network::router::CoDelParams;
use umbra::network::routing::{PathProperties, RoutingTable};

fn start_plus(nanos: u64) -> EmulatedTime {
    EmulatedTime::SIMULATION_START + SimulationTime::from_nanos(nanos)
}

/// A small simulation: `num_hosts` hosts spread over `num_workers` workers,
/// 10ns lookahead, ending `end_nanos` after the start.
fn build_sim(
    kind: PolicyKind,
    num_workers: u32,
    num_hosts: u32,
    end_nanos: u64,
) -> (Arc<WorkerShared>, Scheduler) {
    let routing = RoutingTable::new(PathProperties {
        latency: SimulationTime::from_nanos(10),
        reliability: 1.0,
    });

    let counters = Arc::new(SharedCounters::default());
    let mut policy = SchedulerPolicy::new(kind, num_workers as usize, Arc::clone(&counters));

    let hosts: Vec<Host> = (0..num_hosts)
        .map(|i| {
            policy.add_host(HostId::from(i), Some(i % num_workers));
            Host::new(
                HostInfo {
                    id: HostId::from(i),
                    name: format!("host{i}"),
                    seed: u64::from(i),
                },
                CoDelParams::default(),
            )
        })
        .collect();

    let runahead = Runahead::new(false, routing.smallest_latency(), None);

    let shared = Arc::new(WorkerShared::new(
        policy,
        hosts,
        routing,
        runahead,
        counters,
        start_plus(end_nanos),
        1,
    ));
    let scheduler = Scheduler::new(Arc::clone(&shared), num_workers);

    (shared, scheduler)
}

/// Schedule a no-op-recording event for `host` at `nanos` after the start.
fn record_at(shared: &Arc<WorkerShared>, host: u32, nanos: u64, trace: &Arc<Mutex<Vec<(u32, u64)>>>) {
    let trace = Arc::clone(trace);
    let task = TaskRef::new(move |host| {
        let now = Worker::current_time().unwrap();
        trace
            .lock()
            .unwrap()
            .push((host.id().into(), now.to_abs_simtime().as_nanos()));
    });

    let event = Event::new(task, start_plus(nanos), HostId::from(host), HostId::from(host));
    shared.push_event(event, EmulatedTime::SIMULATION_START);
}

#[test]
fn empty_run_terminates_at_end_time() {
    let (shared, mut scheduler) = build_sim(PolicyKind::HostSingle, 1, 1, 1000);

    scheduler.run();

    assert_eq!(scheduler.current_time(), start_plus(1000));
    assert_eq!(shared.counters().events_pushed.load(Ordering::Relaxed), 0);
    assert_eq!(shared.counters().events_popped.load(Ordering::Relaxed), 0);
    scheduler.join();
}

#[test]
fn serial_baseline_pops_in_time_then_push_order() {
    let (shared, mut scheduler) = build_sim(PolicyKind::GlobalSingle, 1, 1, 1000);

    let trace = Arc::new(Mutex::new(Vec::new()));
    for t in [5, 3, 5, 1] {
        record_at(&shared, 0, t, &trace);
    }

    scheduler.run();
    scheduler.join();

    let times: Vec<u64> = trace.lock().unwrap().iter().map(|(_, t)| *t).collect();
    assert_eq!(times, vec![1, 3, 5, 5]);
    assert_eq!(shared.counters().events_popped.load(Ordering::Relaxed), 4);
}

#[test]
fn parallel_hosts_match_the_serial_baseline() {
    let (shared, mut scheduler) = build_sim(PolicyKind::HostSingle, 4, 4, 1000);

    let trace = Arc::new(Mutex::new(Vec::new()));
    for host in 0..4 {
        for t in [5, 3, 5, 1] {
            record_at(&shared, host, t, &trace);
        }
    }

    scheduler.run();
    scheduler.join();

    // each host saw the serial order, regardless of worker interleaving
    let trace = trace.lock().unwrap();
    for host in 0..4 {
        let times: Vec<u64> = trace
            .iter()
            .filter(|(h, _)| *h == host)
            .map(|(_, t)| *t)
            .collect();
        assert_eq!(times, vec![1, 3, 5, 5], "host {host}");
    }
    assert_eq!(trace.len(), 16);
}

#[test]
fn inter_host_events_are_raised_to_the_barrier() {
    let (shared, mut scheduler) = build_sim(PolicyKind::HostSingle, 2, 2, 1000);

    let delivery_times = Arc::new(Mutex::new(Vec::new()));

    // host 0 runs at t=2 (inside the round [2, 3)) and pushes an event for
    // host 1 at its own current time, below the barrier; the push must land
    // at the barrier, never at t=2
    {
        let delivery_times = Arc::clone(&delivery_times);
        let recorder = TaskRef::new(move |host| {
            let now = Worker::current_time().unwrap();
            delivery_times
                .lock()
                .unwrap()
                .push((host.id(), now.to_abs_simtime().as_nanos()));
        });

        let sender = TaskRef::new(move |host| {
            let now = Worker::current_time().unwrap();
            let event = Event::new(recorder.clone(), now, host.id(), HostId::from(1));
            Worker::push_event(event);
        });

        let event = Event::new(sender, start_plus(2), HostId::from(0), HostId::from(0));
        shared.push_event(event, EmulatedTime::SIMULATION_START);
    }

    scheduler.run();
    scheduler.join();

    let delivery_times = delivery_times.lock().unwrap();
    assert_eq!(delivery_times.len(), 1);
    let (dst, time) = delivery_times[0];
    assert_eq!(dst, HostId::from(1));
    // the clock first jumps to the event at 2, so the round that executes
    // the sender spans [2, 3); the push is raised from 2 to the barrier at 3
    assert_eq!(time, 3);
    assert_eq!(
        shared.counters().events_clamped.load(Ordering::Relaxed),
        1
    );
}

#[test]
fn packets_deliver_after_the_path_latency() {
    let (shared, mut scheduler) = build_sim(PolicyKind::HostSingle, 2, 2, 1000);

    // record when host 1 sees each packet surface
    let receive_times = Arc::new(Mutex::new(Vec::new()));
    {
        let receive_times = Arc::clone(&receive_times);
        shared
            .host(HostId::from(1))
            .borrow()
            .set_packet_handler(TaskRef::new(move |host| {
                while let Some(packet) = host.receive() {
                    let now = Worker::current_time().unwrap();
                    receive_times
                        .lock()
                        .unwrap()
                        .push((now.to_abs_simtime().as_nanos(), packet.digest()));
                }
            }));
    }

    // host 0 sends one packet at t=5; the path latency is 10, which also
    // equals the lookahead
    let sender = TaskRef::new(|host| {
        host.send_packet(umbra::network::packet::Packet::new(
            host.id(),
            HostId::from(1),
            vec![1, 2, 3],
        ));
    });
    let event = Event::new(sender, start_plus(5), HostId::from(0), HostId::from(0));
    shared.push_event(event, EmulatedTime::SIMULATION_START);

    scheduler.run();
    scheduler.join();

    let receive_times = receive_times.lock().unwrap();
    assert_eq!(receive_times.len(), 1);
    // delivered exactly at send time + max(latency, lookahead) = 5 + 10
    assert_eq!(receive_times[0].0, 15);
    assert_eq!(shared.counters().packets_sent.load(Ordering::Relaxed), 1);
}

#[test]
fn quiesced_simulation_exits_cleanly() {
    let (shared, mut scheduler) = build_sim(PolicyKind::HostSingle, 2, 2, 1_000_000);

    let trace = Arc::new(Mutex::new(Vec::new()));
    record_at(&shared, 0, 5, &trace);
    record_at(&shared, 1, 7, &trace);

    scheduler.run();
    // both events ran, then the clock jumped to the end with no idle rounds
    assert_eq!(scheduler.current_time(), start_plus(1_000_000));
    scheduler.join();

    assert_eq!(trace.lock().unwrap().len(), 2);
}

fn message_config(seed: u64, count: u64, reliability: f32) -> ConfigOptions {
    let yaml = format!(
        "
general:
  stop_time: 10s
  seed: {seed}
  parallelism: 2
  log_level: warn
network:
  latency: 50ms
  reliability: {reliability}
hosts:
  - name: alice
    messages:
      to: bob
      count: {count}
      interval: 1ms
  - name: bob
"
    );
    let file: ConfigFileOptions = serde_yaml::from_str(&yaml).unwrap();
    ConfigOptions::new(file, CliOptions::parse_from(["umbra"]))
}

#[test]
fn reliable_messages_all_arrive() {
    let config = message_config(1, 200, 1.0);
    let controller = Controller::new(&config).unwrap();
    let shared = Arc::clone(controller.shared());

    let stats = controller.run().unwrap();

    assert_eq!(stats.packets.sent, 200);
    assert_eq!(stats.packets.dropped_unreliable, 0);

    let bob = shared.host(HostId::from(1)).borrow();
    assert_eq!(bob.num_packets_received(), 200);
}

#[test]
fn unreliable_paths_drop_roughly_one_in_ten() {
    let count = 2000u64;
    let config = message_config(7, count, 0.9);
    let controller = Controller::new(&config).unwrap();
    let shared = Arc::clone(controller.shared());

    let stats = controller.run().unwrap();

    assert_eq!(stats.packets.sent + stats.packets.dropped_unreliable, count);

    // expect ~10% loss; allow five standard deviations either way
    // (sigma = sqrt(n * p * (1-p)) ~= 13.4)
    let dropped = stats.packets.dropped_unreliable;
    assert!((133..=267).contains(&dropped), "dropped {dropped}");

    let bob = shared.host(HostId::from(1)).borrow();
    assert_eq!(bob.num_packets_received(), stats.packets.sent);
}

#[test]
fn identical_configs_produce_identical_runs() {
    let run = |seed| {
        let config = message_config(seed, 500, 0.8);
        let controller = Controller::new(&config).unwrap();
        let shared = Arc::clone(controller.shared());
        let stats = controller.run().unwrap();
        let received = shared.host(HostId::from(1)).borrow().num_packets_received();
        (
            stats.events.pushed,
            stats.events.popped,
            stats.packets.sent,
            stats.packets.dropped_unreliable,
            received,
        )
    };

    let first = run(42);
    let second = run(42);
    assert_eq!(first, second);
}

#[test]
fn rejects_invalid_configurations() {
    let parse = |yaml: &str| {
        let file: ConfigFileOptions = serde_yaml::from_str(yaml).unwrap();
        ConfigOptions::new(file, CliOptions::parse_from(["umbra"]))
    };

    // no stop time
    assert!(Controller::new(&parse("hosts: []")).is_err());

    // global-single needs exactly one worker
    let config = parse(
        "
general:
  stop_time: 1s
  parallelism: 4
  scheduler_policy: global-single
",
    );
    assert!(Controller::new(&config).is_err());

    // a host pinned to a worker that doesn't exist
    let config = parse(
        "
general:
  stop_time: 1s
  parallelism: 1
hosts:
  - name: alice
    worker: 3
",
    );
    assert!(Controller::new(&config).is_err());

    // duplicate host names
    let config = parse(
        "
general:
  stop_time: 1s
hosts:
  - name: alice
  - name: alice
",
    );
    assert!(Controller::new(&config).is_err());
}
