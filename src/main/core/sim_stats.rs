use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use serde::Serialize;

use crate::utility::counter::Counter;

/// Live counters shared by the scheduler and every worker. Incremented with
/// relaxed atomics; readable at any time by whatever is watching the run.
#[derive(Debug, Default)]
pub struct SharedCounters {
    pub events_pushed: AtomicU64,
    pub events_popped: AtomicU64,
    /// Inter-host events whose time was raised to the barrier at push.
    pub events_clamped: AtomicU64,
    pub packets_sent: AtomicU64,
    /// Packets lost to path reliability.
    pub packets_dropped_unreliable: AtomicU64,
    /// Packets dropped by a router's AQM queue (standing delay or overflow).
    pub packets_dropped_aqm: AtomicU64,
    pub rounds: AtomicU64,
}

#[derive(Serialize, Clone, Debug)]
pub struct EventStats {
    pub pushed: u64,
    pub popped: u64,
    pub clamped: u64,
}

#[derive(Serialize, Clone, Debug)]
pub struct PacketStats {
    pub sent: u64,
    pub dropped_unreliable: u64,
    pub dropped_aqm: u64,
}

#[derive(Serialize, Clone, Debug)]
pub struct RoundStats {
    pub count: u64,
    pub total_wall_time_ms: u64,
    pub longest_wall_time_ms: u64,
}

/// An end-of-run snapshot, written as JSON into the data directory.
#[derive(Serialize, Clone, Debug)]
pub struct SimStats {
    pub events: EventStats,
    pub packets: PacketStats,
    pub rounds: RoundStats,
    /// Events executed per host, heaviest hitters first.
    pub host_event_counts: Counter,
}

impl SharedCounters {
    pub fn snapshot(
        &self,
        rounds: RoundStats,
        host_event_counts: Counter,
    ) -> SimStats {
        SimStats {
            events: EventStats {
                pushed: self.events_pushed.load(Ordering::Relaxed),
                popped: self.events_popped.load(Ordering::Relaxed),
                clamped: self.events_clamped.load(Ordering::Relaxed),
            },
            packets: PacketStats {
                sent: self.packets_sent.load(Ordering::Relaxed),
                dropped_unreliable: self.packets_dropped_unreliable.load(Ordering::Relaxed),
                dropped_aqm: self.packets_dropped_aqm.load(Ordering::Relaxed),
            },
            rounds,
            host_event_counts,
        }
    }
}

pub fn write_stats_to_file(filename: &std::path::Path, stats: &SimStats) -> anyhow::Result<()> {
    let file = std::fs::File::create(filename)
        .with_context(|| format!("Failed to create file '{}'", filename.display()))?;

    serde_json::to_writer_pretty(file, stats).with_context(|| {
        format!(
            "Failed to write stats json to file '{}'",
            filename.display()
        )
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_file_round_trip() {
        let counters = SharedCounters::default();
        counters.events_pushed.fetch_add(3, Ordering::Relaxed);
        counters.events_popped.fetch_add(3, Ordering::Relaxed);

        let mut host_counts = Counter::new();
        host_counts.add_value("alice", 2);
        host_counts.add_value("bob", 1);

        let stats = counters.snapshot(
            RoundStats {
                count: 1,
                total_wall_time_ms: 5,
                longest_wall_time_ms: 5,
            },
            host_counts,
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        write_stats_to_file(&path, &stats).unwrap();

        let json: serde_json::Value =
            serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(json["events"]["pushed"], 3);
        assert_eq!(json["host_event_counts"]["alice"], 2);
    }
}
