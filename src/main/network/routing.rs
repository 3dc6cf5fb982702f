use std::collections::HashMap;

use crate::core::support::simulation_time::SimulationTime;
use crate::host::host::HostId;

/// Latency and reliability of the path between an ordered pair of hosts.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PathProperties {
    pub latency: SimulationTime,
    /// Probability in [0, 1] that a packet on this path arrives.
    pub reliability: f32,
}

/// Connectivity between every pair of hosts: a default path plus per-pair
/// overrides. This is the interface the scheduler and router consume; a
/// topology file loader would populate it through the same two entry points.
#[derive(Debug)]
pub struct RoutingTable {
    default_path: PathProperties,
    paths: HashMap<(HostId, HostId), PathProperties>,
    /// The lowest latency of any path, maintained on insert. This is the
    /// static floor for the scheduler's lookahead.
    smallest_latency: SimulationTime,
}

impl RoutingTable {
    pub fn new(default_path: PathProperties) -> Self {
        assert!(default_path.latency.is_positive());

        Self {
            default_path,
            paths: HashMap::new(),
            smallest_latency: default_path.latency,
        }
    }

    /// Override the path from `src` to `dst`. Paths are directed; callers
    /// wanting symmetry set both directions.
    pub fn set_path(&mut self, src: HostId, dst: HostId, path: PathProperties) {
        assert!(path.latency.is_positive());

        self.smallest_latency = std::cmp::min(self.smallest_latency, path.latency);
        self.paths.insert((src, dst), path);
    }

    pub fn path(&self, src: HostId, dst: HostId) -> PathProperties {
        self.paths
            .get(&(src, dst))
            .copied()
            .unwrap_or(self.default_path)
    }

    /// The smallest latency of any edge; the lower bound on inter-host
    /// message delay.
    pub fn smallest_latency(&self) -> SimulationTime {
        self.smallest_latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(millis: u64, reliability: f32) -> PathProperties {
        PathProperties {
            latency: SimulationTime::from_millis(millis),
            reliability,
        }
    }

    #[test]
    fn test_default_and_override() {
        let mut table = RoutingTable::new(path(10, 1.0));
        table.set_path(HostId::from(0), HostId::from(1), path(3, 0.9));

        assert_eq!(table.path(HostId::from(0), HostId::from(1)), path(3, 0.9));
        // the reverse direction was not overridden
        assert_eq!(table.path(HostId::from(1), HostId::from(0)), path(10, 1.0));
        assert_eq!(table.smallest_latency(), SimulationTime::from_millis(3));
    }

    #[test]
    #[should_panic]
    fn test_zero_latency_rejected() {
        let mut table = RoutingTable::new(path(10, 1.0));
        table.set_path(
            HostId::from(0),
            HostId::from(1),
            PathProperties {
                latency: SimulationTime::ZERO,
                reliability: 1.0,
            },
        );
    }
}
