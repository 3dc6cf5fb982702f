use std::sync::RwLock;

use crate::core::support::simulation_time::SimulationTime;

/// Decides the lookahead for the next round (how far past `now` the barrier
/// may be placed).
///
/// A larger lookahead means more hosts and more events run in parallel per
/// round, but inter-host packets whose path latency is below it get delayed
/// to the barrier. The static floor is the smallest latency possible in the
/// topology; when dynamic lookahead is enabled, the value tightens to the
/// smallest latency actually routed over so far (it only ever tightens, so a
/// barrier already promised to the workers can never be invalidated).
#[derive(Debug)]
pub struct Runahead {
    /// The lowest packet latency used so far. Only updated when dynamic
    /// lookahead is enabled.
    min_used_latency: RwLock<Option<SimulationTime>>,
    /// The lowest latency that's possible in the topology (the edge with the
    /// lowest latency).
    min_possible_latency: SimulationTime,
    /// A lower bound for the lookahead from configuration.
    min_runahead_config: Option<SimulationTime>,
    /// Is dynamic lookahead enabled?
    is_runahead_dynamic: bool,
}

impl Runahead {
    pub fn new(
        is_runahead_dynamic: bool,
        min_possible_latency: SimulationTime,
        min_runahead_config: Option<SimulationTime>,
    ) -> Self {
        assert!(!min_possible_latency.is_zero());

        Self {
            min_used_latency: RwLock::new(None),
            min_possible_latency,
            min_runahead_config,
            is_runahead_dynamic,
        }
    }

    /// Get the lookahead for the next round.
    pub fn get(&self) -> SimulationTime {
        // if no latency has been used yet (or dynamic lookahead is
        // disabled), start from the smallest possible latency
        let runahead = self
            .min_used_latency
            .read()
            .unwrap()
            .unwrap_or(self.min_possible_latency);

        // the configured value sets a lower bound
        let runahead_config = self.min_runahead_config.unwrap_or(SimulationTime::ZERO);
        std::cmp::max(runahead, runahead_config)
    }

    /// If dynamic lookahead is enabled, compare and update the stored lowest
    /// packet latency. This may shorten the lookahead for future rounds.
    pub fn update_lowest_used_latency(&self, latency: SimulationTime) {
        assert!(latency > SimulationTime::ZERO);

        if !self.is_runahead_dynamic {
            return;
        }

        // helper for checking if the update applies
        let should_update = |min_used_latency: &Option<SimulationTime>| match min_used_latency {
            Some(min_used_latency) => latency < *min_used_latency,
            None => true,
        };

        // an initial check with only a read lock
        {
            let min_used_latency = self.min_used_latency.read().unwrap();

            if !should_update(&min_used_latency) {
                return;
            }
        }

        let old_runahead;

        // check the same condition again, but with a write lock
        {
            let mut min_used_latency = self.min_used_latency.write().unwrap();

            if !should_update(&min_used_latency) {
                return;
            }

            // cache the value for logging
            old_runahead = *min_used_latency;

            *min_used_latency = Some(latency);
        }

        // these info messages may appear out-of-order in the log
        log::info!(
            "Minimum time lookahead for next scheduling round updated from {:?} \
             to {} ns; the minimum config override is {:?} ns",
            old_runahead.map(|x| x.as_nanos()),
            latency.as_nanos(),
            self.min_runahead_config.map(|x| x.as_nanos()),
        );
    }
}
