/*!
Instants on the simulated clock.
*/

use static_assertions::const_assert;

use crate::core::support::simulation_time::{SimulationTime, SIMTIME_ONE_SECOND};

/// An instant in simulated time (analogous to `std::time::Instant`).
/// Internally a count of nanoseconds since the Unix epoch, so that hosts can
/// present applications with a plausible calendar date.
#[derive(Copy, Clone, Eq, PartialEq, Debug, PartialOrd, Ord, Hash)]
pub struct EmulatedTime(u64);

/// Seconds from the Unix epoch to 00:00:00 UTC on 1 January 2000, the
/// instant at which every simulation starts.
pub const SIMULATION_START_SEC: u64 = 946_684_800;

const SIMULATION_START_NANOS: u64 = 946_684_800_000_000_000;
const_assert!(SIMULATION_START_NANOS == SIMULATION_START_SEC * SIMTIME_ONE_SECOND);

impl EmulatedTime {
    /// The start time of the simulation - 00:00:00 UTC on 1 January, 2000.
    pub const SIMULATION_START: Self = Self(SIMULATION_START_NANOS);
    /// The Unix epoch (00:00:00 UTC on 1 January 1970).
    pub const UNIX_EPOCH: Self = Self(0);

    pub const MAX: Self = Self(u64::MAX - 1);
    pub const MIN: Self = Self(0);

    /// The instant `val` after the start of the simulation.
    pub fn from_abs_simtime(val: SimulationTime) -> Self {
        Self::SIMULATION_START + val
    }

    /// The interval since the start of the simulation.
    pub fn to_abs_simtime(self) -> SimulationTime {
        self.duration_since(&Self::SIMULATION_START)
    }

    /// Returns the duration since `earlier`, panicking if `earlier` is after
    /// `self`.
    pub fn duration_since(&self, earlier: &EmulatedTime) -> SimulationTime {
        self.checked_duration_since(earlier).unwrap()
    }

    /// Returns the duration since `earlier`, or `None` if `earlier` is after
    /// `self`.
    pub fn checked_duration_since(&self, earlier: &EmulatedTime) -> Option<SimulationTime> {
        let d = self.0.checked_sub(earlier.0)?;
        Some(SimulationTime::from_nanos(d))
    }

    /// Returns the duration since `earlier`, or 0 if `earlier` is after
    /// `self`.
    pub fn saturating_duration_since(&self, earlier: &EmulatedTime) -> SimulationTime {
        self.checked_duration_since(earlier)
            .unwrap_or(SimulationTime::ZERO)
    }

    pub fn checked_add(&self, duration: SimulationTime) -> Option<EmulatedTime> {
        match self.0.checked_add(duration.as_nanos()) {
            Some(sum) if sum <= Self::MAX.0 => Some(Self(sum)),
            _ => None,
        }
    }

    pub fn checked_sub(&self, duration: SimulationTime) -> Option<EmulatedTime> {
        self.0.checked_sub(duration.as_nanos()).map(Self)
    }

    pub fn saturating_add(&self, duration: SimulationTime) -> EmulatedTime {
        self.checked_add(duration).unwrap_or(Self::MAX)
    }
}

impl std::ops::Add<SimulationTime> for EmulatedTime {
    type Output = EmulatedTime;

    fn add(self, other: SimulationTime) -> Self::Output {
        self.checked_add(other).unwrap()
    }
}

impl std::ops::AddAssign<SimulationTime> for EmulatedTime {
    fn add_assign(&mut self, other: SimulationTime) {
        *self = *self + other;
    }
}

impl std::ops::Sub<SimulationTime> for EmulatedTime {
    type Output = EmulatedTime;

    fn sub(self, other: SimulationTime) -> Self::Output {
        self.checked_sub(other).unwrap()
    }
}

impl std::ops::Sub<EmulatedTime> for EmulatedTime {
    type Output = SimulationTime;

    fn sub(self, other: EmulatedTime) -> Self::Output {
        self.duration_since(&other)
    }
}

impl std::fmt::Display for EmulatedTime {
    /// Renders as the interval since the simulation started, as
    /// `hh:mm:ss.nnnnnnnnn`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = crate::utility::time::TimeParts::from_nanos(
            self.saturating_duration_since(&Self::SIMULATION_START)
                .as_nanos()
                .into(),
        );
        write!(f, "{}", parts.fmt_hr_min_sec_nano())
    }
}
