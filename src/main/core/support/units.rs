/*!
Unit-suffixed values for configuration options, e.g. `10ms` or `1s`.
*/

use serde::{Deserialize, Serialize};

use crate::core::support::simulation_time::SimulationTime;

/// A duration with a unit suffix (`ns`, `us`, `ms`, `s`, `min`, `h`). A bare
/// integer is rejected so that config files are always explicit about units.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Time(SimulationTime);

impl Time {
    pub const fn new(interval: SimulationTime) -> Self {
        Self(interval)
    }

    pub fn interval(&self) -> SimulationTime {
        self.0
    }
}

impl From<SimulationTime> for Time {
    fn from(interval: SimulationTime) -> Self {
        Self(interval)
    }
}

impl std::str::FromStr for Time {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("'{s}' has no time unit suffix (ns, us, ms, s, min, h)"))?;
        let (digits, suffix) = s.split_at(split);

        let value: u64 = digits
            .parse()
            .map_err(|e| format!("invalid time value '{digits}': {e}"))?;

        let interval = match suffix.trim_start() {
            "ns" => SimulationTime::NANOSECOND,
            "us" => SimulationTime::MICROSECOND,
            "ms" => SimulationTime::MILLISECOND,
            "s" | "sec" => SimulationTime::SECOND,
            "min" => SimulationTime::SECOND * 60,
            "h" => SimulationTime::SECOND * 3600,
            unit => return Err(format!("unknown time unit '{unit}'")),
        };

        interval
            .checked_mul(value)
            .map(Time)
            .ok_or_else(|| format!("'{s}' overflows the simulated clock"))
    }
}

impl TryFrom<String> for Time {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Time> for String {
    fn from(t: Time) -> Self {
        t.to_string()
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
