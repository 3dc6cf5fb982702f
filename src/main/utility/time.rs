/// A nanosecond count broken into display units.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeParts {
    pub hours: u64,
    pub mins: u64,
    pub secs: u64,
    pub nanos: u64,
}

impl TimeParts {
    pub fn from_nanos(total_nanos: u128) -> Self {
        // u128 lets the caller pass Duration::as_nanos() directly; the
        // individual parts always fit in u64
        let total_secs = u64::try_from(total_nanos / 1_000_000_000).unwrap();
        let nanos = u64::try_from(total_nanos % 1_000_000_000).unwrap();

        let hours = total_secs / 3600;
        let mins = total_secs % 3600 / 60;
        let secs = total_secs % 60;

        Self {
            hours,
            mins,
            secs,
            nanos,
        }
    }

    /// A `h:mm:ss` string.
    pub fn fmt_hr_min_sec(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hours, self.mins, self.secs)
    }

    /// A `h:mm:ss.nnnnnnnnn` string.
    pub fn fmt_hr_min_sec_nano(&self) -> String {
        format!(
            "{:02}:{:02}:{:02}.{:09}",
            self.hours, self.mins, self.secs, self.nanos
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts() {
        let parts = TimeParts::from_nanos(90_061_000_000_500);
        assert_eq!(
            parts,
            TimeParts {
                hours: 25,
                mins: 1,
                secs: 1,
                nanos: 500,
            }
        );
        assert_eq!(parts.fmt_hr_min_sec(), "25:01:01");
        assert_eq!(parts.fmt_hr_min_sec_nano(), "25:01:01.000000500");
    }

    #[test]
    fn test_zero() {
        let parts = TimeParts::from_nanos(0);
        assert_eq!(parts.fmt_hr_min_sec(), "00:00:00");
    }
}
