//! Wall-clock snapshots for time-of-day logic.

use chrono::{Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};

/// A local wall-clock snapshot.
///
/// Exposed to guard and action expressions as `getTime()`, and used by the
/// engine to compute the next occurrence of a scheduled `HH:MM` trigger.
/// `weekday` is 0 = Monday .. 6 = Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub weekday: u32,
}

impl ClockTime {
    /// Snapshot the current local time.
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            hour: now.hour(),
            minute: now.minute(),
            second: now.second(),
            weekday: now.weekday().num_days_from_monday(),
        }
    }

    /// Seconds elapsed since local midnight.
    pub fn seconds_of_day(&self) -> u64 {
        self.hour as u64 * 3600 + self.minute as u64 * 60 + self.second as u64
    }

    /// Seconds from this snapshot until the next local occurrence of
    /// `hour:minute`. Rolls to tomorrow when the target already passed.
    pub fn seconds_until(&self, hour: u32, minute: u32) -> u64 {
        let target = hour as u64 * 3600 + minute as u64 * 60;
        let now = self.seconds_of_day();
        if target > now {
            target - now
        } else {
            86_400 - now + target
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32, second: u32) -> ClockTime {
        ClockTime {
            hour,
            minute,
            second,
            weekday: 0,
        }
    }

    #[test]
    fn test_seconds_until_later_today() {
        let clock = at(8, 0, 0);
        assert_eq!(clock.seconds_until(8, 30), 30 * 60);
    }

    #[test]
    fn test_seconds_until_rolls_to_tomorrow() {
        let clock = at(23, 30, 0);
        assert_eq!(clock.seconds_until(23, 0), 23 * 3600 + 30 * 60);
    }

    #[test]
    fn test_exact_time_rolls_full_day() {
        let clock = at(9, 15, 0);
        assert_eq!(clock.seconds_until(9, 15), 86_400);
    }
}
