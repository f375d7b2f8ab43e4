use chrono::{Local, NaiveDateTime, NaiveTime};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid schedule time '{0}': expected HH:MM")]
    InvalidTime(String),
}

/// Minute-resolution time of day, written as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTime(NaiveTime);

impl ScheduleTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn matches(&self, now: NaiveDateTime) -> bool {
        now.format("%H:%M").to_string() == self.to_string()
    }
}

impl FromStr for ScheduleTime {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M")
            .map(Self)
            .map_err(|_| ScheduleError::InvalidTime(s.to_string()))
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// Once-a-day trigger.
///
/// The marker holds the date and minute of the last firing. A tick fires when
/// its wall-clock minute equals the schedule and the marker differs, so each
/// calendar day fires at most once and a tick that never lands inside the
/// scheduled minute skips that day.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    at: ScheduleTime,
    last_fired: Option<String>,
}

impl DailySchedule {
    pub fn new(at: ScheduleTime) -> Self {
        Self {
            at,
            last_fired: None,
        }
    }

    pub fn at(&self) -> ScheduleTime {
        self.at
    }

    pub fn last_fired(&self) -> Option<&str> {
        self.last_fired.as_deref()
    }

    pub fn should_fire(&self, now: NaiveDateTime) -> bool {
        self.at.matches(now) && self.last_fired.as_deref() != Some(marker(now).as_str())
    }

    pub fn mark_fired(&mut self, now: NaiveDateTime) {
        self.last_fired = Some(marker(now));
    }
}

fn marker(now: NaiveDateTime) -> String {
    now.format("%Y-%m-%d %H:%M").to_string()
}

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let time: ScheduleTime = "08:00".parse().unwrap();
        assert_eq!(time.to_string(), "08:00");
        assert_eq!(time, ScheduleTime::new(8, 0).unwrap());

        let padded: ScheduleTime = " 23:59 ".parse().unwrap();
        assert_eq!(padded.to_string(), "23:59");
    }

    #[test]
    fn test_rejects_malformed_times() {
        for bad in ["", "8am", "24:00", "12:60", "12-30", "noon"] {
            assert!(bad.parse::<ScheduleTime>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_fires_once_within_the_minute() {
        let mut schedule = DailySchedule::new("08:00".parse().unwrap());

        assert!(!schedule.should_fire(at(1, 7, 59, 50)));
        assert!(schedule.should_fire(at(1, 8, 0, 0)));
        schedule.mark_fired(at(1, 8, 0, 0));

        assert!(!schedule.should_fire(at(1, 8, 0, 10)));
        assert!(!schedule.should_fire(at(1, 8, 0, 59)));
        assert!(!schedule.should_fire(at(1, 8, 1, 0)));
        assert_eq!(schedule.last_fired(), Some("2024-03-01 08:00"));
    }

    #[test]
    fn test_fires_again_the_next_day() {
        let mut schedule = DailySchedule::new("08:00".parse().unwrap());
        schedule.mark_fired(at(1, 8, 0, 5));
        assert!(schedule.should_fire(at(2, 8, 0, 5)));
    }

    #[test]
    fn test_skipped_minute_does_not_fire() {
        let schedule = DailySchedule::new("08:00".parse().unwrap());
        assert!(!schedule.should_fire(at(1, 7, 59, 59)));
        assert!(!schedule.should_fire(at(1, 8, 1, 0)));
    }
}
