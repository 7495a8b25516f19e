//! Simulation calendar: the generation window, day iteration and the
//! day-of-week / end-of-month activity multipliers.

use crate::{
    config::SegmentConfig,
    types::{Day, Timestamp},
};
use chrono::{Datelike, Duration, NaiveTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimCalendar {
    pub start: Day,
    /// Inclusive last day of the window.
    pub end: Day,
}

impl SimCalendar {
    pub fn new(start: Day, end: Day) -> Self {
        Self { start, end }
    }

    /// Every day in [start, end].
    pub fn days(&self) -> impl Iterator<Item = Day> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, day: Day) -> bool {
        self.start <= day && day <= self.end
    }

    /// Monday-first multiplier from the segment profile.
    pub fn dow_multiplier(segment: &SegmentConfig, day: Day) -> f64 {
        segment.dow_multipliers[day.weekday().num_days_from_monday() as usize]
    }

    /// Segment end-of-month multiplier inside the last `eom_window_days`, else 1.0.
    pub fn eom_multiplier(segment: &SegmentConfig, day: Day) -> f64 {
        if days_to_month_end(day) < segment.eom_window_days {
            segment.eom_multiplier
        } else {
            1.0
        }
    }
}

/// Days remaining after `day` in its month (0 on the last day).
pub fn days_to_month_end(day: Day) -> u32 {
    let mut cursor = day;
    let mut remaining = 0;
    while let Some(next) = cursor.succ_opt() {
        if next.month() != day.month() {
            break;
        }
        remaining += 1;
        cursor = next;
    }
    remaining
}

pub fn at(day: Day, hour: u32, minute: u32) -> Timestamp {
    let time = NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0).unwrap_or(NaiveTime::MIN);
    day.and_time(time)
}

pub fn add_days(day: Day, days: i64) -> Day {
    day.checked_add_signed(Duration::days(days)).unwrap_or(day)
}
