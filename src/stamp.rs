//! Experiment start stamps for total-result rows.
//!
//! Acquisition records each cage's start time on a 12-hour clock. Rows carry it
//! as a `MMDDYY` date column and a 24-hour `HH:MM:SS` time column.

use chrono::{Datelike, NaiveDateTime, Timelike};

/// A wall-clock instant in 12-hour form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStamp {
    /// Calendar year
    pub year: i32,
    /// 1..=12
    pub month: u32,
    /// 1..=31
    pub day: u32,
    /// 1..=12
    pub hour12: u32,
    /// 0..=59
    pub minute: u32,
    /// 0..=59
    pub second: u32,
    /// Afternoon half of the day
    pub pm: bool,
}

impl CaptureStamp {
    /// Stamp for a local date and time.
    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        let (pm, hour12) = dt.hour12();
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour12,
            minute: dt.minute(),
            second: dt.second(),
            pm,
        }
    }

    /// Hour on the 24-hour clock: 12 AM is 0, 12 PM is 12.
    pub fn hour24(&self) -> u32 {
        to_24_hour(self.hour12, self.pm)
    }

    /// `MMDDYY`
    pub fn date_field(&self) -> String {
        format!(
            "{:02}{:02}{:02}",
            self.month,
            self.day,
            self.year.rem_euclid(100)
        )
    }

    /// `HH:MM:SS`
    pub fn time_field(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour24(), self.minute, self.second)
    }
}

impl From<NaiveDateTime> for CaptureStamp {
    fn from(dt: NaiveDateTime) -> Self {
        Self::from_datetime(&dt)
    }
}

/// Hour on the 24-hour clock for a 12-hour reading.
pub fn to_24_hour(hour12: u32, pm: bool) -> u32 {
    hour12 % 12 + if pm { 12 } else { 0 }
}
