//! Five-field cron expressions
//!
//! Fields are minute, hour, day of month, month and day of week. A field is
//! `*`, a value, a range `a-b`, a step `*/n`, `a-b/n` or `a/n`, or a comma
//! separated list of those. Months and weekdays also take three-letter names.
//! The `@yearly`, `@monthly`, `@weekly`, `@daily` and `@hourly` descriptors
//! expand to their usual expressions.
//!
//! When both day fields are restricted, a day matching either one fires.
//! Schedules follow the local wall clock.

use super::SchedulerError;
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike};

/// Years searched for the next fire time before giving up
const SEARCH_YEARS: i32 = 30;

struct Field {
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const MINUTE: Field = Field { min: 0, max: 59, names: &[] };
const HOUR: Field = Field { min: 0, max: 23, names: &[] };
const DAY_OF_MONTH: Field = Field { min: 1, max: 31, names: &[] };
const MONTH: Field = Field {
    min: 1,
    max: 12,
    names: &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ],
};
const DAY_OF_WEEK: Field = Field {
    min: 0,
    max: 6,
    names: &["sun", "mon", "tue", "wed", "thu", "fri", "sat"],
};

impl Field {
    fn value(&self, text: &str) -> Option<u32> {
        let value = match text.parse::<u32>() {
            Ok(value) => value,
            Err(_) => {
                let index = self
                    .names
                    .iter()
                    .position(|name| name.eq_ignore_ascii_case(text))?;
                self.min + index as u32
            }
        };
        (self.min..=self.max).contains(&value).then_some(value)
    }

    /// Bit set of the values selected by `text`
    fn parse(&self, text: &str) -> Option<u64> {
        let mut bits = 0u64;
        for part in text.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step.parse::<u32>().ok().filter(|s| *s > 0)?)),
                None => (part, None),
            };
            let (start, end) = if range == "*" || range == "?" {
                (self.min, self.max)
            } else if let Some((low, high)) = range.split_once('-') {
                (self.value(low)?, self.value(high)?)
            } else {
                let value = self.value(range)?;
                // `a/n` runs from `a` to the end of the field
                (value, if step.is_some() { self.max } else { value })
            };
            if start > end {
                return None;
            }
            for value in (start..=end).step_by(step.unwrap_or(1) as usize) {
                bits |= 1 << value;
            }
        }
        Some(bits)
    }
}

fn is_any(text: &str) -> bool {
    text == "*" || text == "?"
}

fn has(bits: u64, value: u32) -> bool {
    bits & (1 << value) != 0
}

/// A parsed cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    any_day_of_month: bool,
    any_day_of_week: bool,
}

impl CronSchedule {
    pub fn parse(spec: &str) -> Result<Self, SchedulerError> {
        let unsupported = || SchedulerError::UnsupportedSpec(spec.to_string());

        let expression = match spec.trim() {
            "@yearly" | "@annually" => "0 0 1 1 *",
            "@monthly" => "0 0 1 * *",
            "@weekly" => "0 0 * * 0",
            "@daily" | "@midnight" => "0 0 * * *",
            "@hourly" => "0 * * * *",
            other => other,
        };
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let &[minute, hour, day_of_month, month, day_of_week] = fields.as_slice() else {
            return Err(unsupported());
        };
        let parse = |field: &Field, text: &str| field.parse(text).ok_or_else(unsupported);

        Ok(Self {
            minutes: parse(&MINUTE, minute)?,
            hours: parse(&HOUR, hour)?,
            days_of_month: parse(&DAY_OF_MONTH, day_of_month)?,
            months: parse(&MONTH, month)?,
            days_of_week: parse(&DAY_OF_WEEK, day_of_week)?,
            any_day_of_month: is_any(day_of_month),
            any_day_of_week: is_any(day_of_week),
        })
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let by_month = has(self.days_of_month, date.day());
        let by_week = has(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.any_day_of_month || self.any_day_of_week {
            by_month && by_week
        } else {
            by_month || by_week
        }
    }

    /// First matching minute strictly after `after`, or `None` if the
    /// expression never fires (e.g. February 30th)
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut at = after.with_second(0)?.with_nanosecond(0)? + TimeDelta::minutes(1);
        let last_year = at.year() + SEARCH_YEARS;

        while at.year() <= last_year {
            if !has(self.months, at.month()) {
                let (year, month) = match at.month() {
                    12 => (at.year() + 1, 1),
                    month => (at.year(), month + 1),
                };
                at = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
            } else if !self.day_matches(at.date()) {
                at = (at.date() + TimeDelta::days(1)).and_hms_opt(0, 0, 0)?;
            } else if !has(self.hours, at.hour()) {
                at = at.with_minute(0)? + TimeDelta::hours(1);
            } else if !has(self.minutes, at.minute()) {
                at += TimeDelta::minutes(1);
            } else {
                return Some(at);
            }
        }
        None
    }

    /// Next fire time on the local clock, skipping times a DST gap removes
    pub fn next_fire(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let mut after = now.naive_local();
        loop {
            let candidate = self.next_after(after)?;
            match Local.from_local_datetime(&candidate).earliest() {
                Some(at) if at > now => return Some(at),
                _ => after = candidate,
            }
        }
    }
}
