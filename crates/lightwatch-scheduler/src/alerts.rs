//! Alert window engine — finds status transitions that start shortly.
//!
//! Evaluation runs every minute or so while schedule periods are 30 or 60
//! minutes long, so a period qualifies when its start lies within a
//! tolerance band around `now + lookahead` rather than exactly on it.
//! The same transition is usually reported by several consecutive
//! evaluations; the advance-notice notifier dedups them.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use lightwatch_core::config::AlertsConfig;
use lightwatch_core::error::Result;
use lightwatch_core::schedule::{DaySchedule, GroupNumber, Status, parse_hhmm};

/// An upcoming "outage start": the first period of a same-status run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub group: GroupNumber,
    pub date: NaiveDate,
    pub start_time: String,
    pub status: Status,
}

/// No period of the day contains the lookahead instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoMatchingPeriod;

impl std::fmt::Display for NoMatchingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("no period matches the lookahead instant")
    }
}

/// Lookahead and tolerance, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertWindow {
    pub lookahead_minutes: u32,
    pub tolerance_minutes: u32,
}

impl AlertWindow {
    pub fn new(lookahead_minutes: u32, tolerance_minutes: u32) -> Self {
        Self {
            lookahead_minutes,
            tolerance_minutes,
        }
    }

    pub fn from_config(config: &AlertsConfig) -> Self {
        Self::new(config.lookahead_minutes, config.tolerance_minutes)
    }

    /// Transitions starting around `now + lookahead` in `schedule`.
    ///
    /// `Ok(vec![])` means a period matched but its start is outside the
    /// tolerance band, or nothing changes status there.
    pub fn evaluate(
        &self,
        schedule: &DaySchedule,
        now: NaiveDateTime,
    ) -> std::result::Result<Vec<Alert>, NoMatchingPeriod> {
        let lookahead_at = now + Duration::minutes(i64::from(self.lookahead_minutes));
        if lookahead_at.date() != schedule.date {
            return Err(NoMatchingPeriod);
        }

        let target = minute_of_day(lookahead_at.time());
        let index = schedule.period_index_at(target).ok_or(NoMatchingPeriod)?;
        let start = schedule.periods[index]
            .start_minute()
            .map_err(|_| NoMatchingPeriod)?;

        if !within_tolerance(start, target, self.tolerance_minutes) {
            return Ok(Vec::new());
        }
        Ok(transitions_at(schedule, index))
    }
}

/// Whether a period starting at `start` is close enough to the ideal alert target.
pub fn within_tolerance(start: u32, target: u32, tolerance: u32) -> bool {
    start.abs_diff(target) <= tolerance
}

/// Every group whose status at `index` differs from the previous period.
/// Index 0 is always a transition.
pub fn transitions_at(schedule: &DaySchedule, index: usize) -> Vec<Alert> {
    let Some(period) = schedule.periods.get(index) else {
        return Vec::new();
    };

    schedule
        .groups
        .values()
        .filter_map(|group| {
            let status = *group.statuses.get(index)?;
            let starts_run = index == 0 || group.statuses.get(index - 1) != Some(&status);
            starts_run.then(|| Alert {
                group: group.group_number,
                date: schedule.date,
                start_time: period.from.clone(),
                status,
            })
        })
        .collect()
}

/// Daily window `[from, until)` in which subscribers may be alerted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveHours {
    from: u32,
    until: u32,
}

impl ActiveHours {
    pub fn new(from: &str, until: &str) -> Result<Self> {
        Ok(Self {
            from: parse_hhmm(from)?,
            until: parse_hhmm(until)?,
        })
    }

    pub fn from_config(config: &AlertsConfig) -> Result<Self> {
        Self::new(&config.active_from, &config.active_until)
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        let minute = minute_of_day(time);
        self.from <= minute && minute < self.until
    }
}

pub(crate) fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}
