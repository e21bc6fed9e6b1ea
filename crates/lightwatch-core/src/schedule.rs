//! Day schedule model — fixed-size periods and per-group status sequences.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

/// Outage group number as published by the provider.
pub type GroupNumber = u32;

/// "24:00" marks the end of the day.
pub const END_OF_DAY: &str = "24:00";
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Supply status for one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    On,
    Off,
    Maybe,
}

impl Status {
    /// Ordering used when several events share a start time (lower first).
    pub fn priority(&self) -> u8 {
        match self {
            Status::Off => 0,
            Status::Maybe => 1,
            Status::On => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::On => "on",
            Status::Off => "off",
            Status::Maybe => "maybe",
        }
    }

    pub fn all() -> [Status; 3] {
        [Status::Off, Status::Maybe, Status::On]
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(Status::On),
            "off" => Ok(Status::Off),
            "maybe" => Ok(Status::Maybe),
            other => Err(WatchError::InvalidSchedule(format!("unknown status '{other}'"))),
        }
    }
}

/// Half-open `[from, to)` interval of "HH:MM" strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub from: String,
    pub to: String,
}

impl Period {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn start_minute(&self) -> Result<u32> {
        parse_hhmm(&self.from)
    }

    pub fn end_minute(&self) -> Result<u32> {
        parse_hhmm(&self.to)
    }

    /// Whether `minute` (minutes since midnight) falls inside the period.
    pub fn contains(&self, minute: u32) -> Result<bool> {
        Ok(self.start_minute()? <= minute && minute < self.end_minute()?)
    }
}

/// Parse "HH:MM" into minutes since midnight. "24:00" is accepted.
pub fn parse_hhmm(s: &str) -> Result<u32> {
    let invalid = || WatchError::InvalidSchedule(format!("bad time '{s}', expected HH:MM"));
    let (h, m) = s.split_once(':').ok_or_else(invalid)?;
    if h.len() != 2 || m.len() != 2 {
        return Err(invalid());
    }
    let h: u32 = h.parse().map_err(|_| invalid())?;
    let m: u32 = m.parse().map_err(|_| invalid())?;
    if m > 59 || h > 24 || (h == 24 && m != 0) {
        return Err(invalid());
    }
    Ok(h * 60 + m)
}

/// Format minutes since midnight as "HH:MM".
pub fn format_hhmm(minute: u32) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Status sequence of one group, one entry per period index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSchedule {
    pub group_number: GroupNumber,
    pub statuses: Vec<Status>,
}

impl GroupSchedule {
    pub fn new(group_number: GroupNumber, statuses: Vec<Status>) -> Self {
        Self {
            group_number,
            statuses,
        }
    }
}

/// One day's published schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub periods: Vec<Period>,
    pub groups: BTreeMap<GroupNumber, GroupSchedule>,
}

impl DaySchedule {
    pub fn new(date: NaiveDate, periods: Vec<Period>) -> Self {
        Self {
            date,
            periods,
            groups: BTreeMap::new(),
        }
    }

    /// Builder-style group insertion.
    pub fn with_group(mut self, group_number: GroupNumber, statuses: Vec<Status>) -> Self {
        self.groups
            .insert(group_number, GroupSchedule::new(group_number, statuses));
        self
    }

    /// Storage key for the date ("YYYY-MM-DD").
    pub fn date_key(&self) -> String {
        date_key(self.date)
    }

    /// Check the structural invariants: non-empty, well-formed contiguous
    /// periods and one status per period for every group.
    pub fn validate(&self) -> Result<()> {
        if self.periods.is_empty() {
            return Err(WatchError::InvalidSchedule(format!(
                "{}: no periods",
                self.date_key()
            )));
        }

        let mut previous_end: Option<u32> = None;
        for period in &self.periods {
            let start = period.start_minute()?;
            let end = period.end_minute()?;
            if start >= end {
                return Err(WatchError::InvalidSchedule(format!(
                    "{}: empty period {}-{}",
                    self.date_key(),
                    period.from,
                    period.to
                )));
            }
            if let Some(prev) = previous_end
                && prev != start
            {
                return Err(WatchError::InvalidSchedule(format!(
                    "{}: periods are not contiguous at {}",
                    self.date_key(),
                    period.from
                )));
            }
            previous_end = Some(end);
        }

        for (number, group) in &self.groups {
            if *number != group.group_number {
                return Err(WatchError::InvalidSchedule(format!(
                    "{}: group key {number} holds group {}",
                    self.date_key(),
                    group.group_number
                )));
            }
            if group.statuses.len() != self.periods.len() {
                return Err(WatchError::InvalidSchedule(format!(
                    "{}: group {number} has {} statuses for {} periods",
                    self.date_key(),
                    group.statuses.len(),
                    self.periods.len()
                )));
            }
        }
        Ok(())
    }

    /// Index of the period containing `minute`, if any.
    pub fn period_index_at(&self, minute: u32) -> Option<usize> {
        self.periods
            .iter()
            .position(|p| p.contains(minute).unwrap_or(false))
    }
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Evenly sized periods covering the whole day, e.g. 48 half-hour slots.
pub fn uniform_periods(slot_minutes: u32) -> Vec<Period> {
    let step = slot_minutes.max(1) as usize;
    (0..MINUTES_PER_DAY)
        .step_by(step)
        .map(|start| {
            let end = (start + slot_minutes.max(1)).min(MINUTES_PER_DAY);
            Period::new(&format_hhmm(start), &format_hhmm(end))
        })
        .collect()
}
