//! Shared fixtures for unit tests.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use lightwatch_core::error::{Result, WatchError};
use lightwatch_core::schedule::{DaySchedule, GroupNumber, Status, uniform_periods};
use lightwatch_core::subscription::SubscriberId;
use lightwatch_core::traits::Messenger;

pub(crate) fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
}

pub(crate) fn at(hour: u32, minute: u32) -> NaiveDateTime {
    date().and_hms_opt(hour, minute, 0).unwrap()
}

/// 24 hourly periods; each listed group is OFF for the given hours and ON otherwise.
pub(crate) fn hourly_schedule(day: NaiveDate, outages: &[(GroupNumber, Range<usize>)]) -> DaySchedule {
    let mut schedule = DaySchedule::new(day, uniform_periods(60));
    for (group, hours) in outages {
        let mut statuses = vec![Status::On; 24];
        for hour in hours.clone() {
            statuses[hour] = Status::Off;
        }
        schedule = schedule.with_group(*group, statuses);
    }
    schedule
}

#[derive(Default)]
struct Outbox {
    sent: Vec<(SubscriberId, String)>,
    attempts: HashMap<SubscriberId, usize>,
    blocked: HashSet<SubscriberId>,
    failures_left: usize,
    timing_out: bool,
    delay: Duration,
}

/// Messenger that records deliveries and can simulate failures.
#[derive(Default)]
pub(crate) struct RecordingMessenger {
    outbox: Mutex<Outbox>,
}

impl RecordingMessenger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn block(&self, recipient: SubscriberId) {
        self.outbox.lock().unwrap().blocked.insert(recipient);
    }

    pub(crate) fn fail_next(&self, count: usize) {
        self.outbox.lock().unwrap().failures_left = count;
    }

    /// Every send fails with `DeadlineExceeded`.
    pub(crate) fn time_out(&self) {
        self.outbox.lock().unwrap().timing_out = true;
    }

    /// Every send takes `delay` before it completes.
    pub(crate) fn slow_down(&self, delay: Duration) {
        self.outbox.lock().unwrap().delay = delay;
    }

    pub(crate) fn total_attempts(&self) -> usize {
        self.outbox.lock().unwrap().attempts.values().sum()
    }

    pub(crate) fn sent_to(&self, recipient: SubscriberId) -> Vec<String> {
        self.outbox
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(id, _)| *id == recipient)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub(crate) fn total_sent(&self) -> usize {
        self.outbox.lock().unwrap().sent.len()
    }

    pub(crate) fn attempts_for(&self, recipient: SubscriberId) -> usize {
        self.outbox
            .lock()
            .unwrap()
            .attempts
            .get(&recipient)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_message(&self, recipient: SubscriberId, text: &str) -> Result<()> {
        let delay = self.outbox.lock().unwrap().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut outbox = self.outbox.lock().unwrap();
        *outbox.attempts.entry(recipient).or_default() += 1;
        if outbox.timing_out {
            return Err(WatchError::DeadlineExceeded);
        }
        if outbox.blocked.contains(&recipient) {
            return Err(WatchError::RecipientBlocked);
        }
        if outbox.failures_left > 0 {
            outbox.failures_left -= 1;
            return Err(WatchError::Messaging("simulated outage".into()));
        }
        outbox.sent.push((recipient, text.to_string()));
        Ok(())
    }
}
