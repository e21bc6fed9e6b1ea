//! Schedule-change notifier.
//!
//! Per subscriber and per day (today, tomorrow) the fingerprint of every
//! subscribed group is compared with the last delivered one. Changed groups
//! go into a single message; fingerprints are committed only after the
//! message was delivered, so a failed delivery is retried with the same diff
//! on the next cycle and an unchanged schedule produces no message and no
//! write at all.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use lightwatch_core::clock::Clock;
use lightwatch_core::error::{Result, WatchError};
use lightwatch_core::schedule::{DaySchedule, GroupNumber};
use lightwatch_core::subscription::{NotificationState, Subscription};
use lightwatch_core::traits::{Messenger, Store};
use tokio::sync::Mutex;

use crate::diff::{self, Slot};
use crate::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayKind {
    Today,
    Tomorrow,
}

/// One changed group: its new fingerprint and what is left of its day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupChange {
    pub group: GroupNumber,
    pub fingerprint: String,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayDiff {
    pub date: NaiveDate,
    pub kind: DayKind,
    pub groups: Vec<GroupChange>,
}

/// Everything one subscriber has not been told yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleDiff {
    pub days: Vec<DayDiff>,
}

impl ScheduleDiff {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Outcome for one subscriber in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Unchanged,
    Sent,
    Purged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub subscribers: usize,
    pub sent: usize,
    pub unchanged: usize,
    pub purged: usize,
    pub failed: usize,
}

pub struct ChangeNotifier {
    store: Arc<dyn Store>,
    messenger: Arc<dyn Messenger>,
    clock: Arc<dyn Clock>,
    /// Serializes cycles: an overlapping tick waits for the running one.
    lock: Mutex<()>,
}

impl ChangeNotifier {
    pub fn new(store: Arc<dyn Store>, messenger: Arc<dyn Messenger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            messenger,
            clock,
            lock: Mutex::new(()),
        }
    }

    /// Evaluate every subscriber once.
    ///
    /// Store errors while loading the schedules or the subscriber list abort
    /// the cycle; per-subscriber failures are logged and counted.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let _guard = self.lock.lock().await;
        let now = self.clock.now();
        let mut report = CycleReport::default();

        let days = self.load_days(now.date())?;
        if days.is_empty() {
            tracing::debug!("No schedules available yet, skipping change notifications");
            return Ok(report);
        }

        let subscriptions = self.store.get_all_subscriptions()?;
        report.subscribers = subscriptions.len();

        for subscription in &subscriptions {
            match self.notify_subscriber(subscription, &days, now).await {
                Ok(Delivery::Unchanged) => report.unchanged += 1,
                Ok(Delivery::Sent) => report.sent += 1,
                Ok(Delivery::Purged) => report.purged += 1,
                // Nothing was committed for this subscriber; the next cycle retries.
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        subscriber = subscription.subscriber_id,
                        "⚠️ Schedule-change notification failed: {e}"
                    );
                }
            }
        }

        if report.sent + report.purged + report.failed > 0 {
            tracing::info!(
                "📨 Schedule changes: {} sent, {} unchanged, {} purged, {} failed",
                report.sent,
                report.unchanged,
                report.purged,
                report.failed
            );
        }
        Ok(report)
    }

    fn load_days(&self, today: NaiveDate) -> Result<Vec<(DayKind, DaySchedule)>> {
        let mut days = Vec::with_capacity(2);
        let tomorrow = today.succ_opt();
        for (kind, date) in [(DayKind::Today, Some(today)), (DayKind::Tomorrow, tomorrow)] {
            let Some(date) = date else { continue };
            match self.store.get_day_schedule(date)? {
                Some(schedule) => days.push((kind, schedule)),
                None => tracing::debug!(%date, "Schedule not available yet"),
            }
        }
        Ok(days)
    }

    async fn notify_subscriber(
        &self,
        subscription: &Subscription,
        days: &[(DayKind, DaySchedule)],
        now: NaiveDateTime,
    ) -> Result<Delivery> {
        let (diff, previous) = self.compute_diff(subscription, days, now)?;
        if diff.is_empty() {
            return Ok(Delivery::Unchanged);
        }

        let text = render::schedule_change(&diff);
        match self
            .messenger
            .send_message(subscription.subscriber_id, &text)
            .await
        {
            Ok(()) => {
                self.commit(subscription, &diff, previous, now)?;
                Ok(Delivery::Sent)
            }
            Err(WatchError::RecipientBlocked) => {
                tracing::info!(
                    subscriber = subscription.subscriber_id,
                    "🚫 Recipient blocked delivery, purging subscriber"
                );
                self.store.purge_subscriber(subscription.subscriber_id)?;
                Ok(Delivery::Purged)
            }
            Err(e) => Err(e),
        }
    }

    /// Changed groups per day, plus the stored state of each included day.
    pub fn compute_diff(
        &self,
        subscription: &Subscription,
        days: &[(DayKind, DaySchedule)],
        now: NaiveDateTime,
    ) -> Result<(ScheduleDiff, Vec<Option<NotificationState>>)> {
        let mut diff = ScheduleDiff::default();
        let mut previous = Vec::new();

        for (kind, schedule) in days {
            let state = self
                .store
                .get_notification_state(subscription.subscriber_id, schedule.date)?;
            let reference = match kind {
                DayKind::Today => now.format("%H:%M").to_string(),
                DayKind::Tomorrow => "00:00".to_string(),
            };

            let mut groups = Vec::new();
            for group_number in &subscription.groups {
                // Stale subscriptions may name groups the provider no longer publishes.
                let Some(group) = schedule.groups.get(group_number) else {
                    continue;
                };
                let fingerprint = diff::fingerprint(group);
                let delivered = state.as_ref().and_then(|s| s.hashes.get(group_number));
                if delivered == Some(&fingerprint) {
                    continue;
                }
                groups.push(GroupChange {
                    group: *group_number,
                    fingerprint,
                    slots: diff::remaining(&schedule.periods, group, &reference)?,
                });
            }

            if !groups.is_empty() {
                diff.days.push(DayDiff {
                    date: schedule.date,
                    kind: *kind,
                    groups,
                });
                previous.push(state);
            }
        }
        Ok((diff, previous))
    }

    fn commit(
        &self,
        subscription: &Subscription,
        diff: &ScheduleDiff,
        previous: Vec<Option<NotificationState>>,
        now: NaiveDateTime,
    ) -> Result<()> {
        for (day, state) in diff.days.iter().zip(previous) {
            let mut state = state.unwrap_or_else(|| {
                NotificationState::new(subscription.subscriber_id, day.date, now)
            });
            state.sent_at = now;
            for change in &day.groups {
                state.hashes.insert(change.group, change.fingerprint.clone());
            }
            self.store.put_notification_state(&state)?;
        }
        Ok(())
    }
}
