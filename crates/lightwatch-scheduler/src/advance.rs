//! Advance-notice notifier — warns subscribers shortly before a transition.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDateTime;
use lightwatch_core::clock::Clock;
use lightwatch_core::error::{Result, WatchError};
use lightwatch_core::schedule::{GroupNumber, Status};
use lightwatch_core::subscription::{AlertKey, Subscription};
use lightwatch_core::traits::{Messenger, Store};
use tokio::sync::Mutex;

use crate::alerts::{ActiveHours, Alert, AlertWindow};
use crate::changes::{CycleReport, Delivery};
use crate::render;

/// One rendered event: every group sharing a start time and status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeLine {
    pub start_time: String,
    pub status: Status,
    pub groups: Vec<GroupNumber>,
}

pub struct AdvanceNotifier {
    store: Arc<dyn Store>,
    messenger: Arc<dyn Messenger>,
    clock: Arc<dyn Clock>,
    window: AlertWindow,
    active_hours: ActiveHours,
    lock: Mutex<()>,
}

impl AdvanceNotifier {
    pub fn new(
        store: Arc<dyn Store>,
        messenger: Arc<dyn Messenger>,
        clock: Arc<dyn Clock>,
        window: AlertWindow,
        active_hours: ActiveHours,
    ) -> Self {
        Self {
            store,
            messenger,
            clock,
            window,
            active_hours,
            lock: Mutex::new(()),
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let _guard = self.lock.lock().await;
        let now = self.clock.now();
        let mut report = CycleReport::default();

        if !self.active_hours.contains(now.time()) {
            tracing::debug!("Outside active hours, no advance notices");
            return Ok(report);
        }

        let Some(schedule) = self.store.get_day_schedule(now.date())? else {
            tracing::debug!(date = %now.date(), "No schedule for today, no advance notices");
            return Ok(report);
        };

        let alerts = match self.window.evaluate(&schedule, now) {
            Ok(alerts) => alerts,
            Err(e) => {
                tracing::debug!("{e}, nothing to alert");
                return Ok(report);
            }
        };
        if alerts.is_empty() {
            return Ok(report);
        }

        let subscriptions = self.store.get_all_subscriptions()?;
        report.subscribers = subscriptions.len();

        for subscription in &subscriptions {
            match self.notify_subscriber(subscription, &alerts, now).await {
                Ok(Delivery::Unchanged) => report.unchanged += 1,
                Ok(Delivery::Sent) => report.sent += 1,
                Ok(Delivery::Purged) => report.purged += 1,
                // Nothing was committed for this subscriber; the next cycle retries.
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        subscriber = subscription.subscriber_id,
                        "⚠️ Advance notice failed: {e}"
                    );
                }
            }
        }

        if report.sent + report.purged + report.failed > 0 {
            tracing::info!(
                "⏰ Advance notices: {} sent, {} purged, {} failed",
                report.sent,
                report.purged,
                report.failed
            );
        }
        Ok(report)
    }

    async fn notify_subscriber(
        &self,
        subscription: &Subscription,
        alerts: &[Alert],
        now: NaiveDateTime,
    ) -> Result<Delivery> {
        let pending = self.pending_alerts(subscription, alerts)?;
        if pending.is_empty() {
            return Ok(Delivery::Unchanged);
        }

        let lines = notice_lines(&pending);
        let text = render::advance_notice(&lines, self.window.lookahead_minutes);
        match self
            .messenger
            .send_message(subscription.subscriber_id, &text)
            .await
        {
            Ok(()) => {
                self.record(&pending, now);
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

    /// Alerts for subscribed groups with the status enabled, minus already sent ones.
    pub fn pending_alerts(
        &self,
        subscription: &Subscription,
        alerts: &[Alert],
    ) -> Result<Vec<AlertKey>> {
        let mut pending = Vec::new();
        for alert in alerts {
            if !subscription.subscribed_to(alert.group)
                || !subscription.settings.enabled_for(alert.status)
            {
                continue;
            }
            let key = AlertKey {
                subscriber_id: subscription.subscriber_id,
                date: alert.date,
                start_time: alert.start_time.clone(),
                status: alert.status,
                group: alert.group,
            };
            if self.store.get_alert_record(&key)?.is_none() {
                pending.push(key);
            }
        }
        Ok(pending)
    }

    /// Best effort: a failed write only risks one duplicate notice later.
    fn record(&self, keys: &[AlertKey], now: NaiveDateTime) {
        for key in keys {
            if let Err(e) = self.store.put_alert_record(key, now) {
                tracing::error!(key = %key, "Failed to record sent alert: {e}");
            }
        }
    }
}

/// Merge alerts sharing (start time, status) into lines ordered by time,
/// then OFF, MAYBE, ON.
pub fn notice_lines(keys: &[AlertKey]) -> Vec<NoticeLine> {
    let mut events: BTreeMap<(String, u8), (Status, BTreeSet<GroupNumber>)> = BTreeMap::new();
    for key in keys {
        events
            .entry((key.start_time.clone(), key.status.priority()))
            .or_insert_with(|| (key.status, BTreeSet::new()))
            .1
            .insert(key.group);
    }
    events
        .into_iter()
        .map(|((start_time, _), (status, groups))| NoticeLine {
            start_time,
            status,
            groups: groups.into_iter().collect(),
        })
        .collect()
}
