//! Key-value store contract used by the notifiers and jobs.
//!
//! Implementations must be safe for concurrent use from several jobs:
//! every method is a self-contained transaction.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::Result;
use crate::schedule::DaySchedule;
use crate::subscription::{AlertKey, NotificationState, SubscriberId, Subscription};

pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    // ── Schedules ─────────────────────────────────────────
    fn get_day_schedule(&self, date: NaiveDate) -> Result<Option<DaySchedule>>;
    fn put_day_schedule(&self, schedule: &DaySchedule) -> Result<()>;

    // ── Schedule-change state ─────────────────────────────
    fn get_notification_state(
        &self,
        subscriber_id: SubscriberId,
        date: NaiveDate,
    ) -> Result<Option<NotificationState>>;
    fn put_notification_state(&self, state: &NotificationState) -> Result<()>;

    // ── Advance-notice dedup ──────────────────────────────
    fn get_alert_record(&self, key: &AlertKey) -> Result<Option<NaiveDateTime>>;
    fn put_alert_record(&self, key: &AlertKey, sent_at: NaiveDateTime) -> Result<()>;

    // ── Subscriptions ─────────────────────────────────────
    fn get_all_subscriptions(&self) -> Result<Vec<Subscription>>;
    fn get_subscription(&self, subscriber_id: SubscriberId) -> Result<Option<Subscription>>;
    fn put_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Remove the subscription and every notification/alert record of the subscriber.
    fn purge_subscriber(&self, subscriber_id: SubscriberId) -> Result<()>;

    // ── Retention ─────────────────────────────────────────
    fn purge_notification_states_before(&self, date: NaiveDate) -> Result<usize>;
    fn purge_alert_records_before(&self, date: NaiveDate) -> Result<usize>;
    fn purge_day_schedules_before(&self, date: NaiveDate) -> Result<usize>;
}
