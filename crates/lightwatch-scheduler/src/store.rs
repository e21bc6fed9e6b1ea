//! In-memory store — used by tests and by dry runs.
//! Same semantics as the SQLite store, nothing survives a restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveDateTime};
use lightwatch_core::error::{Result, WatchError};
use lightwatch_core::schedule::DaySchedule;
use lightwatch_core::subscription::{AlertKey, NotificationState, SubscriberId, Subscription};
use lightwatch_core::traits::Store;

#[derive(Default)]
struct Inner {
    schedules: BTreeMap<NaiveDate, DaySchedule>,
    states: HashMap<(SubscriberId, NaiveDate), NotificationState>,
    alerts: BTreeMap<String, (AlertKey, NaiveDateTime)>,
    subscriptions: BTreeMap<SubscriberId, Subscription>,
    state_writes: usize,
    #[cfg(test)]
    failing_alert_writes: usize,
}

/// Map-backed store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| WatchError::Store(format!("Lock: {e}")))
    }

    /// Copy every subscription of `source`; nothing is written back to it.
    pub fn copy_subscriptions_from(&self, source: &dyn Store) -> Result<usize> {
        let subscriptions = source.get_all_subscriptions()?;
        let mut inner = self.lock()?;
        for subscription in &subscriptions {
            inner
                .subscriptions
                .insert(subscription.subscriber_id, subscription.clone());
        }
        Ok(subscriptions.len())
    }

    /// Number of notification-state writes so far.
    pub fn notification_state_writes(&self) -> usize {
        self.lock().map(|inner| inner.state_writes).unwrap_or(0)
    }

    pub fn alert_record_count(&self) -> usize {
        self.lock().map(|inner| inner.alerts.len()).unwrap_or(0)
    }

    /// Make the next `count` alert-record writes fail.
    #[cfg(test)]
    pub(crate) fn fail_alert_writes(&self, count: usize) {
        if let Ok(mut inner) = self.lock() {
            inner.failing_alert_writes = count;
        }
    }
}

impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get_day_schedule(&self, date: NaiveDate) -> Result<Option<DaySchedule>> {
        Ok(self.lock()?.schedules.get(&date).cloned())
    }

    fn put_day_schedule(&self, schedule: &DaySchedule) -> Result<()> {
        self.lock()?
            .schedules
            .insert(schedule.date, schedule.clone());
        Ok(())
    }

    fn get_notification_state(
        &self,
        subscriber_id: SubscriberId,
        date: NaiveDate,
    ) -> Result<Option<NotificationState>> {
        Ok(self.lock()?.states.get(&(subscriber_id, date)).cloned())
    }

    fn put_notification_state(&self, state: &NotificationState) -> Result<()> {
        let mut inner = self.lock()?;
        inner
            .states
            .insert((state.subscriber_id, state.date), state.clone());
        inner.state_writes += 1;
        Ok(())
    }

    fn get_alert_record(&self, key: &AlertKey) -> Result<Option<NaiveDateTime>> {
        Ok(self
            .lock()?
            .alerts
            .get(&key.storage_key())
            .map(|(_, sent_at)| *sent_at))
    }

    fn put_alert_record(&self, key: &AlertKey, sent_at: NaiveDateTime) -> Result<()> {
        let mut inner = self.lock()?;
        #[cfg(test)]
        if inner.failing_alert_writes > 0 {
            inner.failing_alert_writes -= 1;
            return Err(WatchError::Store("injected alert write failure".into()));
        }
        // Records are write-once.
        inner
            .alerts
            .entry(key.storage_key())
            .or_insert_with(|| (key.clone(), sent_at));
        Ok(())
    }

    fn get_all_subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.lock()?.subscriptions.values().cloned().collect())
    }

    fn get_subscription(&self, subscriber_id: SubscriberId) -> Result<Option<Subscription>> {
        Ok(self.lock()?.subscriptions.get(&subscriber_id).cloned())
    }

    fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.lock()?
            .subscriptions
            .insert(subscription.subscriber_id, subscription.clone());
        Ok(())
    }

    fn purge_subscriber(&self, subscriber_id: SubscriberId) -> Result<()> {
        let mut inner = self.lock()?;
        inner.subscriptions.remove(&subscriber_id);
        inner.states.retain(|(id, _), _| *id != subscriber_id);
        inner
            .alerts
            .retain(|_, (key, _)| key.subscriber_id != subscriber_id);
        Ok(())
    }

    fn purge_notification_states_before(&self, date: NaiveDate) -> Result<usize> {
        let mut inner = self.lock()?;
        let before = inner.states.len();
        inner.states.retain(|(_, day), _| *day >= date);
        Ok(before - inner.states.len())
    }

    fn purge_alert_records_before(&self, date: NaiveDate) -> Result<usize> {
        let mut inner = self.lock()?;
        let before = inner.alerts.len();
        inner.alerts.retain(|_, (key, _)| key.date >= date);
        Ok(before - inner.alerts.len())
    }

    fn purge_day_schedules_before(&self, date: NaiveDate) -> Result<usize> {
        let mut inner = self.lock()?;
        let before = inner.schedules.len();
        inner.schedules.retain(|day, _| *day >= date);
        Ok(before - inner.schedules.len())
    }
}
