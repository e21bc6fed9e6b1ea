//! The periodic jobs: schedule refresh, both notifiers, retention cleanup.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use lightwatch_core::clock::Clock;
use lightwatch_core::config::RetentionConfig;
use lightwatch_core::error::Result;
use lightwatch_core::schedule::DaySchedule;
use lightwatch_core::traits::{ScheduleProvider, Store};

use crate::advance::AdvanceNotifier;
use crate::changes::ChangeNotifier;

/// A unit of periodic work.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

/// Pulls the published schedules into the store.
pub struct RefreshJob {
    provider: Arc<dyn ScheduleProvider>,
    store: Arc<dyn Store>,
}

impl RefreshJob {
    pub fn new(provider: Arc<dyn ScheduleProvider>, store: Arc<dyn Store>) -> Self {
        Self { provider, store }
    }

    /// Returns whether the stored copy changed.
    fn save(&self, schedule: &DaySchedule) -> Result<bool> {
        schedule.validate()?;
        if self.store.get_day_schedule(schedule.date)?.as_ref() == Some(schedule) {
            tracing::debug!(date = %schedule.date, "Schedule unchanged");
            return Ok(false);
        }
        self.store.put_day_schedule(schedule)?;
        tracing::info!(
            date = %schedule.date,
            provider = self.provider.name(),
            "📥 Schedule updated ({} groups)",
            schedule.groups.len()
        );
        Ok(true)
    }
}

#[async_trait]
impl Job for RefreshJob {
    fn name(&self) -> &str {
        "refresh"
    }

    async fn run(&self) -> Result<()> {
        let (today, has_next_day) = match self.provider.fetch_schedule().await {
            Ok(fetched) => fetched,
            Err(e) if e.is_soft_provider_state() => {
                tracing::info!("Provider has no plannable schedule: {e}");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.save(&today)?;

        if !has_next_day {
            return Ok(());
        }
        match self.provider.fetch_next_day().await {
            Ok(next) => {
                self.save(&next)?;
            }
            Err(e) if e.is_soft_provider_state() => {
                tracing::info!("Next-day schedule not available: {e}");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

/// Purges records older than the retention windows.
pub struct CleanupJob {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    retention: RetentionConfig,
}

impl CleanupJob {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, retention: RetentionConfig) -> Self {
        Self {
            store,
            clock,
            retention,
        }
    }

    fn cutoff(today: NaiveDate, days: u32) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN)
    }
}

#[async_trait]
impl Job for CleanupJob {
    fn name(&self) -> &str {
        "cleanup"
    }

    async fn run(&self) -> Result<()> {
        let today = self.clock.now().date();
        let states = self
            .store
            .purge_notification_states_before(Self::cutoff(today, self.retention.notification_days))?;
        let alerts = self
            .store
            .purge_alert_records_before(Self::cutoff(today, self.retention.alert_days))?;
        let schedules = self
            .store
            .purge_day_schedules_before(Self::cutoff(today, self.retention.schedule_days))?;

        if states + alerts + schedules > 0 {
            tracing::info!(states, alerts, schedules, "🧹 Old records purged");
        }
        Ok(())
    }
}

#[async_trait]
impl Job for ChangeNotifier {
    fn name(&self) -> &str {
        "schedule-changes"
    }

    async fn run(&self) -> Result<()> {
        self.run_cycle().await.map(|_| ())
    }
}

#[async_trait]
impl Job for AdvanceNotifier {
    fn name(&self) -> &str {
        "advance-notices"
    }

    async fn run(&self) -> Result<()> {
        self.run_cycle().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{at, date, hourly_schedule};
    use lightwatch_core::clock::FixedClock;
    use lightwatch_core::error::WatchError;
    use lightwatch_core::subscription::{AlertKey, NotificationState};
    use lightwatch_core::schedule::Status;
    use std::sync::Mutex;

    /// Provider returning canned answers.
    struct CannedProvider {
        today: Mutex<Option<Result<(DaySchedule, bool)>>>,
        next: Mutex<Option<Result<DaySchedule>>>,
    }

    impl CannedProvider {
        fn new(today: Result<(DaySchedule, bool)>, next: Result<DaySchedule>) -> Arc<Self> {
            Arc::new(Self {
                today: Mutex::new(Some(today)),
                next: Mutex::new(Some(next)),
            })
        }
    }

    #[async_trait]
    impl ScheduleProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn fetch_schedule(&self) -> Result<(DaySchedule, bool)> {
            self.today
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(WatchError::Provider("exhausted".into())))
        }

        async fn fetch_next_day(&self) -> Result<DaySchedule> {
            self.next
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(WatchError::Provider("exhausted".into())))
        }
    }

    fn tomorrow() -> NaiveDate {
        date().succ_opt().unwrap()
    }

    #[tokio::test]
    async fn test_refresh_stores_both_days() {
        let store = Arc::new(MemoryStore::new());
        let provider = CannedProvider::new(
            Ok((hourly_schedule(date(), &[(1, 8..10)]), true)),
            Ok(hourly_schedule(tomorrow(), &[(1, 12..14)])),
        );
        RefreshJob::new(provider, store.clone()).run().await.unwrap();

        assert!(store.get_day_schedule(date()).unwrap().is_some());
        assert!(store.get_day_schedule(tomorrow()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_skips_next_day_without_hint() {
        let store = Arc::new(MemoryStore::new());
        let provider = CannedProvider::new(
            Ok((hourly_schedule(date(), &[(1, 8..10)]), false)),
            Ok(hourly_schedule(tomorrow(), &[(1, 12..14)])),
        );
        RefreshJob::new(provider, store.clone()).run().await.unwrap();
        assert!(store.get_day_schedule(tomorrow()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_soft_states_are_not_errors() {
        let store = Arc::new(MemoryStore::new());
        let emergency = CannedProvider::new(
            Err(WatchError::ProviderEmergency),
            Err(WatchError::NextDayUnknown),
        );
        RefreshJob::new(emergency, store.clone()).run().await.unwrap();
        assert!(store.get_day_schedule(date()).unwrap().is_none());

        let unknown_next = CannedProvider::new(
            Ok((hourly_schedule(date(), &[]), true)),
            Err(WatchError::NextDayUnknown),
        );
        RefreshJob::new(unknown_next, store.clone()).run().await.unwrap();
        assert!(store.get_day_schedule(date()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_rejects_invalid_schedule() {
        let store = Arc::new(MemoryStore::new());
        let broken = hourly_schedule(date(), &[]).with_group(3, vec![Status::Off; 5]);
        let provider = CannedProvider::new(Ok((broken, false)), Err(WatchError::NextDayUnknown));

        let err = RefreshJob::new(provider, store.clone()).run().await.unwrap_err();
        assert!(matches!(err, WatchError::InvalidSchedule(_)));
        assert!(store.get_day_schedule(date()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_propagates_hard_errors() {
        let store = Arc::new(MemoryStore::new());
        let provider = CannedProvider::new(
            Err(WatchError::Provider("502".into())),
            Err(WatchError::NextDayUnknown),
        );
        let err = RefreshJob::new(provider, store).run().await.unwrap_err();
        assert!(matches!(err, WatchError::Provider(_)));
    }

    #[tokio::test]
    async fn test_cleanup_respects_retention() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(at(3, 0)));
        let three_days_ago = date().checked_sub_days(Days::new(3)).unwrap();
        let yesterday = date().pred_opt().unwrap();

        store.put_day_schedule(&hourly_schedule(three_days_ago, &[])).unwrap();
        store
            .put_notification_state(&NotificationState::new(1, three_days_ago, at(1, 0)))
            .unwrap();
        store
            .put_notification_state(&NotificationState::new(1, yesterday, at(1, 0)))
            .unwrap();
        store
            .put_alert_record(
                &AlertKey {
                    subscriber_id: 1,
                    date: three_days_ago,
                    start_time: "10:00".into(),
                    status: Status::Off,
                    group: 1,
                },
                at(1, 0),
            )
            .unwrap();

        let job = CleanupJob::new(store.clone(), clock, RetentionConfig::default());
        job.run().await.unwrap();

        // Default windows: states and alerts two days, schedules seven.
        assert!(store.get_notification_state(1, three_days_ago).unwrap().is_none());
        assert!(store.get_notification_state(1, yesterday).unwrap().is_some());
        assert_eq!(store.alert_record_count(), 0);
        assert!(store.get_day_schedule(three_days_ago).unwrap().is_some());
    }
}
