//! Schedule acquisition trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::schedule::DaySchedule;

#[async_trait]
pub trait ScheduleProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Today's schedule plus a hint whether the next day is already published.
    ///
    /// Fails with `ProviderEmergency` when no plannable schedule exists.
    async fn fetch_schedule(&self) -> Result<(DaySchedule, bool)>;

    /// Tomorrow's schedule. Fails with `NextDayUnknown` when availability
    /// cannot be determined.
    async fn fetch_next_day(&self) -> Result<DaySchedule>;
}
