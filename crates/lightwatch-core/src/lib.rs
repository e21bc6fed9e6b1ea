//! # Lightwatch Core
//!
//! Shared building blocks for the outage notification service:
//! the day-schedule data model, subscriptions, the error type,
//! configuration, and the traits behind which the store, the
//! messaging platform and the schedule provider live.

pub mod clock;
pub mod config;
pub mod error;
pub mod schedule;
pub mod subscription;
pub mod traits;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::LightwatchConfig;
pub use error::{Result, WatchError};
pub use schedule::{DaySchedule, GroupNumber, GroupSchedule, Period, Status};
pub use subscription::{AlertKey, AlertSettings, NotificationState, Subscription, SubscriberId};
pub use traits::{Messenger, ScheduleProvider, Store};
