//! Subscriptions and the per-subscriber delivery records.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::schedule::{GroupNumber, Status, date_key};

/// Messaging-platform recipient (a Telegram chat id).
pub type SubscriberId = i64;

/// Separator between the parts of an alert record key.
pub const ALERT_KEY_DELIMITER: &str = "_";

/// A subscriber and the outage groups they follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscriber_id: SubscriberId,
    pub created_at: NaiveDateTime,
    pub groups: BTreeSet<GroupNumber>,
    #[serde(default)]
    pub settings: AlertSettings,
}

impl Subscription {
    pub fn new(
        subscriber_id: SubscriberId,
        groups: impl IntoIterator<Item = GroupNumber>,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            subscriber_id,
            created_at,
            groups: groups.into_iter().collect(),
            settings: AlertSettings::default(),
        }
    }

    pub fn subscribed_to(&self, group: GroupNumber) -> bool {
        self.groups.contains(&group)
    }
}

/// Which upcoming transitions a subscriber wants advance notice for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default = "bool_true")]
    pub off: bool,
    #[serde(default = "bool_true")]
    pub maybe: bool,
    #[serde(default)]
    pub on: bool,
}

fn bool_true() -> bool {
    true
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            off: true,
            maybe: true,
            on: false,
        }
    }
}

impl AlertSettings {
    pub fn enabled_for(&self, status: Status) -> bool {
        match status {
            Status::Off => self.off,
            Status::Maybe => self.maybe,
            Status::On => self.on,
        }
    }
}

/// Last-delivered fingerprint per group, one record per (subscriber, date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationState {
    pub subscriber_id: SubscriberId,
    pub date: NaiveDate,
    pub sent_at: NaiveDateTime,
    pub hashes: BTreeMap<GroupNumber, String>,
}

impl NotificationState {
    pub fn new(subscriber_id: SubscriberId, date: NaiveDate, sent_at: NaiveDateTime) -> Self {
        Self {
            subscriber_id,
            date,
            sent_at,
            hashes: BTreeMap::new(),
        }
    }
}

/// Identity of one advance-notice event for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlertKey {
    pub subscriber_id: SubscriberId,
    pub date: NaiveDate,
    pub start_time: String,
    pub status: Status,
    pub group: GroupNumber,
}

impl AlertKey {
    /// Flat storage key: `{subscriber}_{date}_{start}_{status}_{group}`.
    pub fn storage_key(&self) -> String {
        [
            self.subscriber_id.to_string(),
            date_key(self.date),
            self.start_time.clone(),
            self.status.to_string(),
            self.group.to_string(),
        ]
        .join(ALERT_KEY_DELIMITER)
    }
}

impl std::fmt::Display for AlertKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.storage_key())
    }
}
