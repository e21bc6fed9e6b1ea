//! JSON feed provider.
//!
//! The feed publishes one document per day:
//! ```json
//! { "emergency": false, "has_next_day": true,
//!   "schedule": { "date": "2026-03-14", "periods": [...], "groups": {...} } }
//! ```
//! `emergency = true` means outages are not planned right now and no
//! schedule is usable. A 404 on the next-day URL means it is not out yet.

use std::time::Duration;

use async_trait::async_trait;
use lightwatch_core::config::ProviderConfig;
use lightwatch_core::error::{Result, WatchError};
use lightwatch_core::schedule::DaySchedule;
use lightwatch_core::traits::ScheduleProvider;
use serde::Deserialize;

/// One feed document.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedDocument {
    #[serde(default)]
    pub emergency: bool,
    #[serde(default)]
    pub has_next_day: bool,
    #[serde(default)]
    pub schedule: Option<DaySchedule>,
}

impl FeedDocument {
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body)
            .map_err(|e| WatchError::Provider(format!("Invalid feed document: {e}")))
    }

    /// The usable schedule, or the reason there is none.
    pub fn into_schedule(self) -> Result<(DaySchedule, bool)> {
        if self.emergency {
            return Err(WatchError::ProviderEmergency);
        }
        let schedule = self
            .schedule
            .ok_or_else(|| WatchError::Provider("Feed document has no schedule".into()))?;
        Ok((schedule, self.has_next_day))
    }
}

/// Fetches schedules from the configured feed URLs.
pub struct JsonFeedProvider {
    today_url: String,
    next_day_url: Option<String>,
    client: reqwest::Client,
}

impl JsonFeedProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        if config.today_url.trim().is_empty() {
            return Err(WatchError::Config("provider.today_url is not set".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WatchError::Provider(format!("HTTP client: {e}")))?;
        Ok(Self {
            today_url: config.today_url.clone(),
            next_day_url: config
                .next_day_url
                .clone()
                .filter(|url| !url.trim().is_empty()),
            client,
        })
    }

    /// GET a feed document; `None` when the URL answers 404.
    async fn fetch(&self, url: &str) -> Result<Option<FeedDocument>> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                WatchError::DeadlineExceeded
            } else {
                WatchError::Provider(format!("GET {url} failed: {e}"))
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(WatchError::Provider(format!("GET {url} returned {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| WatchError::Provider(format!("Reading {url}: {e}")))?;
        FeedDocument::parse(&body).map(Some)
    }
}

#[async_trait]
impl ScheduleProvider for JsonFeedProvider {
    fn name(&self) -> &str {
        "json-feed"
    }

    async fn fetch_schedule(&self) -> Result<(DaySchedule, bool)> {
        let document = self
            .fetch(&self.today_url)
            .await?
            .ok_or_else(|| WatchError::Provider("Today's schedule is not published".into()))?;
        let (schedule, has_next_day) = document.into_schedule()?;
        tracing::debug!(date = %schedule.date, has_next_day, "Fetched schedule");
        Ok((schedule, has_next_day && self.next_day_url.is_some()))
    }

    async fn fetch_next_day(&self) -> Result<DaySchedule> {
        let url = self.next_day_url.as_deref().ok_or(WatchError::NextDayUnknown)?;
        let document = self.fetch(url).await?.ok_or(WatchError::NextDayUnknown)?;
        let (schedule, _) = document.into_schedule()?;
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use lightwatch_core::schedule::Status;

    const FEED: &str = r#"{
        "emergency": false,
        "has_next_day": true,
        "schedule": {
            "date": "2026-03-14",
            "periods": [
                {"from": "00:00", "to": "12:00"},
                {"from": "12:00", "to": "24:00"}
            ],
            "groups": {
                "1": {"group_number": 1, "statuses": ["off", "on"]},
                "2": {"group_number": 2, "statuses": ["maybe", "off"]}
            }
        }
    }"#;

    fn config(today: &str, next: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            today_url: today.into(),
            next_day_url: next.map(String::from),
            timeout_secs: 2,
        }
    }

    #[test]
    fn test_parse_feed() {
        let (schedule, has_next_day) = FeedDocument::parse(FEED).unwrap().into_schedule().unwrap();
        assert!(has_next_day);
        assert_eq!(schedule.date, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
        assert_eq!(schedule.periods.len(), 2);
        assert_eq!(schedule.groups[&2].statuses, vec![Status::Maybe, Status::Off]);
        schedule.validate().unwrap();
    }

    #[test]
    fn test_emergency_feed() {
        let doc = FeedDocument::parse(r#"{"emergency": true}"#).unwrap();
        assert!(matches!(doc.into_schedule(), Err(WatchError::ProviderEmergency)));
    }

    #[test]
    fn test_feed_without_schedule_is_an_error() {
        let doc = FeedDocument::parse(r#"{"has_next_day": false}"#).unwrap();
        assert!(matches!(doc.into_schedule(), Err(WatchError::Provider(_))));
        assert!(FeedDocument::parse("<html>").is_err());
    }

    #[test]
    fn test_today_url_required() {
        assert!(matches!(
            JsonFeedProvider::new(&config("", None)),
            Err(WatchError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_next_day_unknown_without_url() {
        let provider = JsonFeedProvider::new(&config("http://127.0.0.1:9/today", Some(" "))).unwrap();
        assert!(matches!(
            provider.fetch_next_day().await,
            Err(WatchError::NextDayUnknown)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_feed_is_a_hard_error() {
        let provider = JsonFeedProvider::new(&config("http://127.0.0.1:9/today", None)).unwrap();
        let err = provider.fetch_schedule().await.unwrap_err();
        assert!(!err.is_soft_provider_state());
    }
}
