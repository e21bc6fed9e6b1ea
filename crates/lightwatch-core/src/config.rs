//! Lightwatch configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, WatchError};
use crate::schedule::parse_hhmm;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LightwatchConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl LightwatchConfig {
    /// Load config from the default path (~/.lightwatch/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Self::from_toml("")
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WatchError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| WatchError::Config(format!("Failed to parse config: {e}")))?;
        if config.telegram.bot_token.is_empty()
            && let Ok(token) = std::env::var("LIGHTWATCH_TELEGRAM_TOKEN")
        {
            config.telegram.bot_token = token;
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| WatchError::Config(format!("Failed to serialize config: {e}")))
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Lightwatch home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lightwatch")
    }

    /// Startup-time sanity checks. Failures here are fatal.
    pub fn validate(&self) -> Result<()> {
        let jobs = &self.jobs;
        for (name, secs) in [
            ("refresh_secs", jobs.refresh_secs),
            ("changes_secs", jobs.changes_secs),
            ("alerts_secs", jobs.alerts_secs),
            ("cleanup_secs", jobs.cleanup_secs),
            ("heartbeat_secs", jobs.heartbeat_secs),
        ] {
            if secs == 0 {
                return Err(WatchError::Config(format!("jobs.{name} must be positive")));
            }
        }

        let alerts = &self.alerts;
        if alerts.tolerance_minutes >= alerts.lookahead_minutes {
            return Err(WatchError::Config(format!(
                "alerts.tolerance_minutes ({}) must be smaller than alerts.lookahead_minutes ({})",
                alerts.tolerance_minutes, alerts.lookahead_minutes
            )));
        }
        let from = parse_hhmm(&alerts.active_from)
            .map_err(|e| WatchError::Config(format!("alerts.active_from: {e}")))?;
        let until = parse_hhmm(&alerts.active_until)
            .map_err(|e| WatchError::Config(format!("alerts.active_until: {e}")))?;
        if from >= until {
            return Err(WatchError::Config(format!(
                "alerts.active_from ({}) must be before alerts.active_until ({})",
                alerts.active_from, alerts.active_until
            )));
        }
        Ok(())
    }
}

/// Persistent store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String { "~/.lightwatch/lightwatch.db".into() }

impl StoreConfig {
    /// Store path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

fn default_telegram_api() -> String { "https://api.telegram.org".into() }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_telegram_api(),
        }
    }
}

/// Schedule feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub today_url: String,
    #[serde(default)]
    pub next_day_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 { 30 }

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            today_url: String::new(),
            next_day_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Advance-notice policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_lookahead")]
    pub lookahead_minutes: u32,
    #[serde(default = "default_tolerance")]
    pub tolerance_minutes: u32,
    /// Alerts are evaluated only inside `[active_from, active_until)`.
    #[serde(default = "default_active_from")]
    pub active_from: String,
    #[serde(default = "default_active_until")]
    pub active_until: String,
}

fn default_lookahead() -> u32 { 10 }
fn default_tolerance() -> u32 { 5 }
fn default_active_from() -> String { "07:00".into() }
fn default_active_until() -> String { "23:00".into() }

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            lookahead_minutes: default_lookahead(),
            tolerance_minutes: default_tolerance(),
            active_from: default_active_from(),
            active_until: default_active_until(),
        }
    }
}

/// How many days of records are kept before cleanup purges them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_notification_days")]
    pub notification_days: u32,
    #[serde(default = "default_alert_days")]
    pub alert_days: u32,
    #[serde(default = "default_schedule_days")]
    pub schedule_days: u32,
}

fn default_notification_days() -> u32 { 2 }
fn default_alert_days() -> u32 { 2 }
fn default_schedule_days() -> u32 { 7 }

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            notification_days: default_notification_days(),
            alert_days: default_alert_days(),
            schedule_days: default_schedule_days(),
        }
    }
}

/// Periodic job intervals (seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    #[serde(default = "default_changes_secs")]
    pub changes_secs: u64,
    #[serde(default = "default_alerts_secs")]
    pub alerts_secs: u64,
    #[serde(default = "default_cleanup_secs")]
    pub cleanup_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_refresh_secs() -> u64 { 300 }
fn default_changes_secs() -> u64 { 60 }
fn default_alerts_secs() -> u64 { 60 }
fn default_cleanup_secs() -> u64 { 3600 }
fn default_heartbeat_secs() -> u64 { 300 }

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            refresh_secs: default_refresh_secs(),
            changes_secs: default_changes_secs(),
            alerts_secs: default_alerts_secs(),
            cleanup_secs: default_cleanup_secs(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = LightwatchConfig::from_toml("").unwrap();
        assert_eq!(config.alerts.lookahead_minutes, 10);
        assert_eq!(config.alerts.tolerance_minutes, 5);
        assert_eq!(config.jobs.changes_secs, 60);
        assert_eq!(config.retention.schedule_days, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let config = LightwatchConfig::from_toml(
            r#"
            [alerts]
            lookahead_minutes = 15
            active_from = "06:30"

            [provider]
            today_url = "https://example.test/today.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.alerts.lookahead_minutes, 15);
        assert_eq!(config.alerts.tolerance_minutes, 5);
        assert_eq!(config.alerts.active_from, "06:30");
        assert_eq!(config.provider.today_url, "https://example.test/today.json");
        assert_eq!(config.provider.timeout_secs, 30);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = LightwatchConfig::default();
        config.jobs.alerts_secs = 0;
        assert!(config.validate().is_err());

        let mut config = LightwatchConfig::default();
        config.alerts.tolerance_minutes = 10;
        assert!(config.validate().is_err());

        let mut config = LightwatchConfig::default();
        config.alerts.active_from = "25:00".into();
        assert!(config.validate().is_err());

        let mut config = LightwatchConfig::default();
        config.alerts.active_from = "23:30".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_keeps_sections() {
        let text = LightwatchConfig::default().to_toml().unwrap();
        assert!(text.contains("[alerts]"));
        assert!(text.contains("[jobs]"));
    }
}
