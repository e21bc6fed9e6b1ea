//! SQLite-backed store for schedules, subscriptions and delivery records.
//! Survives restarts; one connection behind a mutex, so every call is a
//! self-contained transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveDateTime};
use lightwatch_core::error::{Result, WatchError};
use lightwatch_core::schedule::{DaySchedule, date_key};
use lightwatch_core::subscription::{AlertKey, NotificationState, SubscriberId, Subscription};
use lightwatch_core::traits::Store;
use rusqlite::{Connection, OptionalExtension, params};

const SCHEMA_VERSION: i64 = 1;
const REQUIRED_TABLES: [&str; 5] = [
    "meta",
    "day_schedules",
    "subscriptions",
    "notification_states",
    "alert_records",
];
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// SQLite-backed persistence store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> WatchError + '_ {
    move |e| WatchError::Store(format!("{context}: {e}"))
}

fn json_err(context: &str) -> impl Fn(serde_json::Error) -> WatchError + '_ {
    move |e| WatchError::Store(format!("{context}: {e}"))
}

fn format_datetime(at: NaiveDateTime) -> String {
    at.format(DATETIME_FORMAT).to_string()
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map_err(|e| WatchError::Store(format!("Bad timestamp '{s}': {e}")))
}

impl SqliteStore {
    /// Open or create the database and bring the schema up to date.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err("DB open"))?;
        // WAL for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("DB open"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        store.verify_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| WatchError::Store(format!("Lock: {e}")))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- One published schedule per day (JSON payload)
            CREATE TABLE IF NOT EXISTS day_schedules (
                date TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS subscriptions (
                subscriber_id INTEGER PRIMARY KEY,
                created_at TEXT NOT NULL,
                groups_json TEXT NOT NULL DEFAULT '[]',
                settings_json TEXT NOT NULL DEFAULT '{}'
            );

            -- Last delivered fingerprint per group, per subscriber and day
            CREATE TABLE IF NOT EXISTS notification_states (
                subscriber_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                hashes_json TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (subscriber_id, date)
            );

            -- Sent advance notices, keyed subscriber_date_start_status_group
            CREATE TABLE IF NOT EXISTS alert_records (
                key TEXT PRIMARY KEY,
                subscriber_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                sent_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_alert_records_subscriber ON alert_records(subscriber_id);
            CREATE INDEX IF NOT EXISTS idx_alert_records_date ON alert_records(date);
            ",
        )
        .map_err(db_err("Migration"))?;

        conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )
        .map_err(db_err("Migration"))?;
        Ok(())
    }

    /// Structural keys the steady-state code relies on.
    fn verify_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        for table in REQUIRED_TABLES {
            let exists: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![table],
                    |row| row.get(0),
                )
                .map_err(db_err("Schema check"))?;
            if exists == 0 {
                return Err(WatchError::Store(format!("Missing table '{table}'")));
            }
        }

        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("Schema check"))?;
        match version.and_then(|v| v.parse::<i64>().ok()) {
            Some(v) if v <= SCHEMA_VERSION => Ok(()),
            Some(v) => Err(WatchError::Store(format!(
                "Database schema version {v} is newer than supported {SCHEMA_VERSION}"
            ))),
            None => Err(WatchError::Store("Missing schema_version".into())),
        }
    }

    fn subscription_from_row(
        subscriber_id: SubscriberId,
        created_at: &str,
        groups_json: &str,
        settings_json: &str,
    ) -> Result<Subscription> {
        Ok(Subscription {
            subscriber_id,
            created_at: parse_datetime(created_at)?,
            groups: serde_json::from_str(groups_json).map_err(json_err("Subscription groups"))?,
            settings: serde_json::from_str(settings_json)
                .map_err(json_err("Subscription settings"))?,
        })
    }
}

impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    // ─── Schedules ──────────────────────────────────────────

    fn get_day_schedule(&self, date: NaiveDate) -> Result<Option<DaySchedule>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM day_schedules WHERE date = ?1",
                params![date_key(date)],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("Get schedule"))?;
        data.map(|json| serde_json::from_str(&json).map_err(json_err("Decode schedule")))
            .transpose()
    }

    fn put_day_schedule(&self, schedule: &DaySchedule) -> Result<()> {
        let data = serde_json::to_string(schedule).map_err(json_err("Encode schedule"))?;
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO day_schedules (date, data, updated_at)
                 VALUES (?1, ?2, datetime('now'))",
                params![schedule.date_key(), data],
            )
            .map_err(db_err("Save schedule"))?;
        Ok(())
    }

    // ─── Notification state ─────────────────────────────────

    fn get_notification_state(
        &self,
        subscriber_id: SubscriberId,
        date: NaiveDate,
    ) -> Result<Option<NotificationState>> {
        let conn = self.lock()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT sent_at, hashes_json FROM notification_states
                 WHERE subscriber_id = ?1 AND date = ?2",
                params![subscriber_id, date_key(date)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err("Get notification state"))?;

        row.map(|(sent_at, hashes)| {
            Ok(NotificationState {
                subscriber_id,
                date,
                sent_at: parse_datetime(&sent_at)?,
                hashes: serde_json::from_str(&hashes).map_err(json_err("Decode hashes"))?,
            })
        })
        .transpose()
    }

    fn put_notification_state(&self, state: &NotificationState) -> Result<()> {
        let hashes = serde_json::to_string(&state.hashes).map_err(json_err("Encode hashes"))?;
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO notification_states (subscriber_id, date, sent_at, hashes_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    state.subscriber_id,
                    date_key(state.date),
                    format_datetime(state.sent_at),
                    hashes
                ],
            )
            .map_err(db_err("Save notification state"))?;
        Ok(())
    }

    // ─── Alert records ──────────────────────────────────────

    fn get_alert_record(&self, key: &AlertKey) -> Result<Option<NaiveDateTime>> {
        let conn = self.lock()?;
        let sent_at: Option<String> = conn
            .query_row(
                "SELECT sent_at FROM alert_records WHERE key = ?1",
                params![key.storage_key()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("Get alert record"))?;
        sent_at.map(|s| parse_datetime(&s)).transpose()
    }

    fn put_alert_record(&self, key: &AlertKey, sent_at: NaiveDateTime) -> Result<()> {
        // Records are write-once.
        self.lock()?
            .execute(
                "INSERT OR IGNORE INTO alert_records (key, subscriber_id, date, sent_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    key.storage_key(),
                    key.subscriber_id,
                    date_key(key.date),
                    format_datetime(sent_at)
                ],
            )
            .map_err(db_err("Save alert record"))?;
        Ok(())
    }

    // ─── Subscriptions ──────────────────────────────────────

    fn get_all_subscriptions(&self) -> Result<Vec<Subscription>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT subscriber_id, created_at, groups_json, settings_json
                 FROM subscriptions ORDER BY subscriber_id",
            )
            .map_err(db_err("List subscriptions"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_err("List subscriptions"))?;

        let mut subscriptions = Vec::new();
        for row in rows {
            let (id, created_at, groups, settings) = row.map_err(db_err("List subscriptions"))?;
            match Self::subscription_from_row(id, &created_at, &groups, &settings) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => tracing::warn!(subscriber = id, "⚠️ Skipping unreadable subscription: {e}"),
            }
        }
        Ok(subscriptions)
    }

    fn get_subscription(&self, subscriber_id: SubscriberId) -> Result<Option<Subscription>> {
        let conn = self.lock()?;
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT created_at, groups_json, settings_json FROM subscriptions
                 WHERE subscriber_id = ?1",
                params![subscriber_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(db_err("Get subscription"))?;
        row.map(|(created_at, groups, settings)| {
            Self::subscription_from_row(subscriber_id, &created_at, &groups, &settings)
        })
        .transpose()
    }

    fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        let groups =
            serde_json::to_string(&subscription.groups).map_err(json_err("Encode groups"))?;
        let settings =
            serde_json::to_string(&subscription.settings).map_err(json_err("Encode settings"))?;
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO subscriptions (subscriber_id, created_at, groups_json, settings_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    subscription.subscriber_id,
                    format_datetime(subscription.created_at),
                    groups,
                    settings
                ],
            )
            .map_err(db_err("Save subscription"))?;
        Ok(())
    }

    fn purge_subscriber(&self, subscriber_id: SubscriberId) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err("Purge subscriber"))?;
        for sql in [
            "DELETE FROM subscriptions WHERE subscriber_id = ?1",
            "DELETE FROM notification_states WHERE subscriber_id = ?1",
            "DELETE FROM alert_records WHERE subscriber_id = ?1",
        ] {
            tx.execute(sql, params![subscriber_id])
                .map_err(db_err("Purge subscriber"))?;
        }
        tx.commit().map_err(db_err("Purge subscriber"))?;
        Ok(())
    }

    // ─── Retention ──────────────────────────────────────────

    fn purge_notification_states_before(&self, date: NaiveDate) -> Result<usize> {
        self.lock()?
            .execute(
                "DELETE FROM notification_states WHERE date < ?1",
                params![date_key(date)],
            )
            .map_err(db_err("Purge notification states"))
    }

    fn purge_alert_records_before(&self, date: NaiveDate) -> Result<usize> {
        self.lock()?
            .execute(
                "DELETE FROM alert_records WHERE date < ?1",
                params![date_key(date)],
            )
            .map_err(db_err("Purge alert records"))
    }

    fn purge_day_schedules_before(&self, date: NaiveDate) -> Result<usize> {
        self.lock()?
            .execute(
                "DELETE FROM day_schedules WHERE date < ?1",
                params![date_key(date)],
            )
            .map_err(db_err("Purge schedules"))
    }
}
