use chrono::{DateTime, Utc};
use hearth_core::error::StoreError;
use hearth_core::message::MessageParam;
use hearth_core::signal::{Signal, SignalData};
use hearth_core::ServiceCall;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// Why an automation-log row exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogType {
    Manual,
    DetermineSignal,
    ExecuteSignal,
}

impl LogType {
    fn as_str(&self) -> &'static str {
        match self {
            LogType::Manual => "manual",
            LogType::DetermineSignal => "determine-signal",
            LogType::ExecuteSignal => "execute-signal",
        }
    }

    fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "manual" => Ok(LogType::Manual),
            "determine-signal" => Ok(LogType::DetermineSignal),
            "execute-signal" => Ok(LogType::ExecuteSignal),
            other => Err(StoreError::QueryFailed(format!("unknown log type: {other}"))),
        }
    }
}

/// A new automation-log row to append.
#[derive(Debug, Clone)]
pub struct NewAutomationLog {
    pub automation_hash: Option<String>,
    pub log_type: LogType,
    pub messages: Vec<MessageParam>,
    pub signaled_by: Option<SignalData>,
}

/// A persisted automation-log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationLogRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub automation_hash: Option<String>,
    pub log_type: LogType,
    pub messages: Vec<MessageParam>,
    pub signaled_by: Option<SignalData>,
}

/// A persisted service-call row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallServiceLogRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub automation_log_id: i64,
    pub service: String,
    pub target: Vec<String>,
    pub data: Option<serde_json::Value>,
}

/// The durable signal store.
pub struct SignalStore {
    pool: SqlitePool,
}

impl SignalStore {
    /// Open (or create) the database at `path`.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        Self::connect(path, 4).await
    }

    /// An ephemeral in-memory store (useful for tests and eval runs).
    ///
    /// Pinned to a single pooled connection: every connection to
    /// `:memory:` is its own database, so the pool must never open a
    /// second one or rotate the first away.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn connect(path: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .min_connections(max_connections.min(1))
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("Signal store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                automation_hash TEXT NOT NULL,
                kind            TEXT NOT NULL,
                data            TEXT NOT NULL,
                is_dead         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_signals_hash_alive
             ON signals(automation_hash, is_dead)",
            r#"
            CREATE TABLE IF NOT EXISTS automation_logs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at      TEXT NOT NULL,
                automation_hash TEXT,
                type            TEXT NOT NULL,
                messages        TEXT NOT NULL DEFAULT '[]',
                signaled_by     TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_automation_logs_hash
             ON automation_logs(automation_hash)",
            r#"
            CREATE TABLE IF NOT EXISTS call_service_logs (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at        TEXT NOT NULL,
                automation_log_id INTEGER NOT NULL REFERENCES automation_logs(id),
                service           TEXT NOT NULL,
                target            TEXT NOT NULL,
                data              TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS images (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at        TEXT NOT NULL,
                automation_log_id INTEGER REFERENCES automation_logs(id),
                bytes             BLOB NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                level      TEXT NOT NULL,
                message    TEXT NOT NULL
            )
            "#,
        ];

        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        }

        debug!("store migrations complete");
        Ok(())
    }

    // ── signals ─────────────────────────────────────────────────────────

    /// Insert a new alive signal, returning its id.
    pub async fn insert_signal(
        &self,
        automation_hash: &str,
        data: &SignalData,
    ) -> Result<i64, StoreError> {
        let payload = serde_json::to_string(data)
            .map_err(|e| StoreError::Storage(format!("signal payload: {e}")))?;
        let result = sqlx::query(
            "INSERT INTO signals (automation_hash, kind, data, is_dead, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
        )
        .bind(automation_hash)
        .bind(data.kind())
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT signal: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(signal_id = id, automation = %automation_hash, kind = data.kind(), "signal inserted");
        Ok(id)
    }

    /// All alive signals for one automation hash.
    pub async fn alive_signals_for_hash(&self, hash: &str) -> Result<Vec<Signal>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM signals WHERE automation_hash = ?1 AND is_dead = 0 ORDER BY id",
        )
        .bind(hash)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("alive signals: {e}")))?;

        rows.iter().map(Self::row_to_signal).collect()
    }

    /// All alive signals across all automations (engine boot).
    pub async fn alive_signals(&self) -> Result<Vec<Signal>, StoreError> {
        let rows = sqlx::query("SELECT * FROM signals WHERE is_dead = 0 ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("alive signals: {e}")))?;

        rows.iter().map(Self::row_to_signal).collect()
    }

    /// Fetch a signal regardless of liveness.
    pub async fn signal(&self, id: i64) -> Result<Option<Signal>, StoreError> {
        let row = sqlx::query("SELECT * FROM signals WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("signal by id: {e}")))?;

        row.as_ref().map(Self::row_to_signal).transpose()
    }

    /// Mark one signal dead.
    pub async fn kill_signal(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE signals SET is_dead = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("kill signal: {e}")))?;
        Ok(())
    }

    /// Mark every alive signal for a hash dead.
    pub async fn kill_all_for_hash(&self, hash: &str) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE signals SET is_dead = 1 WHERE automation_hash = ?1 AND is_dead = 0")
                .bind(hash)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Storage(format!("kill all: {e}")))?;
        Ok(result.rows_affected())
    }

    // ── automation logs ─────────────────────────────────────────────────

    /// Append a log row, returning its id.
    pub async fn append_automation_log(&self, entry: &NewAutomationLog) -> Result<i64, StoreError> {
        let messages = serde_json::to_string(&entry.messages)
            .map_err(|e| StoreError::Storage(format!("messages payload: {e}")))?;
        let signaled_by = entry
            .signaled_by
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Storage(format!("signaled_by payload: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO automation_logs (created_at, automation_hash, type, messages, signaled_by)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&entry.automation_hash)
        .bind(entry.log_type.as_str())
        .bind(&messages)
        .bind(&signaled_by)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT log: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    /// Replace the message list of an existing log row.
    pub async fn update_automation_log(
        &self,
        id: i64,
        messages: &[MessageParam],
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(messages)
            .map_err(|e| StoreError::Storage(format!("messages payload: {e}")))?;
        sqlx::query("UPDATE automation_logs SET messages = ?1 WHERE id = ?2")
            .bind(&payload)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE log: {e}")))?;
        Ok(())
    }

    /// Record that a firing started: insert the execute-signal log row and,
    /// when the signal is a one-shot, mark it dead — in one transaction so a
    /// crash can never leave the pair half-done.
    pub async fn begin_firing(
        &self,
        signal: &Signal,
    ) -> Result<i64, StoreError> {
        let messages = "[]";
        let signaled_by = serde_json::to_string(&signal.data)
            .map_err(|e| StoreError::Storage(format!("signaled_by payload: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin tx: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO automation_logs (created_at, automation_hash, type, messages, signaled_by)
             VALUES (?1, ?2, 'execute-signal', ?3, ?4)",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&signal.automation_hash)
        .bind(messages)
        .bind(&signaled_by)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT firing log: {e}")))?;
        let log_id = result.last_insert_rowid();

        if signal.is_one_shot() {
            sqlx::query("UPDATE signals SET is_dead = 1 WHERE id = ?1")
                .bind(signal.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Storage(format!("kill one-shot: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit firing: {e}")))?;

        Ok(log_id)
    }

    /// Fetch one log row.
    pub async fn automation_log(&self, id: i64) -> Result<Option<AutomationLogRow>, StoreError> {
        let row = sqlx::query("SELECT * FROM automation_logs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("log by id: {e}")))?;

        row.as_ref().map(Self::row_to_log).transpose()
    }

    /// Log rows, newest first, optionally filtered by automation hash.
    pub async fn automation_logs(
        &self,
        hash: Option<&str>,
        limit: i64,
    ) -> Result<Vec<AutomationLogRow>, StoreError> {
        let rows = match hash {
            Some(hash) => {
                sqlx::query(
                    "SELECT * FROM automation_logs WHERE automation_hash = ?1
                     ORDER BY id DESC LIMIT ?2",
                )
                .bind(hash)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM automation_logs ORDER BY id DESC LIMIT ?1")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| StoreError::QueryFailed(format!("logs: {e}")))?;

        rows.iter().map(Self::row_to_log).collect()
    }

    // ── service call logs ───────────────────────────────────────────────

    /// Record one hub write against its log row.
    pub async fn record_service_call(
        &self,
        automation_log_id: i64,
        call: &ServiceCall,
    ) -> Result<(), StoreError> {
        let target = serde_json::to_string(&call.target.entity_id)
            .map_err(|e| StoreError::Storage(format!("target payload: {e}")))?;
        let data = call
            .data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Storage(format!("data payload: {e}")))?;

        sqlx::query(
            "INSERT INTO call_service_logs (created_at, automation_log_id, service, target, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(automation_log_id)
        .bind(format!("{}.{}", call.domain, call.service))
        .bind(&target)
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT service call: {e}")))?;
        Ok(())
    }

    /// Service calls recorded for one log row.
    pub async fn service_calls_for_log(
        &self,
        automation_log_id: i64,
    ) -> Result<Vec<CallServiceLogRow>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM call_service_logs WHERE automation_log_id = ?1 ORDER BY id")
                .bind(automation_log_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("service calls: {e}")))?;

        rows.iter()
            .map(|row| {
                let target_json: String = row
                    .try_get("target")
                    .map_err(|e| StoreError::QueryFailed(format!("target column: {e}")))?;
                let data_json: Option<String> = row
                    .try_get("data")
                    .map_err(|e| StoreError::QueryFailed(format!("data column: {e}")))?;
                Ok(CallServiceLogRow {
                    id: row
                        .try_get("id")
                        .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?,
                    created_at: Self::parse_timestamp(row, "created_at")?,
                    automation_log_id: row
                        .try_get("automation_log_id")
                        .map_err(|e| StoreError::QueryFailed(format!("log id column: {e}")))?,
                    service: row
                        .try_get("service")
                        .map_err(|e| StoreError::QueryFailed(format!("service column: {e}")))?,
                    target: serde_json::from_str(&target_json).unwrap_or_default(),
                    data: data_json.as_deref().map(serde_json::from_str).transpose().ok().flatten(),
                })
            })
            .collect()
    }

    // ── app log tail ────────────────────────────────────────────────────

    /// Append one application log line.
    pub async fn record_log(&self, level: &str, message: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO logs (created_at, level, message) VALUES (?1, ?2, ?3)")
            .bind(Utc::now().to_rfc3339())
            .bind(level)
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("INSERT log line: {e}")))?;
        Ok(())
    }

    /// The most recent log lines, newest first, as `(level, message)` pairs.
    pub async fn recent_logs(&self, limit: i64) -> Result<Vec<(String, String)>, StoreError> {
        let rows = sqlx::query("SELECT level, message FROM logs ORDER BY id DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("log tail: {e}")))?;

        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get("level")
                        .map_err(|e| StoreError::QueryFailed(format!("level column: {e}")))?,
                    row.try_get("message")
                        .map_err(|e| StoreError::QueryFailed(format!("message column: {e}")))?,
                ))
            })
            .collect()
    }

    // ── images ──────────────────────────────────────────────────────────

    /// Store an image blob, returning its id.
    pub async fn store_image(
        &self,
        automation_log_id: Option<i64>,
        bytes: &[u8],
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO images (created_at, automation_log_id, bytes) VALUES (?1, ?2, ?3)",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(automation_log_id)
        .bind(bytes)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT image: {e}")))?;
        Ok(result.last_insert_rowid())
    }

    /// Fetch an image blob.
    pub async fn image(&self, id: i64) -> Result<Option<Vec<u8>>, StoreError> {
        let row = sqlx::query("SELECT bytes FROM images WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("image by id: {e}")))?;

        row.map(|r| {
            r.try_get::<Vec<u8>, _>("bytes")
                .map_err(|e| StoreError::QueryFailed(format!("bytes column: {e}")))
        })
        .transpose()
    }

    // ── maintenance ─────────────────────────────────────────────────────

    /// Flush the WAL into the main database file. Invoked on shutdown.
    pub async fn checkpoint(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("checkpoint: {e}")))?;
        info!("store checkpoint complete");
        Ok(())
    }

    // ── row parsing ─────────────────────────────────────────────────────

    fn parse_timestamp(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
        let raw: String = row
            .try_get(column)
            .map_err(|e| StoreError::QueryFailed(format!("{column} column: {e}")))?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::QueryFailed(format!("{column} timestamp: {e}")))
    }

    fn row_to_signal(row: &sqlx::sqlite::SqliteRow) -> Result<Signal, StoreError> {
        let data_json: String = row
            .try_get("data")
            .map_err(|e| StoreError::QueryFailed(format!("data column: {e}")))?;
        let data: SignalData = serde_json::from_str(&data_json)
            .map_err(|e| StoreError::QueryFailed(format!("signal payload: {e}")))?;
        let is_dead: i64 = row
            .try_get("is_dead")
            .map_err(|e| StoreError::QueryFailed(format!("is_dead column: {e}")))?;

        Ok(Signal {
            id: row
                .try_get("id")
                .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?,
            automation_hash: row
                .try_get("automation_hash")
                .map_err(|e| StoreError::QueryFailed(format!("hash column: {e}")))?,
            data,
            is_dead: is_dead != 0,
            created_at: Self::parse_timestamp(row, "created_at")?,
        })
    }

    fn row_to_log(row: &sqlx::sqlite::SqliteRow) -> Result<AutomationLogRow, StoreError> {
        let messages_json: String = row
            .try_get("messages")
            .map_err(|e| StoreError::QueryFailed(format!("messages column: {e}")))?;
        let messages: Vec<MessageParam> = serde_json::from_str(&messages_json)
            .map_err(|e| StoreError::QueryFailed(format!("messages payload: {e}")))?;
        let type_str: String = row
            .try_get("type")
            .map_err(|e| StoreError::QueryFailed(format!("type column: {e}")))?;
        let signaled_by_json: Option<String> = row
            .try_get("signaled_by")
            .map_err(|e| StoreError::QueryFailed(format!("signaled_by column: {e}")))?;
        let signaled_by = signaled_by_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StoreError::QueryFailed(format!("signaled_by payload: {e}")))?;

        Ok(AutomationLogRow {
            id: row
                .try_get("id")
                .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?,
            created_at: Self::parse_timestamp(row, "created_at")?,
            automation_hash: row
                .try_get("automation_hash")
                .map_err(|e| StoreError::QueryFailed(format!("hash column: {e}")))?,
            log_type: LogType::parse(&type_str)?,
            messages,
            signaled_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::hub::ServiceTarget;
    use hearth_core::message::ContentBlock;

    async fn test_store() -> SignalStore {
        SignalStore::in_memory().await.unwrap()
    }

    fn cron(expr: &str) -> SignalData {
        SignalData::Cron { expr: expr.into() }
    }

    #[tokio::test]
    async fn insert_and_list_alive_signals() {
        let store = test_store().await;
        let id = store.insert_signal("hash_a", &cron("0 7 * * *")).await.unwrap();
        assert!(id > 0);

        let alive = store.alive_signals_for_hash("hash_a").await.unwrap();
        assert_eq!(alive.len(), 1);
        assert_eq!(alive[0].id, id);
        assert!(!alive[0].is_dead);
        assert_eq!(alive[0].data, cron("0 7 * * *"));

        assert!(store.alive_signals_for_hash("hash_b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_signal_kinds_round_trip() {
        let store = test_store().await;
        let now = Utc::now();
        let samples = vec![
            cron("*/5 * * * *"),
            SignalData::State {
                entity_ids: vec!["binary_sensor.front_door".into()],
                regex: "open".into(),
            },
            SignalData::Offset {
                offset_seconds: 900,
                repeat_forever: true,
                anchor: now,
            },
            SignalData::Time { at: now },
            SignalData::StateRange {
                entity_id: "sensor.humidity".into(),
                min: Some(40.0),
                max: Some(60.0),
                for_seconds: 120,
            },
        ];

        for data in &samples {
            store.insert_signal("hash_rt", data).await.unwrap();
        }

        let alive = store.alive_signals_for_hash("hash_rt").await.unwrap();
        assert_eq!(alive.len(), samples.len());
        for (signal, data) in alive.iter().zip(&samples) {
            assert_eq!(&signal.data, data);
            assert_eq!(signal.data.kind(), data.kind());
        }
    }

    #[tokio::test]
    async fn kill_signal_and_kill_all() {
        let store = test_store().await;
        let id1 = store.insert_signal("h", &cron("0 7 * * *")).await.unwrap();
        let _id2 = store.insert_signal("h", &cron("0 9 * * *")).await.unwrap();

        store.kill_signal(id1).await.unwrap();
        assert_eq!(store.alive_signals_for_hash("h").await.unwrap().len(), 1);

        let killed = store.kill_all_for_hash("h").await.unwrap();
        assert_eq!(killed, 1);
        assert!(store.alive_signals_for_hash("h").await.unwrap().is_empty());

        // dead rows remain fetchable by id
        let dead = store.signal(id1).await.unwrap().unwrap();
        assert!(dead.is_dead);
    }

    #[tokio::test]
    async fn begin_firing_kills_one_shot_atomically() {
        let store = test_store().await;
        let at = Utc::now();
        let id = store
            .insert_signal("h", &SignalData::Time { at })
            .await
            .unwrap();
        let signal = store.signal(id).await.unwrap().unwrap();

        let log_id = store.begin_firing(&signal).await.unwrap();

        // exactly one execute-signal log, and the signal is dead
        let log = store.automation_log(log_id).await.unwrap().unwrap();
        assert_eq!(log.log_type, LogType::ExecuteSignal);
        assert_eq!(log.automation_hash.as_deref(), Some("h"));
        assert_eq!(log.signaled_by, Some(SignalData::Time { at }));
        assert!(store.signal(id).await.unwrap().unwrap().is_dead);
        assert!(store.alive_signals_for_hash("h").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn begin_firing_keeps_repeating_signal_alive() {
        let store = test_store().await;
        let id = store.insert_signal("h", &cron("0 7 * * *")).await.unwrap();
        let signal = store.signal(id).await.unwrap().unwrap();

        store.begin_firing(&signal).await.unwrap();
        assert_eq!(store.alive_signals_for_hash("h").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn append_and_update_automation_log() {
        let store = test_store().await;
        let log_id = store
            .append_automation_log(&NewAutomationLog {
                automation_hash: Some("h".into()),
                log_type: LogType::DetermineSignal,
                messages: vec![MessageParam::user("schedule me")],
                signaled_by: None,
            })
            .await
            .unwrap();

        let transcript = vec![
            MessageParam::user("schedule me"),
            MessageParam::assistant_blocks(vec![ContentBlock::Text {
                text: "done".into(),
            }]),
        ];
        store.update_automation_log(log_id, &transcript).await.unwrap();

        let row = store.automation_log(log_id).await.unwrap().unwrap();
        assert_eq!(row.messages, transcript);
        assert_eq!(row.log_type, LogType::DetermineSignal);
    }

    #[tokio::test]
    async fn record_and_list_service_calls() {
        let store = test_store().await;
        let log_id = store
            .append_automation_log(&NewAutomationLog {
                automation_hash: Some("h".into()),
                log_type: LogType::ExecuteSignal,
                messages: vec![],
                signaled_by: None,
            })
            .await
            .unwrap();

        let call = ServiceCall {
            domain: "light".into(),
            service: "turn_off".into(),
            target: ServiceTarget {
                entity_id: vec!["light.kitchen".into()],
            },
            data: Some(serde_json::json!({"transition": 1})),
        };
        store.record_service_call(log_id, &call).await.unwrap();

        let calls = store.service_calls_for_log(log_id).await.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].service, "light.turn_off");
        assert_eq!(calls[0].target, vec!["light.kitchen"]);
        assert_eq!(calls[0].data, Some(serde_json::json!({"transition": 1})));
    }

    #[tokio::test]
    async fn log_tail_newest_first() {
        let store = test_store().await;
        store.record_log("error", "first").await.unwrap();
        store.record_log("warn", "second").await.unwrap();

        let tail = store.recent_logs(10).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].1, "second");
        assert_eq!(tail[1].1, "first");
    }

    #[tokio::test]
    async fn image_round_trip() {
        let store = test_store().await;
        let id = store.store_image(None, &[1, 2, 3, 4]).await.unwrap();
        let bytes = store.image(id).await.unwrap().unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
        assert!(store.image(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkpoint_succeeds() {
        let store = test_store().await;
        store.insert_signal("h", &cron("0 7 * * *")).await.unwrap();
        store.checkpoint().await.unwrap();
    }
}
