// Session blobs keyed by a random id, expiring after ttl_days. SQLite table with the
// DynamoDB attribute layout (SessionId, Data, LastUpdated, TTL).

use crate::models::{ChatTurn, SessionRecord};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Key under which chat turns are kept inside the session blob.
pub const CHAT_HISTORY_KEY: &str = "chatHistory";

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Overwrite the blob and push its expiry out to now + ttl.
    async fn save(&self, session_id: &str, data: &Value) -> anyhow::Result<()>;
    /// `None` when absent or expired.
    async fn load(&self, session_id: &str) -> anyhow::Result<Option<Value>>;
    async fn delete(&self, session_id: &str) -> anyhow::Result<()>;
    /// Remove expired rows; returns how many went.
    async fn purge_expired(&self) -> anyhow::Result<u64>;
}

pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

pub struct SqliteSessionStore {
    pool: SqlitePool,
    table: String,
    ttl_secs: i64,
}

impl SqliteSessionStore {
    /// `table_name` must already be a validated identifier (see `AppConfig::validate`).
    pub async fn connect(path: &str, table_name: &str, ttl_days: u32) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !table_name.is_empty()
                && table_name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_'),
            "invalid session table name {table_name:?}"
        );
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self {
            pool,
            table: format!("\"{table_name}\""),
            ttl_secs: i64::from(ttl_days) * 24 * 60 * 60,
        })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                SessionId TEXT PRIMARY KEY,
                Data TEXT NOT NULL,
                LastUpdated TEXT NOT NULL,
                TTL INTEGER NOT NULL
            )
            "#,
            self.table
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert with an explicit expiry (unix seconds).
    #[instrument(skip(self, data), fields(repo = "session", operation = "save"))]
    pub async fn save_expiring_at(
        &self,
        session_id: &str,
        data: &Value,
        expires_at: i64,
    ) -> anyhow::Result<()> {
        let record = SessionRecord {
            session_id: session_id.to_string(),
            data: serde_json::to_string(data)?,
            last_updated: chrono::Utc::now().to_rfc3339(),
            ttl: expires_at,
        };
        sqlx::query(&format!(
            "INSERT INTO {} (SessionId, Data, LastUpdated, TTL) VALUES ($1, $2, $3, $4) \
             ON CONFLICT(SessionId) DO UPDATE SET Data = excluded.Data, \
             LastUpdated = excluded.LastUpdated, TTL = excluded.TTL",
            self.table
        ))
        .bind(&record.session_id)
        .bind(&record.data)
        .bind(&record.last_updated)
        .bind(record.ttl)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Raw row, expired or not.
    #[instrument(skip(self), fields(repo = "session", operation = "record"))]
    pub async fn record(&self, session_id: &str) -> anyhow::Result<Option<SessionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT SessionId, Data, LastUpdated, TTL FROM {} WHERE SessionId = $1",
            self.table
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| SessionRecord {
            session_id: r.get("SessionId"),
            data: r.get("Data"),
            last_updated: r.get("LastUpdated"),
            ttl: r.get("TTL"),
        }))
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn save(&self, session_id: &str, data: &Value) -> anyhow::Result<()> {
        self.save_expiring_at(session_id, data, now_secs() + self.ttl_secs)
            .await
    }

    async fn load(&self, session_id: &str) -> anyhow::Result<Option<Value>> {
        let Some(record) = self.record(session_id).await? else {
            return Ok(None);
        };
        if record.ttl <= now_secs() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&record.data)?))
    }

    #[instrument(skip(self), fields(repo = "session", operation = "delete"))]
    async fn delete(&self, session_id: &str) -> anyhow::Result<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE SessionId = $1", self.table))
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "session", operation = "purge_expired"))]
    async fn purge_expired(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE TTL <= $1", self.table))
            .bind(now_secs())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Handle for one browser session: its id plus the store. Store failures are logged and
/// reported as "nothing loaded" / `false`, never raised.
#[derive(Clone)]
pub struct SessionContext {
    session_id: String,
    store: Arc<dyn SessionStore>,
}

impl SessionContext {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_id(store, new_session_id())
    }

    pub fn with_id(store: Arc<dyn SessionStore>, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            store,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stored blob, or `{}` when absent, expired, or the store fails.
    pub async fn load(&self) -> Value {
        match self.store.load(&self.session_id).await {
            Ok(Some(value)) => value,
            Ok(None) => Value::Object(Map::new()),
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "session load failed");
                Value::Object(Map::new())
            }
        }
    }

    pub async fn save(&self, data: &Value) -> bool {
        match self.store.save(&self.session_id, data).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "session save failed");
                false
            }
        }
    }

    /// Delete the blob and move to a fresh session id.
    pub async fn delete(&mut self) -> bool {
        match self.store.delete(&self.session_id).await {
            Ok(()) => {
                self.session_id = new_session_id();
                true
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "session delete failed");
                false
            }
        }
    }

    /// Append chat turns under `chatHistory`, keeping the rest of the blob.
    /// Nothing is written when the current blob cannot be read.
    pub async fn append_turns(&self, turns: &[ChatTurn]) -> bool {
        let mut blob = match self.store.load(&self.session_id).await {
            Ok(Some(Value::Object(map))) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "session load failed, turns not recorded");
                return false;
            }
        };
        let history = blob
            .entry(CHAT_HISTORY_KEY)
            .or_insert_with(|| Value::Array(Vec::new()));
        if !history.is_array() {
            *history = Value::Array(Vec::new());
        }
        if let Value::Array(items) = history {
            for turn in turns {
                match serde_json::to_value(turn) {
                    Ok(v) => items.push(v),
                    Err(e) => warn!(error = %e, "chat turn not serializable"),
                }
            }
        }
        self.save(&Value::Object(blob)).await
    }
}
