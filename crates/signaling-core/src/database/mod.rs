//! SQLite backing store (sqlx) for the user directory and the call log

pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, error, info};

use crate::call_log::{duration_seconds, CallLog};
use crate::config::DatabaseConfig;
use crate::directory::UserDirectory;
use crate::error::{Result, SignalingError};
use crate::types::{CallRecord, CallRecordId, CallStatus, UserId, UserProfile};

/// Store shared by the directory and call log roles
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and bootstrap the schema
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("🗄️ Opening database at: {}", config.url);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        info!("✅ Database initialized successfully");
        Ok(store)
    }

    /// In-memory database for testing. A single connection keeps every
    /// query on the same memory database.
    pub async fn new_in_memory() -> Result<Self> {
        debug!("🗄️ Creating in-memory database");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("📋 Schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or refresh a directory user by username
    pub async fn upsert_user(&self, username: &str, display_name: &str) -> Result<UserProfile> {
        sqlx::query(
            "INSERT INTO users (username, display_name) VALUES (?1, ?2)
             ON CONFLICT(username) DO UPDATE SET display_name = excluded.display_name, is_active = 1",
        )
        .bind(username)
        .bind(display_name)
        .execute(&self.pool)
        .await?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE username = ?1")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;

        Ok(UserProfile {
            id: UserId::from(id),
            username: username.to_string(),
            display_name: display_name.to_string(),
        })
    }

    /// Mark a directory user inactive; inactive users no longer resolve
    pub async fn deactivate_user(&self, id: &UserId) -> Result<()> {
        let numeric = parse_row_id(id)
            .ok_or_else(|| SignalingError::invalid_input(format!("Invalid user id: {}", id)))?;
        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?1")
            .bind(numeric)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Execute a health check query
    pub async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => {
                debug!("💚 Database health check passed");
                true
            }
            Err(e) => {
                error!("❌ Database health check failed: {}", e);
                false
            }
        }
    }
}

/// Directory ids are SQLite row ids
fn parse_row_id(id: &UserId) -> Option<i64> {
    id.as_str().parse::<i64>().ok()
}

fn call_record_from_row(row: &SqliteRow) -> Result<CallRecord> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<CallStatus>()
        .map_err(SignalingError::call_log)?;

    Ok(CallRecord {
        id: row.try_get("id")?,
        caller_id: UserId::from(row.try_get::<String, _>("caller_id")?),
        callee_id: UserId::from(row.try_get::<String, _>("callee_id")?),
        room_name: row.try_get("room_name")?,
        status,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        duration_seconds: row.try_get("duration_seconds")?,
    })
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<UserProfile>> {
        let Some(numeric) = parse_row_id(id) else {
            return Ok(None);
        };

        let row = sqlx::query(
            "SELECT id, username, display_name FROM users WHERE id = ?1 AND is_active = 1",
        )
        .bind(numeric)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(UserProfile {
                id: UserId::from(row.try_get::<i64, _>("id")?),
                username: row.try_get("username")?,
                display_name: row.try_get("display_name")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl CallLog for SqliteStore {
    async fn log_call(
        &self,
        caller_id: &UserId,
        callee_id: &UserId,
        room_name: &str,
        status: CallStatus,
    ) -> Result<CallRecordId> {
        let result = sqlx::query(
            "INSERT INTO call_logs (caller_id, callee_id, room_name, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(caller_id.as_str())
        .bind(callee_id.as_str())
        .bind(room_name)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update_call_status(
        &self,
        id: CallRecordId,
        status: CallStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let started_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT started_at FROM call_logs WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let started_at =
            started_at.ok_or_else(|| SignalingError::call_log(format!("No call record {}", id)))?;
        let duration = ended_at.map(|ended_at| duration_seconds(started_at, ended_at));

        sqlx::query(
            "UPDATE call_logs
             SET status = ?1,
                 ended_at = COALESCE(?2, ended_at),
                 duration_seconds = COALESCE(?3, duration_seconds)
             WHERE id = ?4",
        )
        .bind(status.as_str())
        .bind(ended_at)
        .bind(duration)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_call(&self, id: CallRecordId) -> Result<Option<CallRecord>> {
        let row = sqlx::query(
            "SELECT id, caller_id, callee_id, room_name, status, started_at, ended_at, duration_seconds
             FROM call_logs WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(call_record_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_resolves_active_users_only() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let emma = store.upsert_user("emma", "Emma").await.unwrap();

        let found = store.get_user_by_id(&emma.id).await.unwrap();
        assert_eq!(found, Some(emma.clone()));

        store.deactivate_user(&emma.id).await.unwrap();
        assert!(store.get_user_by_id(&emma.id).await.unwrap().is_none());

        // Non-numeric ids never match a row id
        assert!(store.get_user_by_id(&UserId::from("emma")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_id() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let first = store.upsert_user("noah", "Noah").await.unwrap();
        let second = store.upsert_user("noah", "Noah B").await.unwrap();

        assert_eq!(first.id, second.id);
        let found = store.get_user_by_id(&first.id).await.unwrap().unwrap();
        assert_eq!(found.display_name, "Noah B");
    }

    #[tokio::test]
    async fn test_call_log_lifecycle() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let id = store
            .log_call(&UserId::from("1"), &UserId::from("2"), "call-1-to-2-100", CallStatus::Initiated)
            .await
            .unwrap();

        let record = store.get_call(id).await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Initiated);
        assert_eq!(record.caller_id, UserId::from("1"));
        assert!(record.ended_at.is_none());

        store.update_call_status(id, CallStatus::Accepted, None).await.unwrap();
        let ended_at = record.started_at + chrono::Duration::seconds(42);
        store.update_call_status(id, CallStatus::Ended, Some(ended_at)).await.unwrap();

        let record = store.get_call(id).await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Ended);
        assert_eq!(record.duration_seconds, Some(42));
        assert!(record.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_call_fails() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let result = store.update_call_status(999, CallStatus::Ended, None).await;
        assert!(matches!(result, Err(SignalingError::CallLog(_))));
    }

    #[tokio::test]
    async fn test_health_check() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        assert!(store.health_check().await);
    }
}
