//! SQLite-backed session store.
//!
//! Live conversations and their locks are held by an [`InMemorySessionStore`];
//! every create and commit is written through to a single table as a JSON
//! snapshot:
//! - `conversations(id, data, created_at, updated_at)` with an index on
//!   `updated_at` for eviction
//!
//! A conversation missing from memory (e.g. after a restart) is rehydrated
//! from its row on first access.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use touchline_core::conversation::{Conversation, ConversationId};
use touchline_core::error::SessionError;
use touchline_core::session::{SessionLease, SessionStore};
use tracing::{debug, info, warn};

use crate::in_memory::InMemorySessionStore;

pub struct SqliteSessionStore {
    pool: SqlitePool,
    live: InMemorySessionStore,
}

/// Timestamps are stored with a fixed width so text comparison orders them.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteSessionStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn new(path: &str) -> Result<Self, SessionError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| SessionError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite session store initialized at {path}");
        Ok(store)
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, SessionError> {
        let store = Self {
            pool,
            live: InMemorySessionStore::new(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), SessionError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id         TEXT PRIMARY KEY,
                data       TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(format!("Migration failed: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(format!("Migration failed: {e}")))?;

        Ok(())
    }

    async fn persist(&self, conversation: &Conversation) -> Result<(), SessionError> {
        let data = serde_json::to_string(conversation)
            .map_err(|e| SessionError::Storage(format!("Serialization failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO conversations (id, data, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(conversation.id.as_str())
        .bind(&data)
        .bind(timestamp(conversation.created_at))
        .bind(timestamp(conversation.last_active_at))
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(format!("UPSERT failed: {e}")))?;

        Ok(())
    }

    async fn load(&self, id: &ConversationId) -> Result<Option<Conversation>, SessionError> {
        let row = sqlx::query("SELECT data FROM conversations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SessionError::Storage(format!("SELECT failed: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let data: String = row
            .try_get("data")
            .map_err(|e| SessionError::Storage(format!("Row decode: {e}")))?;
        let conversation = serde_json::from_str(&data)
            .map_err(|e| SessionError::Corrupt(format!("{id}: {e}")))?;
        Ok(Some(conversation))
    }

    /// Make sure a persisted conversation is live in memory.
    async fn hydrate(&self, id: &ConversationId) -> Result<(), SessionError> {
        if self.live.contains(id).await {
            return Ok(());
        }
        if let Some(conversation) = self.load(id).await? {
            debug!(conversation_id = %id, "Rehydrated conversation from SQLite");
            self.live.adopt(conversation).await;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn teardown(&self) -> Result<(), SessionError> {
        self.pool.close().await;
        Ok(())
    }

    async fn create(&self, conversation: Conversation) -> Result<ConversationId, SessionError> {
        self.persist(&conversation).await?;
        self.live.create(conversation).await
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, SessionError> {
        self.hydrate(id).await?;
        self.live.get(id).await
    }

    async fn lock(&self, id: &ConversationId) -> Result<Option<SessionLease>, SessionError> {
        self.hydrate(id).await?;
        self.live.lock(id).await
    }

    async fn commit(
        &self,
        mut lease: SessionLease,
        mut conversation: Conversation,
    ) -> Result<(), SessionError> {
        if lease.id() != &conversation.id {
            return Err(SessionError::Storage(format!(
                "Lease for {} cannot commit conversation {}",
                lease.id(),
                conversation.id
            )));
        }
        conversation.touch();
        self.persist(&conversation).await?;
        lease.replace(conversation);
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, SessionError> {
        let live = self.live.delete(id).await?;
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::Storage(format!("DELETE failed: {e}")))?;
        Ok(live || result.rows_affected() > 0)
    }

    async fn evict_idle(&self, max_age: Duration) -> Result<usize, SessionError> {
        let sweep = self.live.sweep(max_age).await?;
        let age = chrono::Duration::from_std(max_age)
            .map_err(|e| SessionError::Storage(format!("Invalid retention window: {e}")))?;
        let cutoff = timestamp(Utc::now() - age);

        let rows = sqlx::query("SELECT id FROM conversations WHERE updated_at < ?1")
            .bind(&cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SessionError::Storage(format!("SELECT failed: {e}")))?;

        let mut removed = 0;
        for row in rows {
            let id: String = row
                .try_get("id")
                .map_err(|e| SessionError::Storage(format!("Row decode: {e}")))?;
            let id = ConversationId(id);
            if sweep.busy.contains(&id) {
                continue;
            }
            match sqlx::query("DELETE FROM conversations WHERE id = ?1 AND updated_at < ?2")
                .bind(id.as_str())
                .bind(&cutoff)
                .execute(&self.pool)
                .await
            {
                Ok(result) => removed += result.rows_affected() as usize,
                Err(e) => warn!(conversation_id = %id, "Failed to delete expired row: {e}"),
            }
        }
        Ok(removed.max(sweep.removed.len()))
    }

    async fn len(&self) -> Result<usize, SessionError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM conversations")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SessionError::Storage(format!("COUNT failed: {e}")))?;
        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| SessionError::Storage(format!("Row decode: {e}")))?;
        Ok(count as usize)
    }
}
