use crate::storage::StorageGateway;
use crate::types::{
    ActiveChannelBinding, AppError, MemoryFact, MemoryScope, MessageRecord, Persona, Result, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database};

/// Libsql-backed store. Local SQLite file for deployments, `:memory:` for
/// tests and scratch runs.
pub struct LibsqlStore {
    _db: Database,
    conn: Connection,
}

impl LibsqlStore {
    /// Open (or create) a database file at `path` and ensure the schema.
    pub async fn new_local(path: &str) -> Result<Self> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to open database: {}", e)))?;

        // A single connection is opened up front and shared: for `:memory:`
        // databases each fresh connect() would otherwise see its own empty
        // database, losing the schema created below.
        let conn = db
            .connect()
            .map_err(|e| AppError::Storage(format!("Failed to get connection: {}", e)))?;

        let store = Self { _db: db, conn };
        store.initialize_schema().await?;

        Ok(store)
    }

    /// Ephemeral in-memory database (lost on drop).
    pub async fn new_memory() -> Result<Self> {
        Self::new_local(":memory:").await
    }

    pub fn connection(&self) -> Result<Connection> {
        Ok(self.conn.clone())
    }

    async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create users table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS active_channels (
                channel_id TEXT PRIMARY KEY,
                guild_id TEXT NOT NULL,
                persona_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create active_channels table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS message_history (
                id TEXT PRIMARY KEY,
                external_message_id TEXT,
                channel_id TEXT NOT NULL,
                guild_id TEXT,
                author_user_id TEXT,
                author_display_name TEXT,
                persona_id TEXT,
                content TEXT NOT NULL,
                is_from_assistant INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create message_history table: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_message_history_channel_time
             ON message_history(channel_id, created_at)",
            (),
        )
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create history index: {}", e)))?;

        // Scope columns are nullable and compared with IS, so uniqueness per
        // (scope, fact_key) is enforced by the update-then-insert upsert
        // rather than a unique index (SQLite treats NULLs as distinct).
        conn.execute(
            "CREATE TABLE IF NOT EXISTS memory_facts (
                id TEXT PRIMARY KEY,
                channel_id TEXT,
                user_id TEXT,
                persona_id TEXT,
                fact_key TEXT NOT NULL,
                fact_value TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create memory_facts table: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_memory_facts_scope
             ON memory_facts(channel_id, user_id, persona_id, fact_key)",
            (),
        )
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create memory index: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS personas (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                base_prompt TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create personas table: {}", e)))?;

        Ok(())
    }
}

fn timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

fn row_err(e: impl std::fmt::Display) -> AppError {
    AppError::Storage(e.to_string())
}

#[async_trait]
impl StorageGateway for LibsqlStore {
    async fn find_active_channels(&self) -> Result<Vec<ActiveChannelBinding>> {
        let conn = self.connection()?;

        let mut rows = conn
            .query(
                "SELECT channel_id, guild_id, persona_id FROM active_channels",
                (),
            )
            .await
            .map_err(|e| AppError::Storage(format!("Failed to query active channels: {}", e)))?;

        let mut bindings = Vec::new();
        while let Some(row) = rows.next().await.map_err(row_err)? {
            bindings.push(ActiveChannelBinding {
                channel_id: row.get(0).map_err(row_err)?,
                guild_id: row.get(1).map_err(row_err)?,
                persona_id: row.get(2).map_err(row_err)?,
            });
        }

        Ok(bindings)
    }

    async fn upsert_active_channel(&self, binding: &ActiveChannelBinding) -> Result<()> {
        let conn = self.connection()?;
        let now = timestamp(Utc::now());

        conn.execute(
            "INSERT INTO active_channels (channel_id, guild_id, persona_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(channel_id) DO UPDATE SET
                 guild_id = excluded.guild_id,
                 persona_id = excluded.persona_id,
                 updated_at = excluded.updated_at",
            (
                binding.channel_id.clone(),
                binding.guild_id.clone(),
                binding.persona_id.clone(),
                now,
            ),
        )
        .await
        .map_err(|e| AppError::Storage(format!("Failed to upsert active channel: {}", e)))?;

        Ok(())
    }

    async fn delete_active_channel(&self, channel_id: &str) -> Result<bool> {
        let conn = self.connection()?;

        let deleted = conn
            .execute(
                "DELETE FROM active_channels WHERE channel_id = ?1",
                [channel_id],
            )
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete active channel: {}", e)))?;

        Ok(deleted > 0)
    }

    async fn find_or_create_user(&self, user_id: &str, display_name: &str) -> Result<User> {
        let conn = self.connection()?;

        let mut rows = conn
            .query(
                "SELECT user_id, display_name FROM users WHERE user_id = ?1",
                [user_id],
            )
            .await
            .map_err(|e| AppError::Storage(format!("Failed to query user: {}", e)))?;

        if let Some(row) = rows.next().await.map_err(row_err)? {
            let stored_name: String = row.get(1).map_err(row_err)?;
            if stored_name != display_name {
                conn.execute(
                    "UPDATE users SET display_name = ?1, updated_at = ?2 WHERE user_id = ?3",
                    (display_name, timestamp(Utc::now()), user_id),
                )
                .await
                .map_err(|e| AppError::Storage(format!("Failed to refresh user name: {}", e)))?;
            }
            return Ok(User {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
            });
        }

        let now = timestamp(Utc::now());
        conn.execute(
            "INSERT INTO users (user_id, display_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            (user_id, display_name, now),
        )
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create user: {}", e)))?;

        Ok(User {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
        })
    }

    async fn count_users(&self) -> Result<i64> {
        let conn = self.connection()?;

        let mut rows = conn
            .query("SELECT COUNT(*) FROM users", ())
            .await
            .map_err(|e| AppError::Storage(format!("Failed to count users: {}", e)))?;

        match rows.next().await.map_err(row_err)? {
            Some(row) => row.get(0).map_err(row_err),
            None => Ok(0),
        }
    }

    async fn append_message(&self, record: &MessageRecord) -> Result<()> {
        let conn = self.connection()?;

        conn.execute(
            "INSERT INTO message_history
                 (id, external_message_id, channel_id, guild_id, author_user_id,
                  author_display_name, persona_id, content, is_from_assistant, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            (
                uuid::Uuid::new_v4().to_string(),
                record.external_message_id.clone(),
                record.channel_id.clone(),
                record.guild_id.clone(),
                record.author_user_id.clone(),
                record.author_display_name.clone(),
                record.persona_id.clone(),
                record.content.clone(),
                record.is_from_assistant as i64,
                timestamp(record.created_at),
            ),
        )
        .await
        .map_err(|e| AppError::Storage(format!("Failed to append message: {}", e)))?;

        Ok(())
    }

    async fn load_recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let conn = self.connection()?;

        // Fetched newest-first for an indexed scan, then reversed so callers
        // always see chronological order.
        let mut rows = conn
            .query(
                "SELECT external_message_id, channel_id, guild_id, author_user_id,
                        author_display_name, persona_id, content, is_from_assistant, created_at
                 FROM message_history
                 WHERE channel_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
                (channel_id, limit as i64),
            )
            .await
            .map_err(|e| AppError::Storage(format!("Failed to query history: {}", e)))?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next().await.map_err(row_err)? {
            messages.push(MessageRecord {
                external_message_id: row.get(0).map_err(row_err)?,
                channel_id: row.get(1).map_err(row_err)?,
                guild_id: row.get(2).map_err(row_err)?,
                author_user_id: row.get(3).map_err(row_err)?,
                author_display_name: row.get(4).map_err(row_err)?,
                persona_id: row.get(5).map_err(row_err)?,
                content: row.get(6).map_err(row_err)?,
                is_from_assistant: row.get::<i64>(7).map_err(row_err)? != 0,
                created_at: datetime(row.get(8).map_err(row_err)?),
            });
        }

        messages.reverse();
        Ok(messages)
    }

    async fn upsert_memory_fact(&self, scope: &MemoryScope, key: &str, value: &str) -> Result<()> {
        let conn = self.connection()?;
        let now = timestamp(Utc::now());

        let updated = conn
            .execute(
                "UPDATE memory_facts SET fact_value = ?1, updated_at = ?2
                 WHERE channel_id IS ?3 AND user_id IS ?4 AND persona_id IS ?5
                   AND fact_key = ?6",
                (
                    value,
                    now,
                    scope.channel_id.clone(),
                    scope.user_id.clone(),
                    scope.persona_id.clone(),
                    key,
                ),
            )
            .await
            .map_err(|e| AppError::Storage(format!("Failed to update memory fact: {}", e)))?;

        if updated == 0 {
            conn.execute(
                "INSERT INTO memory_facts
                     (id, channel_id, user_id, persona_id, fact_key, fact_value,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                (
                    uuid::Uuid::new_v4().to_string(),
                    scope.channel_id.clone(),
                    scope.user_id.clone(),
                    scope.persona_id.clone(),
                    key,
                    value,
                    now,
                ),
            )
            .await
            .map_err(|e| AppError::Storage(format!("Failed to insert memory fact: {}", e)))?;
        }

        Ok(())
    }

    async fn find_memory_facts(&self, scope: &MemoryScope) -> Result<Vec<MemoryFact>> {
        let conn = self.connection()?;

        // Explicit union of the scope combinations relevant at context-build
        // time. Broader than the fully-scoped write path on purpose: recall
        // depends on user-global and cross-channel facts surfacing here.
        let mut rows = conn
            .query(
                "SELECT channel_id, user_id, persona_id, fact_key, fact_value,
                        created_at, updated_at
                 FROM memory_facts
                 WHERE (channel_id IS ?1 AND user_id IS ?2 AND persona_id IS ?3)
                    OR (user_id IS ?2 AND channel_id IS NULL AND persona_id IS NULL)
                    OR (persona_id IS ?3 AND channel_id IS NULL AND user_id IS NULL)
                    OR (user_id IS ?2 AND persona_id IS ?3 AND channel_id IS NOT NULL)
                    OR (user_id IS ?2 AND persona_id IS NULL AND channel_id IS NOT NULL)
                 ORDER BY updated_at DESC
                 LIMIT 20",
                (
                    scope.channel_id.clone(),
                    scope.user_id.clone(),
                    scope.persona_id.clone(),
                ),
            )
            .await
            .map_err(|e| AppError::Storage(format!("Failed to query memory facts: {}", e)))?;

        let mut facts = Vec::new();
        while let Some(row) = rows.next().await.map_err(row_err)? {
            facts.push(MemoryFact {
                scope: MemoryScope {
                    channel_id: row.get(0).map_err(row_err)?,
                    user_id: row.get(1).map_err(row_err)?,
                    persona_id: row.get(2).map_err(row_err)?,
                },
                fact_key: row.get(3).map_err(row_err)?,
                fact_value: row.get(4).map_err(row_err)?,
                created_at: datetime(row.get(5).map_err(row_err)?),
                updated_at: datetime(row.get(6).map_err(row_err)?),
            });
        }

        Ok(facts)
    }

    async fn delete_memory_fact(&self, scope: &MemoryScope, key: &str) -> Result<bool> {
        let conn = self.connection()?;

        let deleted = conn
            .execute(
                "DELETE FROM memory_facts
                 WHERE channel_id IS ?1 AND user_id IS ?2 AND persona_id IS ?3
                   AND fact_key = ?4",
                (
                    scope.channel_id.clone(),
                    scope.user_id.clone(),
                    scope.persona_id.clone(),
                    key,
                ),
            )
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete memory fact: {}", e)))?;

        Ok(deleted > 0)
    }

    async fn upsert_persona(&self, persona: &Persona) -> Result<()> {
        let conn = self.connection()?;
        let now = timestamp(Utc::now());

        conn.execute(
            "INSERT INTO personas (id, name, base_prompt, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 base_prompt = excluded.base_prompt,
                 description = excluded.description,
                 updated_at = excluded.updated_at",
            (
                persona.id.clone(),
                persona.name.clone(),
                persona.base_prompt.clone(),
                persona.description.clone(),
                now,
            ),
        )
        .await
        .map_err(|e| AppError::Storage(format!("Failed to upsert persona: {}", e)))?;

        Ok(())
    }

    async fn list_personas(&self) -> Result<Vec<Persona>> {
        let conn = self.connection()?;

        let mut rows = conn
            .query(
                "SELECT id, name, base_prompt, description FROM personas ORDER BY name",
                (),
            )
            .await
            .map_err(|e| AppError::Storage(format!("Failed to query personas: {}", e)))?;

        let mut personas = Vec::new();
        while let Some(row) = rows.next().await.map_err(row_err)? {
            personas.push(Persona {
                id: row.get(0).map_err(row_err)?,
                name: row.get(1).map_err(row_err)?,
                base_prompt: row.get(2).map_err(row_err)?,
                description: row.get(3).map_err(row_err)?,
            });
        }

        Ok(personas)
    }
}
