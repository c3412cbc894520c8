// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relational conversation store backed by SQLite in WAL mode.
//!
//! All writes go through a single connection behind a mutex; reads see a
//! consistent snapshot. Inserts are idempotent on their primary key so WAL
//! replay after a crash cannot duplicate rows.

use ov_core::{
    Action, ActionId, ActionKind, ChunkId, Conversation, ConversationId, StreamChunk, TaskStatus,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("conversation not found: {0}")]
    NotFound(String),
}

/// Aggregate counters from [`ConversationStore::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Conversation totals by status
    pub conversations_by_status: HashMap<String, u64>,
    /// Action totals by kind
    pub actions_by_kind: HashMap<String, u64>,
    /// Violation totals derived from intervention/error actions, keyed by
    /// the rule id in the action metadata (falling back to the action kind)
    pub violations_by_kind: HashMap<String, u64>,
}

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id          TEXT PRIMARY KEY,
    parent_id   TEXT REFERENCES conversations(id),
    started_at  TEXT NOT NULL,
    status      TEXT NOT NULL,
    depth       INTEGER NOT NULL DEFAULT 0,
    prompt      TEXT NOT NULL,
    task_type   TEXT NOT NULL DEFAULT 'task',
    metadata    TEXT
);
CREATE INDEX IF NOT EXISTS idx_conversations_parent
    ON conversations(parent_id);

CREATE TABLE IF NOT EXISTS actions (
    id              TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(id),
    timestamp       TEXT NOT NULL,
    kind            TEXT NOT NULL,
    content         TEXT NOT NULL,
    metadata        TEXT
);
CREATE INDEX IF NOT EXISTS idx_actions_conversation_time
    ON actions(conversation_id, timestamp);

CREATE TABLE IF NOT EXISTS streams (
    id              TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(id),
    chunk           TEXT NOT NULL,
    parsed          TEXT,
    timestamp       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_streams_conversation_time
    ON streams(conversation_id, timestamp);

CREATE VIEW IF NOT EXISTS observations AS
    SELECT a.conversation_id, a.timestamp, a.kind, a.content, c.depth, c.status
    FROM actions a
    JOIN conversations c ON c.id = a.conversation_id;
"#;

/// Single-writer conversation store.
pub struct ConversationStore {
    conn: Mutex<Connection>,
}

impl ConversationStore {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version < SCHEMA_VERSION {
            debug!(from = version, to = SCHEMA_VERSION, "migrating store schema");
            conn.execute_batch(SCHEMA)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a conversation row. Idempotent on primary key.
    pub fn create_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let metadata = if conversation.metadata.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&conversation.metadata)?)
        };
        self.conn.lock().execute(
            "INSERT INTO conversations
                 (id, parent_id, started_at, status, depth, prompt, task_type, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO NOTHING",
            params![
                conversation.id.as_str(),
                conversation.parent_id.as_ref().map(|p| p.as_str()),
                conversation.started_at,
                conversation.status.to_string(),
                conversation.depth,
                conversation.prompt,
                conversation.task_type,
                metadata,
            ],
        )?;
        Ok(())
    }

    /// Partial update: status and/or replacement metadata.
    pub fn update_conversation(
        &self,
        id: &ConversationId,
        status: Option<TaskStatus>,
        metadata: Option<&HashMap<String, serde_json::Value>>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let mut updated = 0;
        if let Some(status) = status {
            updated += conn.execute(
                "UPDATE conversations SET status = ?2 WHERE id = ?1",
                params![id.as_str(), status.to_string()],
            )?;
        }
        if let Some(metadata) = metadata {
            updated += conn.execute(
                "UPDATE conversations SET metadata = ?2 WHERE id = ?1",
                params![id.as_str(), serde_json::to_string(metadata)?],
            )?;
        }
        if updated == 0 && (status.is_some() || metadata.is_some()) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Append an action. Idempotent on primary key.
    pub fn log_action(&self, action: &Action) -> Result<(), StoreError> {
        let metadata = match &action.metadata {
            Some(map) => Some(serde_json::to_string(map)?),
            None => None,
        };
        self.conn.lock().execute(
            "INSERT INTO actions (id, conversation_id, timestamp, kind, content, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO NOTHING",
            params![
                action.id.as_str(),
                action.conversation_id.as_str(),
                action.timestamp,
                action.kind.as_str(),
                action.content,
                metadata,
            ],
        )?;
        Ok(())
    }

    /// Append a raw stream chunk. Idempotent on primary key.
    pub fn log_stream(&self, chunk: &StreamChunk) -> Result<(), StoreError> {
        let parsed = match &chunk.parsed {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };
        self.conn.lock().execute(
            "INSERT INTO streams (id, conversation_id, chunk, parsed, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO NOTHING",
            params![
                chunk.id.as_str(),
                chunk.conversation_id.as_str(),
                chunk.chunk,
                parsed,
                chunk.timestamp,
            ],
        )?;
        Ok(())
    }

    pub fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, parent_id, started_at, status, depth, prompt, task_type, metadata
                 FROM conversations WHERE id = ?1",
                params![id.as_str()],
                Self::conversation_row,
            )
            .optional()?;
        row.map(Self::conversation_from_raw).transpose()
    }

    /// Conversations whose status is non-terminal, oldest first.
    pub fn get_active_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, parent_id, started_at, status, depth, prompt, task_type, metadata
             FROM conversations
             WHERE status IN ('queued', 'running', 'paused')
             ORDER BY started_at ASC",
        )?;
        let rows = stmt.query_map([], Self::conversation_row)?;
        rows.map(|r| Self::conversation_from_raw(r?))
            .collect::<Result<Vec<_>, _>>()
    }

    /// The root and all of its descendants, ordered by (depth, started_at).
    ///
    /// Single recursive query; no N+1 child walks.
    pub fn get_conversation_tree(
        &self,
        root: &ConversationId,
    ) -> Result<Vec<Conversation>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "WITH RECURSIVE tree(id) AS (
                 SELECT id FROM conversations WHERE id = ?1
                 UNION ALL
                 SELECT c.id FROM conversations c JOIN tree t ON c.parent_id = t.id
             )
             SELECT c.id, c.parent_id, c.started_at, c.status, c.depth, c.prompt,
                    c.task_type, c.metadata
             FROM conversations c
             JOIN tree ON c.id = tree.id
             ORDER BY c.depth ASC, c.started_at ASC",
        )?;
        let rows = stmt.query_map(params![root.as_str()], Self::conversation_row)?;
        rows.map(|r| Self::conversation_from_raw(r?))
            .collect::<Result<Vec<_>, _>>()
    }

    /// Most recent actions across all conversations, newest first.
    pub fn get_recent_actions(&self, limit: u32) -> Result<Vec<Action>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, timestamp, kind, content, metadata
             FROM actions ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], Self::action_row)?;
        rows.map(|r| Self::action_from_raw(r?))
            .collect::<Result<Vec<_>, _>>()
    }

    /// All actions of one conversation in timestamp order.
    pub fn get_actions(&self, id: &ConversationId) -> Result<Vec<Action>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, timestamp, kind, content, metadata
             FROM actions WHERE conversation_id = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![id.as_str()], Self::action_row)?;
        rows.map(|r| Self::action_from_raw(r?))
            .collect::<Result<Vec<_>, _>>()
    }

    /// All stream chunks of one conversation in timestamp order.
    pub fn get_chunks(&self, id: &ConversationId) -> Result<Vec<StreamChunk>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, chunk, parsed, timestamp
             FROM streams WHERE conversation_id = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut chunks = Vec::new();
        for row in rows {
            let (id, conversation_id, chunk, parsed, timestamp) = row?;
            let parsed = match parsed {
                Some(text) => Some(serde_json::from_str(&text)?),
                None => None,
            };
            chunks.push(StreamChunk {
                id: ChunkId::new(id),
                conversation_id: ConversationId::new(conversation_id),
                chunk,
                parsed,
                timestamp,
            });
        }
        Ok(chunks)
    }

    /// Status totals, action histogram, and the derived violation histogram.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn.lock();
        let mut stats = StoreStats::default();

        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM conversations GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (status, count) = row?;
            stats.conversations_by_status.insert(status, count);
        }

        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM actions GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (kind, count) = row?;
            stats.actions_by_kind.insert(kind, count);
        }

        let mut stmt = conn.prepare(
            "SELECT COALESCE(json_extract(metadata, '$.rule_id'), kind), COUNT(*)
             FROM actions
             WHERE kind IN ('intervention', 'error')
             GROUP BY 1",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (kind, count) = row?;
            stats.violations_by_kind.insert(kind, count);
        }

        Ok(stats)
    }

    fn conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRaw> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn conversation_from_raw(raw: ConversationRaw) -> Result<Conversation, StoreError> {
        let (id, parent_id, started_at, status, depth, prompt, task_type, metadata) = raw;
        let metadata = match metadata {
            Some(text) => serde_json::from_str(&text)?,
            None => HashMap::new(),
        };
        Ok(Conversation {
            id: ConversationId::new(id),
            parent_id: parent_id.map(ConversationId::new),
            started_at,
            status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Failed),
            depth,
            prompt,
            task_type,
            metadata,
        })
    }

    fn action_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActionRaw> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn action_from_raw(raw: ActionRaw) -> Result<Action, StoreError> {
        let (id, conversation_id, timestamp, kind, content, metadata) = raw;
        let metadata = match metadata {
            Some(text) => Some(serde_json::from_str(&text)?),
            None => None,
        };
        Ok(Action {
            id: ActionId::new(id),
            conversation_id: ConversationId::new(conversation_id),
            kind: ActionKind::parse(&kind).unwrap_or(ActionKind::Output),
            content,
            metadata,
            timestamp,
        })
    }
}

/// Raw tuple pulled from a conversation row before JSON decoding.
type ConversationRaw = (
    String,
    Option<String>,
    String,
    String,
    u32,
    String,
    String,
    Option<String>,
);

/// Raw tuple pulled from an action row before JSON decoding.
type ActionRaw = (String, String, String, String, String, Option<String>);

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
