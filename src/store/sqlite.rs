//! SQLite store backend.
//!
//! Aggregates are stored as JSON documents keyed by id, with the status and
//! timestamps lifted into columns for listing.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{DocumentStore, StoreError, StoryUpdate};
use crate::domain::{ActivityLog, Anthology, Story, StoryStatus};

/// Open a database file shared by the store and the queue
pub(crate) fn open_connection(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

/// Fixed-width UTC timestamp so TEXT ordering matches time ordering
fn sortable(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// SQLite-backed document store
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the store tables in the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Task(e.to_string()))?;
        }
        Self::from_connection(open_connection(path)?)
    }

    /// Store over a private in-memory database
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS stories (
                story_id   TEXT PRIMARY KEY,
                status     TEXT NOT NULL,
                body       TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_stories_status ON stories(status);

            CREATE TABLE IF NOT EXISTS anthologies (
                anthology_id TEXT PRIMARY KEY,
                body         TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS activity_logs (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_name TEXT NOT NULL,
                story_id   TEXT NOT NULL,
                action     TEXT NOT NULL,
                detail     TEXT NOT NULL,
                timestamp  TEXT NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn with_conn_mut<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn query_stories(
        &self,
        sql: &'static str,
        status: Option<String>,
        limit: usize,
    ) -> Result<Vec<Story>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = match status {
                Some(status) => stmt
                    .query_map(params![status, limit], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?,
                None => stmt
                    .query_map(params![limit], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?,
            };
            rows.iter()
                .map(|body| serde_json::from_str(body).map_err(StoreError::from))
                .collect()
        })
        .await
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get_story(&self, story_id: &str) -> Result<Option<Story>, StoreError> {
        let story_id = story_id.to_string();
        self.with_conn(move |conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM stories WHERE story_id = ?1",
                    params![story_id],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
                .transpose()
        })
        .await
    }

    async fn save_story(&self, story: &mut Story) -> Result<(), StoreError> {
        story.touch();
        let body = serde_json::to_string(&*story)?;
        let story_id = story.story_id.clone();
        let status = story.status.as_str();
        let created_at = sortable(&story.created_at);
        let updated_at = sortable(&story.updated_at);

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO stories (story_id, status, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(story_id) DO UPDATE SET
                    status = excluded.status,
                    body = excluded.body,
                    updated_at = excluded.updated_at",
                params![story_id, status, body, created_at, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_story(
        &self,
        story_id: &str,
        update: StoryUpdate,
    ) -> Result<Option<Story>, StoreError> {
        let story_id = story_id.to_string();
        self.with_conn_mut(move |conn| {
            // IMMEDIATE takes the write lock before the read, so other
            // connections to the same file cannot interleave
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let body: Option<String> = tx
                .query_row(
                    "SELECT body FROM stories WHERE story_id = ?1",
                    params![story_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(body) = body else {
                return Ok(None);
            };

            let mut story: Story = serde_json::from_str(&body)?;
            update(&mut story);
            story.touch();

            tx.execute(
                "UPDATE stories SET status = ?2, body = ?3, updated_at = ?4 WHERE story_id = ?1",
                params![
                    story_id,
                    story.status.as_str(),
                    serde_json::to_string(&story)?,
                    sortable(&story.updated_at)
                ],
            )?;
            tx.commit()?;
            Ok(Some(story))
        })
        .await
    }

    async fn list_stories(
        &self,
        status: Option<StoryStatus>,
        limit: usize,
    ) -> Result<Vec<Story>, StoreError> {
        match status {
            Some(status) => {
                self.query_stories(
                    "SELECT body FROM stories WHERE status = ?1 ORDER BY updated_at DESC LIMIT ?2",
                    Some(status.as_str().to_string()),
                    limit,
                )
                .await
            }
            None => {
                self.query_stories(
                    "SELECT body FROM stories ORDER BY updated_at DESC LIMIT ?1",
                    None,
                    limit,
                )
                .await
            }
        }
    }

    async fn list_in_progress(&self, limit: usize) -> Result<Vec<Story>, StoreError> {
        self.query_stories(
            "SELECT body FROM stories WHERE status != ?1 ORDER BY created_at ASC LIMIT ?2",
            Some(StoryStatus::Published.as_str().to_string()),
            limit,
        )
        .await
    }

    async fn count_by_status(&self) -> Result<Vec<(StoryStatus, usize)>, StoreError> {
        let counted: Vec<(String, i64)> = self
            .with_conn(|conn| {
                let mut stmt =
                    conn.prepare("SELECT status, COUNT(*) FROM stories GROUP BY status")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut counts: Vec<(StoryStatus, usize)> =
            StoryStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for (name, count) in counted {
            let status =
                StoryStatus::parse(&name).ok_or_else(|| StoreError::UnknownStatus(name.clone()))?;
            if let Some(slot) = counts.iter_mut().find(|(s, _)| *s == status) {
                slot.1 = usize::try_from(count).unwrap_or(0);
            }
        }
        Ok(counts)
    }

    async fn get_anthology(&self, anthology_id: &str) -> Result<Option<Anthology>, StoreError> {
        let anthology_id = anthology_id.to_string();
        self.with_conn(move |conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM anthologies WHERE anthology_id = ?1",
                    params![anthology_id],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
                .transpose()
        })
        .await
    }

    async fn save_anthology(&self, anthology: &mut Anthology) -> Result<(), StoreError> {
        anthology.updated_at = Utc::now();
        let body = serde_json::to_string(&*anthology)?;
        let anthology_id = anthology.anthology_id.clone();
        let updated_at = sortable(&anthology.updated_at);

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO anthologies (anthology_id, body, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(anthology_id) DO UPDATE SET
                    body = excluded.body,
                    updated_at = excluded.updated_at",
                params![anthology_id, body, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_anthologies(&self, limit: usize) -> Result<Vec<Anthology>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT body FROM anthologies ORDER BY updated_at DESC LIMIT ?1")?;
            let bodies = stmt
                .query_map(params![limit], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            bodies
                .iter()
                .map(|body| serde_json::from_str(body).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn log_activity(&self, entry: &ActivityLog) -> Result<(), StoreError> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO activity_logs (agent_name, story_id, action, detail, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.agent_name,
                    entry.story_id,
                    entry.action,
                    entry.detail,
                    sortable(&entry.timestamp)
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityLog>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT agent_name, story_id, action, detail, timestamp
                 FROM activity_logs ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows
                .into_iter()
                .map(|(agent_name, story_id, action, detail, timestamp)| ActivityLog {
                    agent_name,
                    story_id,
                    action,
                    detail,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
                .collect())
        })
        .await
    }
}
