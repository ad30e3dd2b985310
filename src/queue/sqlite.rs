//! Durable queue backend on SQLite.
//!
//! Each message is one row; `pop` selects and deletes the oldest row of a
//! queue inside an immediate transaction, so competing consumers in
//! different processes never receive the same message. Blocking is done by
//! polling until the timeout, with an in-process wakeup for local pushes.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{MessageQueue, QueueError};
use crate::domain::Message;
use crate::store::sqlite::open_connection;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// SQLite-backed named queues
pub struct SqliteQueue {
    conn: Arc<Mutex<Connection>>,
    notify: Notify,
    poll_interval: Duration,
}

impl SqliteQueue {
    /// Open (or create) the queue tables in the database at `path`
    pub fn open(path: &Path) -> Result<Self, QueueError> {
        let conn = open_connection(path)?;
        Self::from_connection(conn)
    }

    /// Queue over a private in-memory database
    pub fn in_memory() -> Result<Self, QueueError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, QueueError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS queue_messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                queue       TEXT NOT NULL,
                body        TEXT NOT NULL,
                enqueued_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_queue_messages_queue ON queue_messages(queue, id);",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            notify: Notify::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Override how often an idle `pop` re-checks the database
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, QueueError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| QueueError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| QueueError::Task(e.to_string()))?
    }

    async fn try_pop(&self, queue: &str) -> Result<Option<Message>, QueueError> {
        let queue = queue.to_string();
        let body = self
            .with_conn(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let row: Option<(i64, String)> = tx
                    .query_row(
                        "SELECT id, body FROM queue_messages WHERE queue = ?1 ORDER BY id LIMIT 1",
                        params![queue],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                if let Some((id, _)) = &row {
                    tx.execute("DELETE FROM queue_messages WHERE id = ?1", params![id])?;
                }
                tx.commit()?;

                Ok(row.map(|(_, body)| body))
            })
            .await?;

        // Decode after the row is gone: a malformed body is dropped, not redelivered
        body.map(|b| serde_json::from_str(&b).map_err(QueueError::from))
            .transpose()
    }
}

#[async_trait]
impl MessageQueue for SqliteQueue {
    async fn push(&self, queue: &str, message: &Message) -> Result<(), QueueError> {
        let body = serde_json::to_string(message)?;
        let queue = queue.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO queue_messages (queue, body, enqueued_at) VALUES (?1, ?2, ?3)",
                params![queue, body, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await?;

        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<Message>, QueueError> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_pop(queue).await? {
                return Ok(Some(message));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            // Wake on a local push or re-poll for pushes from other processes
            let wait_until = deadline.min(now + self.poll_interval);
            let _ = tokio::time::timeout_at(wait_until, notified).await;
        }
    }

    async fn len(&self, queue: &str) -> Result<usize, QueueError> {
        let queue = queue.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM queue_messages WHERE queue = ?1",
                params![queue],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, Payload};
    use crate::queue::Delivery;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_push_pop_roundtrip_preserves_payload() {
        let queue = SqliteQueue::in_memory().unwrap();
        let message = Message::new("s1", Action::Revise)
            .with_payload(Payload::new().with("round_number", 1).with("feedback_summary", "cut"))
            .route("orchestrator", "writer");
        queue.push("queue:writer", &message).await.unwrap();

        let popped = queue
            .pop("queue:writer", Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped, message);
        assert_eq!(queue.len("queue:writer").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_messages_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("queue.db");

        {
            let queue = SqliteQueue::open(&path).unwrap();
            queue
                .push("q", &Message::new("s1", Action::DraftReady))
                .await
                .unwrap();
            queue
                .push("q", &Message::new("s2", Action::CoverReady))
                .await
                .unwrap();
        }

        let queue = SqliteQueue::open(&path).unwrap();
        assert_eq!(queue.len("q").await.unwrap(), 2);
        let first = queue.pop("q", Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(first.story_id, "s1");

        // Popped is gone, even across a reopen
        assert_eq!(queue.delivery(), Delivery::AtMostOnce);
        drop(queue);
        let queue = SqliteQueue::open(&path).unwrap();
        assert_eq!(queue.len("q").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pop_times_out_empty() {
        let queue = SqliteQueue::in_memory()
            .unwrap()
            .with_poll_interval(Duration::from_millis(5));
        let started = Instant::now();
        let popped = queue.pop("q", Duration::from_millis(30)).await.unwrap();
        assert!(popped.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
