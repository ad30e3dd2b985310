//! In-process queue backend.
//!
//! Useful for running every stage inside one process and for tests.
//! Contents are lost when the process exits.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{MessageQueue, QueueError};
use crate::domain::Message;

/// FIFO queues held in memory
#[derive(Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<Message>>>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_pop(&self, queue: &str) -> Result<Option<Message>, QueueError> {
        let mut queues = self.queues.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(queues.get_mut(queue).and_then(VecDeque::pop_front))
    }

    /// Copy of every message waiting in `queue`, oldest first
    pub fn snapshot(&self, queue: &str) -> Result<Vec<Message>, QueueError> {
        let queues = self.queues.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn push(&self, queue: &str, message: &Message) -> Result<(), QueueError> {
        {
            let mut queues = self.queues.lock().map_err(|_| QueueError::Poisoned)?;
            queues
                .entry(queue.to_string())
                .or_default()
                .push_back(message.clone());
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<Message>, QueueError> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking so a concurrent push is not missed
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_pop(queue)? {
                return Ok(Some(message));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self, queue: &str) -> Result<usize, QueueError> {
        let queues = self.queues.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(queues.get(queue).map(VecDeque::len).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::Action;

    #[tokio::test]
    async fn test_fifo_order_per_queue() {
        let queue = MemoryQueue::new();
        for action in [Action::Review, Action::Edit] {
            queue.push("q", &Message::new("s1", action)).await.unwrap();
        }
        queue
            .push("other", &Message::new("s2", Action::Revise))
            .await
            .unwrap();

        let first = queue.pop("q", Duration::from_millis(10)).await.unwrap().unwrap();
        let second = queue.pop("q", Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.action, Action::Review);
        assert_eq!(second.action, Action::Edit);
        assert_eq!(queue.len("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pop_times_out_empty() {
        let queue = MemoryQueue::new();
        let popped = queue.pop("q", Duration::from_millis(20)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = Arc::new(MemoryQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop("q", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue
            .push("q", &Message::new("s1", Action::CoverReady))
            .await
            .unwrap();

        let popped = consumer.await.unwrap().unwrap().unwrap();
        assert_eq!(popped.action, Action::CoverReady);
        assert_eq!(queue.len("q").await.unwrap(), 0);
    }
}
