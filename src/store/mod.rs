//! Document Store adapter.
//!
//! Durable per-entity get/save/list for the [`Story`] and [`Anthology`]
//! aggregates plus the activity log. `save_story` replaces the whole
//! document. Stages that may touch the same story concurrently (the two
//! critics of a parallel round) go through `update_story`, which re-reads
//! and writes the document atomically.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ActivityLog, Anthology, Story, StoryStatus};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// In-place edit applied to the freshly read story by [`DocumentStore::update_story`]
pub type StoryUpdate = Box<dyn FnOnce(&mut Story) + Send>;

/// Errors raised by store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown status in store: {0}")]
    UnknownStatus(String),

    #[error("Store worker task failed: {0}")]
    Task(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Persistence for stories, anthologies and activity records
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a story by id
    async fn get_story(&self, story_id: &str) -> Result<Option<Story>, StoreError>;

    /// Insert or replace a story, refreshing its update timestamp
    async fn save_story(&self, story: &mut Story) -> Result<(), StoreError>;

    /// Atomically read a story, apply `update` and write it back.
    ///
    /// Returns the updated story, or `None` (nothing written) when the
    /// story does not exist.
    async fn update_story(
        &self,
        story_id: &str,
        update: StoryUpdate,
    ) -> Result<Option<Story>, StoreError>;

    /// Stories, most recently updated first, optionally filtered by status
    async fn list_stories(
        &self,
        status: Option<StoryStatus>,
        limit: usize,
    ) -> Result<Vec<Story>, StoreError>;

    /// Every non-published story, oldest first
    async fn list_in_progress(&self, limit: usize) -> Result<Vec<Story>, StoreError>;

    /// Story count per status, in pipeline order (zero counts included)
    async fn count_by_status(&self) -> Result<Vec<(StoryStatus, usize)>, StoreError>;

    async fn get_anthology(&self, anthology_id: &str) -> Result<Option<Anthology>, StoreError>;

    async fn save_anthology(&self, anthology: &mut Anthology) -> Result<(), StoreError>;

    /// Anthologies, most recently updated first
    async fn list_anthologies(&self, limit: usize) -> Result<Vec<Anthology>, StoreError>;

    /// Append an activity record
    async fn log_activity(&self, entry: &ActivityLog) -> Result<(), StoreError>;

    /// Most recent activity records, newest first
    async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityLog>, StoreError>;
}
